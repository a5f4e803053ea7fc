//! Line framing for the serial command protocol.
//!
//! There is no length prefix or checksum on the wire; a frame is one ASCII line
//! terminated by CRLF. Incoming CR bytes are ignored and LF ends the line.

use std::collections::VecDeque;

pub const LINE_CR: u8 = b'\r';
pub const LINE_LF: u8 = b'\n';

pub fn encode_line(command: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(command.len() + 2);
    out.extend_from_slice(command.as_bytes());
    out.push(LINE_CR);
    out.push(LINE_LF);
    out
}

/// Incremental line assembler.
///
/// Bytes that follow a completed line within the same chunk are kept as
/// complete lines or as the start of the next partial line.
#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: Vec<u8>,
    lines: VecDeque<String>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        for &b in chunk {
            match b {
                LINE_LF => {
                    let line = decode_ascii(&self.partial);
                    self.partial.clear();
                    // Blank lines carry nothing; the device sometimes emits bare CRLFs.
                    if !line.is_empty() {
                        self.lines.push_back(line);
                    }
                }
                LINE_CR => {}
                _ => self.partial.push(b),
            }
        }
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Drops the bytes of an unterminated line.
    pub fn discard_partial(&mut self) {
        self.partial.clear();
    }

    /// Drops everything buffered, complete lines included.
    pub fn clear(&mut self) -> usize {
        let dropped = self.lines.len();
        self.lines.clear();
        self.partial.clear();
        dropped
    }
}

fn decode_ascii(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| char::from(b))
        .collect();
    text.trim().to_string()
}

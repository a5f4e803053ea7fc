//! Scripted in-memory device for tests and offline demos.
//!
//! Replies are keyed by the exact request line (without CRLF). When a request
//! is written, the next scripted reply for it is queued for reading; requests
//! with no script left are silently ignored, so the caller times out.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::time::Duration;

use super::Transport;

#[derive(Debug)]
pub struct MockTransport {
    replies: HashMap<String, VecDeque<Vec<u8>>>,
    input: VecDeque<u8>,
    pending_write: Vec<u8>,
    written: Vec<String>,
    timeout: Duration,
    timeout_history: Vec<Duration>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            input: VecDeque::new(),
            pending_write: Vec::new(),
            written: Vec::new(),
            timeout: Duration::from_secs(2),
            timeout_history: Vec::new(),
        }
    }

    /// Answers `request` once with `line` followed by CRLF.
    pub fn reply(self, request: &str, line: &str) -> Self {
        self.reply_raw(request, format!("{line}\r\n").into_bytes())
    }

    /// Answers `request` once with exactly `bytes`, terminator not included.
    pub fn reply_raw(mut self, request: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.replies
            .entry(request.to_string())
            .or_default()
            .push_back(bytes.into());
        self
    }

    /// Makes `bytes` readable immediately, without waiting for a request.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Request lines written so far, in order.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    /// Every timeout applied through [`Transport::set_read_timeout`].
    pub fn timeout_history(&self) -> &[Duration] {
        &self.timeout_history
    }

    fn complete_requests(&mut self) {
        while let Some(pos) = self.pending_write.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending_write.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(['\r', '\n'])
                .to_string();

            if let Some(reply) = self.replies.get_mut(&line).and_then(VecDeque::pop_front) {
                self.input.extend(reply);
            }
            self.written.push(line);
        }
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.input.is_empty() {
            std::thread::sleep(self.timeout);
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "no scripted data",
            ));
        }

        let n = buf.len().min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending_write.extend_from_slice(buf);
        self.complete_requests();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.timeout = timeout;
        self.timeout_history.push(timeout);
        Ok(())
    }

    fn read_timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        self.input.clear();
        Ok(())
    }

    fn name(&self) -> Option<String> {
        Some("mock".to_string())
    }
}

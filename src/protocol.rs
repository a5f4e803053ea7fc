//! Request encoding and reply validation for the text command protocol.
//!
//! A reply echoes the leading token of the request, or its first two tokens
//! for multi-word commands such as `CML C1 <index>`. Everything after the echo
//! is payload.

/// Reply prefix the firmware uses for commands it does not recognise.
pub const UNKNOWN_COMMAND: &str = "UKN";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("device did not recognise the command: {line}")]
    Unknown { line: String },
    #[error("reply does not echo the command: expected `{expected}`, got `{actual}`")]
    Mismatch { expected: String, actual: String },
}

pub fn encode_command<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|part| part.as_ref())
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Splits a reply on single spaces; consecutive spaces produce empty tokens.
pub fn tokenize(line: &str) -> Vec<&str> {
    line.split(' ').collect()
}

/// Validates `line` against the request `parts` and returns the payload tokens.
pub fn parse_reply<S: AsRef<str>>(parts: &[S], line: &str) -> Result<Vec<String>, ProtocolError> {
    if line.starts_with(UNKNOWN_COMMAND) {
        return Err(ProtocolError::Unknown {
            line: line.to_string(),
        });
    }

    let tokens = tokenize(line);
    let echo_len = if parts.len() > 1 { 2 } else { 1 };
    let mismatch = || ProtocolError::Mismatch {
        expected: encode_command(&parts[..echo_len.min(parts.len())]),
        actual: line.to_string(),
    };

    let Some(command) = parts.first() else {
        return Err(mismatch());
    };
    if tokens[0] != command.as_ref() {
        return Err(mismatch());
    }

    let payload_start = match (parts.get(1), tokens.get(1)) {
        (Some(sub), Some(echoed)) if *echoed == sub.as_ref() => 2,
        (Some(_), Some(_)) => return Err(mismatch()),
        // A bare echo of a multi-word command carries no payload.
        _ => 1,
    };

    Ok(tokens
        .iter()
        .skip(payload_start)
        .map(|token| (*token).to_string())
        .collect())
}

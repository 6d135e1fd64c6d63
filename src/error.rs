//! Error types for the wire codec and the wake API

use thiserror::Error;

/// Failure to decode a frame from a client connection.
///
/// Every variant ends the connection without a reply.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The stream closed before a complete frame arrived
    #[error("stream closed mid-frame")]
    Truncated,
    /// A VarInt ran longer than 5 bytes or overflowed 32 bits
    #[error("malformed varint")]
    MalformedVarInt,
    /// The declared frame length disagrees with its contents
    #[error("frame length mismatch (declared {declared}, consumed {consumed})")]
    LengthMismatch { declared: usize, consumed: usize },
    /// The declared frame length exceeds the configured limit
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
    /// A protocol string was not valid UTF-8
    #[error("invalid protocol string")]
    InvalidString,
    /// Any other socket error
    #[error("i/o error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated
        } else {
            DecodeError::Io(err)
        }
    }
}

impl DecodeError {
    /// Short stable label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Truncated => "truncated",
            DecodeError::MalformedVarInt => "malformed_varint",
            DecodeError::LengthMismatch { .. } => "length_mismatch",
            DecodeError::TooLarge { .. } => "too_large",
            DecodeError::InvalidString => "invalid_string",
            DecodeError::Io(_) => "io",
        }
    }
}

/// Failure of the external wake (power) call
#[derive(Debug, Error)]
pub enum WakeError {
    /// The request never got a response
    #[error("wake request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The panel answered with something other than 204 No Content
    #[error("wake request rejected with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

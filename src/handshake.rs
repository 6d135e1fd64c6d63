//! Client intent detection from the opening handshake packet
//!
//! A client opens every connection with a handshake (packet id `0x00`) that
//! ends with the state it wants to move into: `1` for a server-list status
//! query, `2` for login. That trailing field is all the gateway needs to
//! decide how to answer while the backend is asleep.

use crate::error::DecodeError;
use crate::frame::{write_string, write_varint, Frame, PayloadReader};

/// Packet id of the handshake in the initial protocol state
pub const HANDSHAKE_PACKET_ID: u32 = 0x00;

/// Next-state value requesting the status (server list) flow
pub const NEXT_STATE_STATUS: u32 = 1;

/// Next-state value requesting the login flow
pub const NEXT_STATE_LOGIN: u32 = 2;

/// What the client is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    StatusQuery,
    JoinAttempt,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::StatusQuery => "status",
            Intent::JoinAttempt => "join",
            Intent::Unknown => "unknown",
        }
    }
}

/// A decoded handshake packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: u32,
}

impl Handshake {
    /// Parse a handshake payload. Trailing bytes are an error.
    pub fn parse(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = PayloadReader::new(payload);
        let handshake = Self {
            protocol_version: reader.read_varint()?,
            server_address: reader.read_string()?,
            server_port: reader.read_u16()?,
            next_state: reader.read_varint()?,
        };

        if !reader.is_empty() {
            return Err(DecodeError::LengthMismatch {
                declared: payload.len(),
                consumed: payload.len() - reader.remaining(),
            });
        }

        Ok(handshake)
    }

    pub fn encode_payload(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.server_address.len() + 12);
        write_varint(&mut buf, self.protocol_version);
        write_string(&mut buf, &self.server_address);
        buf.extend_from_slice(&self.server_port.to_be_bytes());
        write_varint(&mut buf, self.next_state);
        buf
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(HANDSHAKE_PACKET_ID, self.encode_payload())
    }

    pub fn intent(&self) -> Intent {
        match self.next_state {
            NEXT_STATE_STATUS => Intent::StatusQuery,
            NEXT_STATE_LOGIN => Intent::JoinAttempt,
            _ => Intent::Unknown,
        }
    }
}

/// Classify a frame. Anything that is not a well-formed handshake is `Unknown`.
pub fn classify(frame: &Frame) -> Intent {
    if frame.packet_id != HANDSHAKE_PACKET_ID {
        return Intent::Unknown;
    }
    match Handshake::parse(&frame.payload) {
        Ok(handshake) => handshake.intent(),
        Err(_) => Intent::Unknown,
    }
}

//! Length-prefixed packet framing for the game client protocol
//!
//! Every packet on the wire is `VarInt(length) ++ VarInt(packet_id) ++ payload`,
//! where `length` counts the packet id and payload bytes. VarInts carry 7 bits
//! per byte, least significant group first, with the high bit marking
//! continuation. They are at most 5 bytes long and hold 32-bit values.

use crate::error::DecodeError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum encoded size of a VarInt
pub const MAX_VARINT_LEN: usize = 5;

/// Largest frame the protocol allows (the biggest 3-byte VarInt)
pub const DEFAULT_MAX_FRAME_LEN: usize = 2_097_151;

/// One decoded packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_id: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(packet_id: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            packet_id,
            payload: payload.into(),
        }
    }

    /// Split a frame body (everything after the length prefix) into id and payload
    pub fn from_body(body: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = PayloadReader::new(body);
        let packet_id = reader.read_varint()?;
        Ok(Self {
            packet_id,
            payload: reader.rest().to_vec(),
        })
    }

    /// Serialize this frame including its length prefix
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(self.packet_id, &self.payload)
    }
}

/// Feed one VarInt byte into `value`. Returns true once the VarInt is complete.
fn push_varint_byte(value: &mut u32, index: usize, byte: u8) -> Result<bool, DecodeError> {
    // The fifth byte may only carry the top 4 bits and must end the VarInt.
    if index == MAX_VARINT_LEN - 1 && byte & 0xF0 != 0 {
        return Err(DecodeError::MalformedVarInt);
    }
    *value |= u32::from(byte & 0x7F) << (7 * index);
    Ok(byte & 0x80 == 0)
}

/// Decode a VarInt from the start of `buf`, returning the value and bytes used
pub fn decode_varint(buf: &[u8]) -> Result<(u32, usize), DecodeError> {
    let mut value = 0;
    for (index, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        if push_varint_byte(&mut value, index, byte)? {
            return Ok((value, index + 1));
        }
    }
    Err(DecodeError::LengthMismatch {
        declared: buf.len(),
        consumed: buf.len() + 1,
    })
}

/// Read a VarInt directly from a stream, one byte at a time.
///
/// Never consumes more than [`MAX_VARINT_LEN`] bytes.
pub async fn read_varint<R>(reader: &mut R) -> Result<u32, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let mut value = 0;
    for index in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await?;
        if push_varint_byte(&mut value, index, byte)? {
            return Ok(value);
        }
    }
    Err(DecodeError::MalformedVarInt)
}

pub fn write_varint(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Number of bytes `value` occupies as a VarInt
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Append a protocol string (VarInt byte length followed by UTF-8)
pub fn write_string(buf: &mut Vec<u8>, value: &str) {
    write_varint(buf, value.len() as u32);
    buf.extend_from_slice(value.as_bytes());
}

/// Encode a protocol string on its own, e.g. as a whole packet payload
pub fn encode_string(value: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(varint_len(value.len() as u32) + value.len());
    write_string(&mut buf, value);
    buf
}

/// Serialize a packet with its length prefix.
///
/// Payloads are expected to stay within the protocol's frame limit.
pub fn encode_frame(packet_id: u32, payload: &[u8]) -> Vec<u8> {
    let body_len = varint_len(packet_id) + payload.len();
    let mut out = Vec::with_capacity(varint_len(body_len as u32) + body_len);
    write_varint(&mut out, body_len as u32);
    write_varint(&mut out, packet_id);
    out.extend_from_slice(payload);
    out
}

/// Read exactly one frame from `reader`.
///
/// Reads the length prefix, then exactly that many bytes, so the stream is
/// left positioned at the start of the next frame.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Frame, DecodeError>
where
    R: AsyncRead + Unpin,
{
    let declared = read_varint(reader).await? as usize;
    if declared == 0 {
        // Not even room for a packet id
        return Err(DecodeError::LengthMismatch {
            declared,
            consumed: 1,
        });
    }
    if declared > max_len {
        return Err(DecodeError::TooLarge {
            len: declared,
            max: max_len,
        });
    }

    let mut body = vec![0u8; declared];
    reader.read_exact(&mut body).await?;
    Frame::from_body(&body)
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, packet_id: u32, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(packet_id, payload)).await?;
    writer.flush().await
}

/// Cursor over a frame body that refuses to read past its end
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn overrun(&self, needed: usize) -> DecodeError {
        DecodeError::LengthMismatch {
            declared: self.buf.len(),
            consumed: self.pos + needed,
        }
    }

    pub fn read_varint(&mut self) -> Result<u32, DecodeError> {
        match decode_varint(&self.buf[self.pos..]) {
            Ok((value, used)) => {
                self.pos += used;
                Ok(value)
            }
            Err(DecodeError::LengthMismatch { .. }) => {
                Err(self.overrun(self.buf.len() - self.pos + 1))
            }
            Err(e) => Err(e),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidString)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(self.overrun(len));
        }
        let buf: &'a [u8] = self.buf;
        let bytes = &buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Consume and return everything left
    pub fn rest(&mut self) -> &'a [u8] {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        self.pos = buf.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

//! Cast v2 wire format.
//!
//! Each message is a 4-byte big-endian length followed by a protobuf
//! `CastMessage`. Only the fields TwitchCast needs are encoded: protocol
//! version, source and destination ids, namespace and a UTF-8 payload.

use thiserror::Error;

/// Devices never send frames anywhere near this size.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const FIELD_PROTOCOL_VERSION: u32 = 1;
const FIELD_SOURCE_ID: u32 = 2;
const FIELD_DESTINATION_ID: u32 = 3;
const FIELD_NAMESPACE: u32 = 4;
const FIELD_PAYLOAD_TYPE: u32 = 5;
const FIELD_PAYLOAD_UTF8: u32 = 6;

const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
    #[error("truncated varint")]
    BadVarint,
    #[error("field {0} runs past the end of the frame")]
    OutOfBounds(u32),
    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(u32),
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CastFrame {
    pub source_id: String,
    pub destination_id: String,
    pub namespace: String,
    pub payload: String,
}

impl CastFrame {
    pub fn new(source_id: &str, destination_id: &str, namespace: &str, payload: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            destination_id: destination_id.to_string(),
            namespace: namespace.to_string(),
            payload: payload.to_string(),
        }
    }

    /// Length-prefixed bytes ready to write on the TLS stream.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut protobuf = Vec::new();
        write_varint_field(&mut protobuf, FIELD_PROTOCOL_VERSION, 0); // CASTV2_1_0
        write_string_field(&mut protobuf, FIELD_SOURCE_ID, &self.source_id);
        write_string_field(&mut protobuf, FIELD_DESTINATION_ID, &self.destination_id);
        write_string_field(&mut protobuf, FIELD_NAMESPACE, &self.namespace);
        write_varint_field(&mut protobuf, FIELD_PAYLOAD_TYPE, 0); // STRING
        write_string_field(&mut protobuf, FIELD_PAYLOAD_UTF8, &self.payload);

        if protobuf.len() > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(protobuf.len()));
        }
        let mut frame = Vec::with_capacity(4 + protobuf.len());
        frame.extend_from_slice(&(protobuf.len() as u32).to_be_bytes());
        frame.extend_from_slice(&protobuf);
        Ok(frame)
    }

    /// Decodes one protobuf body (without the length prefix).
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = 0usize;
        let mut frame = CastFrame::default();

        while cursor < bytes.len() {
            let key = read_varint(bytes, &mut cursor).ok_or(ProtocolError::BadVarint)?;
            let field_number = (key >> 3) as u32;
            let wire_type = (key & 0x07) as u8;
            match wire_type {
                WIRE_VARINT => {
                    read_varint(bytes, &mut cursor).ok_or(ProtocolError::BadVarint)?;
                }
                WIRE_LEN => {
                    let len =
                        read_varint(bytes, &mut cursor).ok_or(ProtocolError::BadVarint)? as usize;
                    let end = cursor
                        .checked_add(len)
                        .filter(|end| *end <= bytes.len())
                        .ok_or(ProtocolError::OutOfBounds(field_number))?;
                    let raw = &bytes[cursor..end];
                    cursor = end;

                    let target = match field_number {
                        FIELD_SOURCE_ID => &mut frame.source_id,
                        FIELD_DESTINATION_ID => &mut frame.destination_id,
                        FIELD_NAMESPACE => &mut frame.namespace,
                        FIELD_PAYLOAD_UTF8 => &mut frame.payload,
                        // payload_binary and unknown fields
                        _ => continue,
                    };
                    *target = std::str::from_utf8(raw)
                        .map_err(|_| ProtocolError::InvalidUtf8(field_number))?
                        .to_string();
                }
                other => return Err(ProtocolError::UnsupportedWireType(other)),
            }
        }

        Ok(frame)
    }
}

/// Pops the first complete frame off `buffer`, leaving any remainder.
///
/// Returns `Ok(None)` while the frame is still incomplete.
pub fn take_frame(buffer: &mut Vec<u8>) -> Result<Option<CastFrame>, ProtocolError> {
    if buffer.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    if buffer.len() < 4 + len {
        return Ok(None);
    }
    let frame = CastFrame::decode(&buffer[4..4 + len]);
    buffer.drain(..4 + len);
    frame.map(Some)
}

fn write_varint_field(out: &mut Vec<u8>, field_number: u32, value: u64) {
    write_varint(out, ((field_number as u64) << 3) | WIRE_VARINT as u64);
    write_varint(out, value);
}

fn write_string_field(out: &mut Vec<u8>, field_number: u32, value: &str) {
    write_varint(out, ((field_number as u64) << 3) | WIRE_LEN as u64);
    write_varint(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_varint(bytes: &[u8], cursor: &mut usize) -> Option<u64> {
    let mut shift = 0u32;
    let mut value = 0u64;
    while *cursor < bytes.len() && shift <= 63 {
        let byte = bytes[*cursor];
        *cursor += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
    }
    None
}

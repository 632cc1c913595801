//! Frame layout: `[id:2][flags:1][length:4][payload:N]`
//!
//! - **id**: message identity (little-endian u16)
//! - **flags**: bit 0 set for reliable delivery, other bits must be clear
//! - **length**: payload size in bytes (little-endian u32)
//! - **payload**: fields written by [NetMessage::write](super::NetMessage::write)

use super::{CodecError, MessageId, NetMessage, WriteBuffer};

/// Header size: 2 (id) + 1 (flags) + 4 (length) = 7 bytes
pub const HEADER_SIZE: usize = 7;

const FLAG_RELIABLE: u8 = 0b0000_0001;

/// Frame format error types
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Not enough data to parse the header
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required
        needed: usize,
        /// Bytes available
        have: usize,
    },
    /// Flags byte has bits set that this version does not know
    #[error("unknown frame flags: {0:#010b}")]
    UnknownFlags(u8),
    /// Length field does not match the bytes following the header
    #[error("payload length mismatch: header says {declared}, frame carries {actual}")]
    LengthMismatch {
        /// Length from the header
        declared: u32,
        /// Bytes after the header
        actual: usize,
    },
}

/// Fixed-size header preceding every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message identity
    pub id: MessageId,
    /// Reliable delivery requested
    pub reliable: bool,
    /// Payload size in bytes
    pub payload_len: u32,
}

impl FrameHeader {
    /// Splits `frame` into its header and payload
    pub fn parse(frame: &[u8]) -> Result<(Self, &[u8]), FrameError> {
        if frame.len() < HEADER_SIZE {
            return Err(FrameError::InsufficientData {
                needed: HEADER_SIZE,
                have: frame.len(),
            });
        }
        let id = MessageId::new(u16::from_le_bytes([frame[0], frame[1]]));
        let flags = frame[2];
        if flags & !FLAG_RELIABLE != 0 {
            return Err(FrameError::UnknownFlags(flags));
        }
        let payload_len = u32::from_le_bytes([frame[3], frame[4], frame[5], frame[6]]);
        let payload = &frame[HEADER_SIZE..];
        if payload.len() != payload_len as usize {
            return Err(FrameError::LengthMismatch {
                declared: payload_len,
                actual: payload.len(),
            });
        }
        let header = Self {
            id,
            reliable: flags & FLAG_RELIABLE != 0,
            payload_len,
        };
        Ok((header, payload))
    }
}

/// Writes header and payload of `message` into `buffer`
pub fn encode_frame(message: &dyn NetMessage, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
    buffer.put_u16(message.get_id().slot())?;
    buffer.put_u8(if message.is_reliable() { FLAG_RELIABLE } else { 0 })?;
    let length_at = buffer.len();
    buffer.put_u32(0)?;
    let payload_at = buffer.len();
    message.write(buffer)?;
    let payload_len = buffer.len() - payload_at;
    let payload_len = u32::try_from(payload_len)
        .map_err(|_| CodecError::Invalid(format!("{} byte payload exceeds u32", payload_len)))?;
    buffer.patch_u32(length_at, payload_len);
    Ok(())
}

//! Message framing for the NetSDR protocol.
//!
//! Every message starts with a 16-bit little-endian header:
//! ```text
//! ┌─────────────┬──────────────────────────┬─────────────────┐
//! │ type (3 b)  │ total length (13 b)      │     body        │
//! │ bits 13-15  │ bits 0-12, incl. header  │  length-2 bytes │
//! └─────────────┴──────────────────────────┴─────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Size of the message header.
pub const HEADER_SIZE: usize = 2;

/// Largest total length the 13-bit field can express.
pub const MAX_MESSAGE_LENGTH: usize = 0x1FFF;

/// Largest body that can be framed.
pub const MAX_BODY_SIZE: usize = MAX_MESSAGE_LENGTH - HEADER_SIZE;

const LENGTH_MASK: u16 = 0x1FFF;
const TYPE_SHIFT: u32 = 13;

/// Message type code carried in the top three header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Host sets a control item.
    SetControlItem = 0,
    /// Target reports the current value of a control item.
    CurrentControlItem = 1,
    /// Target reports the range of a control item.
    ControlItemRange = 2,
    /// Target acknowledges a data item.
    Ack = 3,
    /// Data item 0 (IQ samples).
    DataItem0 = 4,
    /// Data item 1.
    DataItem1 = 5,
    /// Data item 2.
    DataItem2 = 6,
    /// Data item 3.
    DataItem3 = 7,
}

impl MessageType {
    /// Parses a type from the 3-bit code. Only the low three bits are used.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code & 0x07 {
            0 => Self::SetControlItem,
            1 => Self::CurrentControlItem,
            2 => Self::ControlItemRange,
            3 => Self::Ack,
            4 => Self::DataItem0,
            5 => Self::DataItem1,
            6 => Self::DataItem2,
            _ => Self::DataItem3,
        }
    }

    /// Returns true for the four data item types.
    #[must_use]
    pub const fn is_data_item(self) -> bool {
        matches!(
            self,
            Self::DataItem0 | Self::DataItem1 | Self::DataItem2 | Self::DataItem3
        )
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        kind as Self
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Type code from the header.
    pub kind: MessageType,
    /// Everything after the header.
    pub body: Bytes,
}

impl Message {
    /// Creates a message from its parts.
    #[must_use]
    pub fn new(kind: MessageType, body: impl Into<Bytes>) -> Self {
        Self {
            kind,
            body: body.into(),
        }
    }

    /// Returns true if this message carries sample data.
    #[must_use]
    pub const fn is_data_item(&self) -> bool {
        self.kind.is_data_item()
    }

    /// Encodes the message into its wire form.
    pub fn to_bytes(&self) -> Result<Bytes, FrameError> {
        encode(self.kind, &self.body)
    }
}

/// Encodes a header and body into a framed message.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if the body exceeds [`MAX_BODY_SIZE`].
pub fn encode(kind: MessageType, body: &[u8]) -> Result<Bytes, FrameError> {
    if body.len() > MAX_BODY_SIZE {
        return Err(FrameError::TooLarge {
            size: body.len(),
            max: MAX_BODY_SIZE,
        });
    }

    let length = (body.len() + HEADER_SIZE) as u16;
    let header = length | (u16::from(u8::from(kind)) << TYPE_SHIFT);

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    buf.put_u16_le(header);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Decodes one complete message.
///
/// The buffer must hold exactly one message: the length declared in the
/// header has to equal `data.len()`.
///
/// # Errors
///
/// Returns a `FrameError` if:
/// - fewer than two bytes are present
/// - the declared length differs from the buffer length
pub fn decode(data: &[u8]) -> Result<Message, FrameError> {
    if data.len() < HEADER_SIZE {
        return Err(FrameError::TooShort(data.len()));
    }

    let header = u16::from_le_bytes([data[0], data[1]]);
    let declared = usize::from(header & LENGTH_MASK);
    let kind = MessageType::from_code((header >> TYPE_SHIFT) as u8);

    if declared != data.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }

    Ok(Message {
        kind,
        body: Bytes::copy_from_slice(&data[HEADER_SIZE..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_layout() {
        let frame = encode(MessageType::DataItem0, &[0xAA, 0xBB]).unwrap();

        // length 4, type 4 -> 0x8004
        assert_eq!(&frame[..], &[0x04, 0x80, 0xAA, 0xBB]);
    }

    #[test]
    fn test_encode_empty_body() {
        let frame = encode(MessageType::SetControlItem, &[]).unwrap();
        assert_eq!(&frame[..], &[0x02, 0x00]);
    }

    #[test]
    fn test_round_trip_all_types() {
        for code in 0..8u8 {
            let kind = MessageType::from_code(code);
            let body = vec![code; usize::from(code) * 3];
            let frame = encode(kind, &body).unwrap();
            let message = decode(&frame).unwrap();
            assert_eq!(message.kind, kind);
            assert_eq!(&message.body[..], &body[..]);
        }
    }

    #[test]
    fn test_round_trip_max_body() {
        let body = vec![0x5A; MAX_BODY_SIZE];
        let frame = encode(MessageType::DataItem3, &body).unwrap();
        assert_eq!(frame.len(), MAX_MESSAGE_LENGTH);

        let message = decode(&frame).unwrap();
        assert_eq!(message.kind, MessageType::DataItem3);
        assert_eq!(message.body.len(), MAX_BODY_SIZE);
    }

    #[test]
    fn test_encode_rejects_oversized_body() {
        let body = vec![0; MAX_BODY_SIZE + 1];
        let err = encode(MessageType::DataItem0, &body).unwrap_err();
        assert_eq!(
            err,
            FrameError::TooLarge {
                size: MAX_BODY_SIZE + 1,
                max: MAX_BODY_SIZE
            }
        );
    }

    #[test]
    fn test_decode_too_short() {
        assert_eq!(decode(&[]).unwrap_err(), FrameError::TooShort(0));
        assert_eq!(decode(&[0x02]).unwrap_err(), FrameError::TooShort(1));
    }

    #[test]
    fn test_decode_declared_longer_than_buffer() {
        // Header declares 6 bytes, only 4 present
        let err = decode(&[0x06, 0x80, 0x01, 0x02]).unwrap_err();
        assert_eq!(
            err,
            FrameError::LengthMismatch {
                declared: 6,
                actual: 4
            }
        );
    }

    #[test]
    fn test_decode_declared_shorter_than_buffer() {
        let err = decode(&[0x02, 0x00, 0xFF]).unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
    }

    #[test]
    fn test_message_to_bytes() {
        let message = Message::new(MessageType::Ack, vec![0x01]);
        let frame = message.to_bytes().unwrap();
        assert_eq!(&frame[..], &[0x03, 0x60, 0x01]);
        assert_eq!(decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_data_item_kinds() {
        assert!(MessageType::DataItem0.is_data_item());
        assert!(MessageType::DataItem3.is_data_item());
        assert!(!MessageType::Ack.is_data_item());
        assert!(!MessageType::SetControlItem.is_data_item());
    }
}

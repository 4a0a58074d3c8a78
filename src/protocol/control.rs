//! Control items and the messages built from them.
//!
//! A control item body starts with a little-endian 16-bit item code,
//! followed by item-specific parameter bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::protocol::frame::{Message, MessageType};

/// Control item codes used by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ControlItemCode {
    /// Run/stop state of the receiver.
    ReceiverState = 0x0018,
    /// NCO frequency of a receiver channel.
    ReceiverFrequency = 0x0020,
    /// RF filter selection.
    RfFilter = 0x0044,
    /// A/D converter modes (dither, gain).
    AdModes = 0x008A,
    /// IQ output sample rate.
    IqOutputDataSampleRate = 0x00B8,
}

impl ControlItemCode {
    /// Parses a known item code.
    #[must_use]
    pub const fn from_u16(code: u16) -> Option<Self> {
        match code {
            0x0018 => Some(Self::ReceiverState),
            0x0020 => Some(Self::ReceiverFrequency),
            0x0044 => Some(Self::RfFilter),
            0x008A => Some(Self::AdModes),
            0x00B8 => Some(Self::IqOutputDataSampleRate),
            _ => None,
        }
    }
}

impl From<ControlItemCode> for u16 {
    fn from(code: ControlItemCode) -> Self {
        code as Self
    }
}

/// Default IQ output sample rate, in samples per second.
pub const DEFAULT_SAMPLE_RATE: u32 = 100_000;

/// Complex IQ data on the receiver state item.
const IQ_DATA_MODE: u8 = 0x80;
/// Receiver state: idle.
const STATE_IDLE: u8 = 0x01;
/// Receiver state: run.
const STATE_RUN: u8 = 0x02;
/// Contiguous 16-bit capture.
const CAPTURE_16BIT_CONTIGUOUS: u8 = 0x00;
/// Automatic RF filter selection.
const RF_FILTER_AUTO: u8 = 0x00;
/// Dither on, 1.5 gain.
const AD_MODE_DITHER_GAIN: u8 = 0x03;

/// Number of frequency bytes on the wire (40-bit value).
const FREQUENCY_BYTES: usize = 5;

/// A control item split out of a control message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlItem {
    /// Raw item code; see [`ControlItemCode`] for the known ones.
    pub code: u16,
    /// Parameter bytes following the code.
    pub params: Bytes,
}

impl ControlItem {
    /// Splits a control message into item code and parameters.
    ///
    /// # Errors
    ///
    /// Fails for data item messages or bodies shorter than the item code.
    pub fn parse(message: &Message) -> Result<Self, FrameError> {
        if message.is_data_item() {
            return Err(FrameError::NotControlItem);
        }
        if message.body.len() < 2 {
            return Err(FrameError::TooShort(message.body.len()));
        }
        Ok(Self {
            code: u16::from_le_bytes([message.body[0], message.body[1]]),
            params: message.body.slice(2..),
        })
    }

    /// Returns the known item code, if any.
    #[must_use]
    pub const fn known_code(&self) -> Option<ControlItemCode> {
        ControlItemCode::from_u16(self.code)
    }
}

/// Builds a control item message of the given type.
#[must_use]
pub fn control_item(kind: MessageType, code: ControlItemCode, params: &[u8]) -> Message {
    let mut buf = BytesMut::with_capacity(2 + params.len());
    buf.put_u16_le(code.into());
    buf.put_slice(params);
    Message::new(kind, buf.freeze())
}

/// Highest frequency the 40-bit wire field can carry.
pub const MAX_FREQUENCY: u64 = (1 << 40) - 1;

/// Builds the message that tunes `channel` to `hz`.
///
/// The frequency is sent as a 40-bit little-endian value after the channel id.
///
/// # Errors
///
/// Returns [`FrameError::FrequencyOutOfRange`] above [`MAX_FREQUENCY`].
pub fn set_frequency(hz: u64, channel: u8) -> Result<Message, FrameError> {
    if hz > MAX_FREQUENCY {
        return Err(FrameError::FrequencyOutOfRange(hz));
    }

    let mut params = Vec::with_capacity(1 + FREQUENCY_BYTES);
    params.push(channel);
    params.extend_from_slice(&hz.to_le_bytes()[..FREQUENCY_BYTES]);
    Ok(control_item(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverFrequency,
        &params,
    ))
}

/// Builds the message that starts IQ streaming.
#[must_use]
pub fn start_iq() -> Message {
    control_item(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverState,
        &[IQ_DATA_MODE, STATE_RUN, CAPTURE_16BIT_CONTIGUOUS, 0x01],
    )
}

/// Builds the message that stops IQ streaming.
#[must_use]
pub fn stop_iq() -> Message {
    control_item(
        MessageType::SetControlItem,
        ControlItemCode::ReceiverState,
        &[0x00, STATE_IDLE, 0x00, 0x00],
    )
}

/// Builds the fixed configuration sent at the start of every session:
/// sample rate, RF filter, A/D modes.
#[must_use]
pub fn init_sequence() -> [Message; 3] {
    let mut rate = Vec::with_capacity(5);
    rate.push(0x00);
    rate.extend_from_slice(&DEFAULT_SAMPLE_RATE.to_le_bytes());

    [
        control_item(
            MessageType::SetControlItem,
            ControlItemCode::IqOutputDataSampleRate,
            &rate,
        ),
        control_item(
            MessageType::SetControlItem,
            ControlItemCode::RfFilter,
            &[0x00, RF_FILTER_AUTO],
        ),
        control_item(
            MessageType::SetControlItem,
            ControlItemCode::AdModes,
            &[0x00, AD_MODE_DITHER_GAIN],
        ),
    ]
}

//! Protocol definitions for NetSDR communication.
//!
//! This module contains the pure message layer:
//! - Header framing (length + type code)
//! - Control items and the fixed session messages
//! - Sample extraction from data items
//!
//! Nothing here performs I/O.

pub mod control;
pub mod frame;
pub mod sample;

pub use control::{
    ControlItem, ControlItemCode, MAX_FREQUENCY, control_item, init_sequence, set_frequency,
    start_iq, stop_iq,
};
pub use frame::{
    HEADER_SIZE, MAX_BODY_SIZE, MAX_MESSAGE_LENGTH, Message, MessageType, decode, encode,
};
pub use sample::decode_samples;

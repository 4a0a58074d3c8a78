//! # netsdr
//!
//! A Rust client library for NetSDR-style network receivers.
//!
//! A session uses two channels: commands and responses travel over TCP,
//! IQ samples arrive as UDP datagrams and are appended to a file.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Pure message codec for the 2-byte length/type header
//! - Background receive loops with cooperative cancellation
//! - Diagnostics through `tracing`
//!
//! ## Quick Start
//!
//! ```no_run
//! use netsdr::{ClientConfig, NetSdrClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netsdr::Error> {
//!     let mut client = NetSdrClient::new(ClientConfig::new("192.168.1.20"));
//!     client.connect().await?;
//!
//!     client.change_frequency(14_074_000, 0).await?;
//!     client.start_iq().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     client.stop_iq().await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Message framing and builders (no I/O)
//! - [`transport`] - TCP control channel and UDP data channel
//! - [`event`] - Publish/subscribe for inbound bytes
//! - [`store`] - Append-only sample file
//! - [`client`] - High-level [`NetSdrClient`] session

pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod store;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientConfig, NetSdrClient};
pub use error::{Error, FrameError, Result};
pub use event::{Event, EventDispatcher, EventFilter, EventKind, Subscription};
pub use protocol::{ControlItem, ControlItemCode, Message, MessageType};
pub use store::SampleFile;
pub use transport::{
    ControlTransport, DataTransport, TcpConfig, TcpControlChannel, UdpConfig, UdpDataChannel,
};

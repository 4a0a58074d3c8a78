//! Transport layer for NetSDR communication.
//!
//! Two channels make up a session:
//! - a reliable control channel ([`TcpControlChannel`])
//! - a receive-only datagram channel for samples ([`UdpDataChannel`])
//!
//! Both move opaque bytes; message framing lives in [`crate::protocol`].

pub mod tcp;
pub mod udp;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::event::Subscription;

/// Trait for the command/response channel.
pub trait ControlTransport: Send + Sync {
    /// Connects to the device. Connection failures are reported through
    /// diagnostics and leave the channel disconnected.
    fn connect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Disconnects from the device.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Sends raw bytes to the device.
    fn send(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;

    /// Subscribes to inbound bytes and lifecycle events.
    fn subscribe(&self) -> Subscription;

    /// Releases everything; later operations fail with `Error::Disposed`.
    fn dispose(&mut self);
}

/// Trait for the streaming channel.
///
/// Methods take `&self` so that one task can run the listen loop while
/// another stops it.
pub trait DataTransport: Send + Sync {
    /// Runs the receive loop until stopped. Resolves once the loop has ended.
    fn start_listening(&self) -> BoxFuture<'_, Result<()>>;

    /// Stops the running loop, if any.
    fn stop_listening(&self) -> Result<()>;

    /// Returns true while a receive loop is installed.
    fn is_listening(&self) -> bool;

    /// Subscribes to inbound datagrams.
    ///
    /// Subscriptions are bounded; a subscriber that falls behind skips
    /// payloads.
    fn subscribe(&self) -> Subscription;

    /// Installs the queue that receives every datagram payload, or removes
    /// it with `None`.
    ///
    /// The receive loop waits for room in the queue, so no payload is
    /// skipped. A loop picks up the sender when it starts; removing it
    /// releases the channel's own handle.
    fn set_payload_sender(&self, sender: Option<mpsc::Sender<Bytes>>);

    /// Releases everything; later operations fail with `Error::Disposed`.
    fn dispose(&self);
}

pub use tcp::{TcpConfig, TcpControlChannel};
pub use udp::{UdpConfig, UdpDataChannel};

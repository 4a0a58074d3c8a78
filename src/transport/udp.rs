//! UDP data channel.
//!
//! [`UdpDataChannel`] binds a datagram socket to a local port and dispatches
//! every received payload verbatim as [`Event::Data`]. A payload queue set
//! with [`set_payload_sender`](DataTransport::set_payload_sender) receives
//! the same payloads without loss. There is no send path: the device streams
//! samples, the host only listens.
//!
//! The channel is a cheap handle. Clones share the listener state, so one
//! task can run [`start_listening`](DataTransport::start_listening) while
//! another calls [`stop_listening`](DataTransport::stop_listening).

use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, Subscription};
use crate::transport::DataTransport;

/// Default data port of NetSDR receivers.
pub const DEFAULT_DATA_PORT: u16 = 60000;

/// Default capacity of the event channel. Sample streams are bursty.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Receive buffer size; large enough for any UDP payload.
const DATAGRAM_BUFFER_SIZE: usize = 65_536;

/// Configuration for the data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpConfig {
    /// Local address to bind.
    pub addr: SocketAddr,
    /// Capacity of the inbound event channel.
    pub event_capacity: usize,
}

impl UdpConfig {
    /// Creates a configuration listening on `port` on all interfaces.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the local address.
    #[must_use]
    pub const fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PORT)
    }
}

#[derive(Debug, Default)]
struct ListenerState {
    /// Token of the running loop; `None` when idle.
    cancel: Option<CancellationToken>,
    /// Incremented for every listen cycle.
    generation: u64,
    /// Lossless payload queue, copied into each loop at start.
    payload_tx: Option<mpsc::Sender<Bytes>>,
    disposed: bool,
}

/// UDP data channel for IQ sample datagrams.
#[derive(Debug, Clone)]
pub struct UdpDataChannel {
    config: UdpConfig,
    state: Arc<Mutex<ListenerState>>,
    dispatcher: EventDispatcher,
}

impl UdpDataChannel {
    /// Creates a new, idle channel.
    #[must_use]
    pub fn new(config: UdpConfig) -> Self {
        let dispatcher = EventDispatcher::new(config.event_capacity);
        Self {
            config,
            state: Arc::new(Mutex::new(ListenerState::default())),
            dispatcher,
        }
    }

    /// Creates a channel for `port` with default settings.
    #[must_use]
    pub fn with_port(port: u16) -> Self {
        Self::new(UdpConfig::new(port))
    }

    /// Returns the configured local address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.config.addr
    }

    /// Same as [`stop_listening`](DataTransport::stop_listening).
    pub fn exit(&self) -> Result<()> {
        self.stop("exit")
    }

    fn lock_state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self, reason: &str) -> Result<()> {
        let mut state = self.lock_state();
        if state.disposed {
            return Err(disposed());
        }

        match state.cancel.take() {
            Some(cancel) => {
                cancel.cancel();
                tracing::debug!(addr = %self.config.addr, reason, "stopped listening for datagrams");
            }
            None => {
                tracing::debug!(addr = %self.config.addr, reason, "datagram listener already stopped");
            }
        }
        Ok(())
    }

    /// Clears the token of cycle `generation` if it is still installed.
    fn release(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.generation == generation {
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
        }
    }

    async fn receive_loop(
        &self,
        cancel: &CancellationToken,
        mut payload_tx: Option<mpsc::Sender<Bytes>>,
    ) -> Result<()> {
        let socket = UdpSocket::bind(self.config.addr).await.map_err(|e| {
            tracing::warn!(addr = %self.config.addr, error = %e, "failed to bind data socket");
            Error::Io(e)
        })?;

        tracing::debug!(addr = %self.config.addr, "listening for datagrams");
        let mut buf = vec![0u8; DATAGRAM_BUFFER_SIZE];

        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((n, from)) => {
                    tracing::trace!(bytes = n, from = %from, "datagram received");
                    let payload = Bytes::copy_from_slice(&buf[..n]);
                    self.dispatcher.dispatch(Event::Data(payload.clone()));

                    // A received payload is queued even while stopping
                    let closed = match &payload_tx {
                        Some(tx) => tx.send(payload).await.is_err(),
                        None => false,
                    };
                    if closed {
                        tracing::debug!("payload queue closed");
                        payload_tx = None;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "error receiving datagram");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Releases the listen cycle when dropped, whether the loop ended on its
/// own or its future was dropped mid-receive.
struct ListenScope<'a> {
    channel: &'a UdpDataChannel,
    generation: u64,
}

impl Drop for ListenScope<'_> {
    fn drop(&mut self) {
        self.channel.release(self.generation);
        tracing::debug!(addr = %self.channel.config.addr, "datagram listener ended");
    }
}

const fn disposed() -> Error {
    Error::Disposed {
        component: "UdpDataChannel",
    }
}

impl DataTransport for UdpDataChannel {
    fn start_listening(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (cancel, generation, payload_tx) = {
                let mut state = self.lock_state();
                if state.disposed {
                    return Err(disposed());
                }
                if state.cancel.is_some() {
                    tracing::debug!(addr = %self.config.addr, "datagram listener already running");
                    return Ok(());
                }
                state.generation += 1;
                let cancel = CancellationToken::new();
                state.cancel = Some(cancel.clone());
                (cancel, state.generation, state.payload_tx.clone())
            };

            let _scope = ListenScope {
                channel: self,
                generation,
            };
            self.receive_loop(&cancel, payload_tx).await
        })
    }

    fn stop_listening(&self) -> Result<()> {
        self.stop("stop_listening")
    }

    fn is_listening(&self) -> bool {
        self.lock_state().cancel.is_some()
    }

    fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    fn set_payload_sender(&self, sender: Option<mpsc::Sender<Bytes>>) {
        self.lock_state().payload_tx = sender;
    }

    fn dispose(&self) {
        let mut state = self.lock_state();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.payload_tx = None;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        tracing::debug!(addr = %self.config.addr, "data channel disposed");
    }
}

impl PartialEq for UdpDataChannel {
    fn eq(&self, other: &Self) -> bool {
        self.config.addr == other.config.addr
    }
}

impl Eq for UdpDataChannel {}

impl Hash for UdpDataChannel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.config.addr.hash(state);
    }
}

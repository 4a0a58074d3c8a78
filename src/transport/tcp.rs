//! TCP control channel.
//!
//! [`TcpControlChannel`] owns one connection to the device's control port.
//! While connected, a background task reads from the socket and dispatches
//! every chunk as [`Event::Data`]. Writes go straight to the write half.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, Subscription};
use crate::transport::ControlTransport;

/// Default control port of NetSDR receivers.
pub const DEFAULT_CONTROL_PORT: u16 = 50000;

/// Size of the receive buffer (largest data item message).
pub const RECEIVE_BUFFER_SIZE: usize = 8194;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Configuration for the control channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Device host name or address.
    pub host: String,
    /// Control port.
    pub port: u16,
    /// Capacity of the inbound event channel.
    pub event_capacity: usize,
}

impl TcpConfig {
    /// Creates a configuration for `host` on the default control port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_CONTROL_PORT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Returns the `host:port` string.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resources of one connect cycle.
struct Connection {
    writer: OwnedWriteHalf,
    cancel: CancellationToken,
    read_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stops the receive loop without waiting for it.
    fn abort(self) {
        self.cancel.cancel();
        self.read_task.abort();
    }
}

/// TCP control channel to a NetSDR device.
pub struct TcpControlChannel {
    config: TcpConfig,
    connection: Option<Connection>,
    dispatcher: EventDispatcher,
    disposed: bool,
}

impl TcpControlChannel {
    /// Creates a new, disconnected channel.
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        let dispatcher = EventDispatcher::new(config.event_capacity);
        Self {
            config,
            connection: None,
            dispatcher,
            disposed: false,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed {
                component: "TcpControlChannel",
            });
        }
        Ok(())
    }

    /// Drops the current connection, if any, without a graceful shutdown.
    fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }
}

impl ControlTransport for TcpControlChannel {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.ensure_not_disposed()?;

            let addr = self.config.addr();
            if self.is_connected() {
                tracing::debug!(addr = %addr, "already connected");
                return Ok(());
            }

            // A loop that ended on peer close leaves its scope behind
            self.release();

            tracing::debug!(addr = %addr, "connecting to control port");

            let stream = match TcpStream::connect(&addr).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "failed to connect");
                    self.dispatcher.dispatch(Event::ConnectFailed {
                        reason: e.to_string(),
                    });
                    return Ok(());
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!(addr = %addr, error = %e, "failed to set TCP_NODELAY");
            }

            let (reader, writer) = stream.into_split();
            let cancel = CancellationToken::new();
            let alive = Arc::new(AtomicBool::new(true));
            let read_task = tokio::spawn(run_read_loop(
                reader,
                self.dispatcher.clone(),
                Arc::clone(&alive),
                cancel.clone(),
            ));

            self.connection = Some(Connection {
                writer,
                cancel,
                read_task,
                alive,
            });

            tracing::info!(addr = %addr, "connected");
            self.dispatcher.dispatch(Event::Connected);
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.ensure_not_disposed()?;

            if !self.is_connected() {
                tracing::debug!("no active connection to disconnect");
                self.release();
                return Ok(());
            }

            let Some(mut connection) = self.connection.take() else {
                return Ok(());
            };

            connection.cancel.cancel();
            let closed = connection.writer.shutdown().await;

            // Cleanup runs whatever the shutdown reported
            let _ = connection.read_task.await;
            drop(connection.writer);

            tracing::info!(addr = %self.config.addr(), "disconnected");
            self.dispatcher.dispatch(Event::Disconnected);

            closed.map_err(|e| {
                tracing::warn!(error = %e, "error while disconnecting");
                Error::Io(e)
            })
        })
    }

    fn send(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.ensure_not_disposed()?;

            let connection = self
                .connection
                .as_mut()
                .filter(|c| c.is_alive())
                .ok_or(Error::NotConnected)?;

            tracing::trace!(bytes = data.len(), data = %hex::encode(&data), "sending");
            connection.writer.write_all(&data).await?;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_alive)
    }

    fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.release();
        tracing::debug!(addr = %self.config.addr(), "control channel disposed");
    }
}

impl Drop for TcpControlChannel {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reads from the socket until cancelled, closed by the peer, or failed.
async fn run_read_loop(
    mut reader: OwnedReadHalf,
    dispatcher: EventDispatcher,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    tracing::debug!("control receive loop started");
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            read = reader.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                tracing::debug!("peer closed control connection");
                break;
            }
            Ok(n) => {
                tracing::trace!(bytes = n, "control data received");
                dispatcher.dispatch(Event::Data(Bytes::copy_from_slice(&buf[..n])));
            }
            Err(e) => {
                tracing::warn!(error = %e, "control receive loop failed");
                break;
            }
        }
    }

    alive.store(false, Ordering::Release);
    tracing::debug!("control receive loop stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;
    use crate::event::{EventFilter, EventKind};

    async fn local_listener() -> (TcpListener, TcpControlChannel) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let channel = TcpControlChannel::new(TcpConfig::new("127.0.0.1").port(port));
        (listener, channel)
    }

    #[test]
    fn test_tcp_config_defaults() {
        let config = TcpConfig::new("radio.local");
        assert_eq!(config.port, DEFAULT_CONTROL_PORT);
        assert_eq!(config.addr(), "radio.local:50000");
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected() {
        let mut channel = TcpControlChannel::new(TcpConfig::new("localhost").port(5555));

        channel.disconnect().await.unwrap();
        channel.disconnect().await.unwrap();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_send_when_not_connected() {
        let mut channel = TcpControlChannel::new(TcpConfig::new("localhost").port(5555));
        let err = channel.send(Bytes::from_static(b"hi")).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let (listener, mut channel) = local_listener().await;

        channel.connect().await.unwrap();
        assert!(channel.is_connected());

        let (mut server, _) = listener.accept().await.unwrap();
        channel.send(Bytes::from_static(b"hello")).await.unwrap();

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        channel.disconnect().await.unwrap();
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_inbound_data_is_dispatched() {
        let (listener, mut channel) = local_listener().await;
        let mut sub = channel.subscribe();

        channel.connect().await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(&[0x05, 0x00, 0x18, 0x00, 0x80]).await.unwrap();

        let data = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if let Some(Event::Data(bytes)) = sub.recv().await {
                    return bytes;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(&data[..], &[0x05, 0x00, 0x18, 0x00, 0x80]);

        channel.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_connection() {
        let (listener, mut channel) = local_listener().await;

        channel.connect().await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();
        channel.connect().await.unwrap();
        assert!(channel.is_connected());

        // No second connection was opened
        let second = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported_not_raised() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut channel = TcpControlChannel::new(TcpConfig::new("127.0.0.1").port(port));

        let waiter = {
            let dispatcher = channel.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .wait_for(
                        EventFilter::kinds(vec![EventKind::ConnectFailed]),
                        Duration::from_secs(2),
                    )
                    .await
            })
        };
        while channel.dispatcher.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }

        channel.connect().await.unwrap();
        assert!(!channel.is_connected());
        assert!(matches!(
            waiter.await.unwrap(),
            Some(Event::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_peer_close_marks_disconnected() {
        let (listener, mut channel) = local_listener().await;

        channel.connect().await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        drop(server);

        tokio::time::timeout(Duration::from_secs(2), async {
            while channel.is_connected() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let err = channel.send(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));

        // Reconnect after the peer went away
        channel.connect().await.unwrap();
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn test_operations_after_dispose() {
        let (listener, mut channel) = local_listener().await;
        channel.connect().await.unwrap();
        let _server = listener.accept().await.unwrap();

        channel.dispose();
        channel.dispose();
        assert!(!channel.is_connected());

        assert!(matches!(
            channel.connect().await,
            Err(Error::Disposed { .. })
        ));
        assert!(matches!(
            channel.disconnect().await,
            Err(Error::Disposed { .. })
        ));
        assert!(matches!(
            channel.send(Bytes::from_static(b"x")).await,
            Err(Error::Disposed { .. })
        ));
    }
}

//! Main [`NetSdrClient`] implementation.
//!
//! This module provides the session layer that combines the control
//! channel, the data channel and the sample store into one interface.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::event::{Event, Subscription};
use crate::protocol::{self, ControlItem, Message};
use crate::store::{DEFAULT_SAMPLE_PATH, SampleFile};
use crate::transport::{
    ControlTransport, DataTransport, TcpConfig, TcpControlChannel, UdpConfig, UdpDataChannel,
};

/// Payloads queued between the data channel and the sample file.
const SAMPLE_QUEUE_CAPACITY: usize = 1024;

/// Configuration for a [`NetSdrClient`] over TCP/UDP.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control channel settings.
    pub control: TcpConfig,
    /// Data channel settings.
    pub data: UdpConfig,
    /// File receiving the IQ samples.
    pub sample_path: PathBuf,
}

impl ClientConfig {
    /// Creates a configuration for `host` with default ports and sample path.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            control: TcpConfig::new(host),
            data: UdpConfig::default(),
            sample_path: PathBuf::from(DEFAULT_SAMPLE_PATH),
        }
    }

    /// Sets the control port.
    #[must_use]
    pub fn control_port(mut self, port: u16) -> Self {
        self.control = self.control.port(port);
        self
    }

    /// Sets the local data port.
    #[must_use]
    pub fn data_port(mut self, port: u16) -> Self {
        self.data.addr.set_port(port);
        self
    }

    /// Sets the sample file path.
    #[must_use]
    pub fn sample_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sample_path = path.into();
        self
    }
}

/// Background tasks of one streaming cycle.
struct Streaming {
    cancel: CancellationToken,
    listen_task: JoinHandle<()>,
    sample_task: JoinHandle<()>,
}

/// Client for a NetSDR receiver.
pub struct NetSdrClient<C, D> {
    control: C,
    data: Arc<D>,
    store: Arc<Mutex<SampleFile>>,
    sample_path: PathBuf,

    // Background tasks
    streaming: Option<Streaming>,
    control_task: Option<JoinHandle<()>>,
}

impl NetSdrClient<TcpControlChannel, UdpDataChannel> {
    /// Creates a new client over TCP/UDP (not yet connected).
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transports(
            TcpControlChannel::new(config.control),
            UdpDataChannel::new(config.data),
            config.sample_path,
        )
    }
}

impl<C: ControlTransport, D: DataTransport + 'static> NetSdrClient<C, D> {
    /// Creates a client from existing transports.
    #[must_use]
    pub fn with_transports(control: C, data: D, sample_path: impl Into<PathBuf>) -> Self {
        let sample_path = sample_path.into();
        Self {
            control,
            data: Arc::new(data),
            store: Arc::new(Mutex::new(SampleFile::new(&sample_path))),
            sample_path,
            streaming: None,
            control_task: None,
        }
    }

    /// Returns true if the control channel is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.control.is_connected()
    }

    /// Returns true while IQ streaming is active.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Returns the sample file path.
    #[must_use]
    pub fn sample_path(&self) -> &Path {
        &self.sample_path
    }

    /// Subscribes to raw control channel traffic (responses, acks) and
    /// connection events.
    #[must_use]
    pub fn subscribe_control(&self) -> Subscription {
        self.control.subscribe()
    }

    /// Connects to the device and sends the session configuration.
    ///
    /// A failed connection attempt is reported through `tracing` and a
    /// [`Event::ConnectFailed`] event; the client then stays disconnected.
    /// Calling this while connected does nothing; the configuration is
    /// sent once per connection.
    pub async fn connect(&mut self) -> Result<()> {
        if self.control.is_connected() {
            tracing::debug!("already connected, session configuration not resent");
            return Ok(());
        }

        self.control.connect().await?;
        if !self.control.is_connected() {
            return Ok(());
        }

        self.spawn_control_monitor();

        // Responses are not awaited; TCP keeps the order
        for message in protocol::init_sequence() {
            self.send_message(&message).await?;
        }

        tracing::info!("session initialized");
        Ok(())
    }

    /// Stops streaming if needed, then disconnects the control channel.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.streaming.is_some() {
            if let Err(e) = self.stop_iq().await {
                tracing::warn!(error = %e, "failed to stop IQ before disconnect");
            }
            // stop_iq skips everything once the peer has closed the connection
            if self.streaming.is_some() {
                self.finish_streaming().await;
            }
        }

        if let Some(task) = self.control_task.take() {
            task.abort();
        }

        self.control.disconnect().await
    }

    /// Starts IQ streaming and records incoming samples.
    ///
    /// Does nothing when not connected.
    pub async fn start_iq(&mut self) -> Result<()> {
        if !self.control.is_connected() {
            tracing::warn!("no active connection, IQ streaming not started");
            return Ok(());
        }

        self.send_message(&protocol::start_iq()).await?;

        if self.streaming.is_none() {
            let cancel = CancellationToken::new();

            // Install the queue before the listener can receive anything
            let (payload_tx, payload_rx) = mpsc::channel(SAMPLE_QUEUE_CAPACITY);
            self.data.set_payload_sender(Some(payload_tx));
            let sample_task = tokio::spawn(consume_samples(payload_rx, Arc::clone(&self.store)));

            let data = Arc::clone(&self.data);
            let listen_cancel = cancel.clone();
            let listen_task = tokio::spawn(async move {
                let mut listen = data.start_listening();
                let result = tokio::select! {
                    biased;
                    result = &mut listen => result,
                    () = listen_cancel.cancelled() => {
                        // The loop may have started after the stop request
                        if let Err(e) = data.stop_listening() {
                            tracing::debug!(error = %e, "data channel already released");
                        }
                        listen.await
                    }
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "data channel stopped with error");
                }
            });

            self.streaming = Some(Streaming {
                cancel,
                listen_task,
                sample_task,
            });
        }

        tracing::info!("IQ streaming started");
        Ok(())
    }

    /// Stops IQ streaming.
    ///
    /// Does nothing when not connected. Safe to call without a prior start.
    pub async fn stop_iq(&mut self) -> Result<()> {
        if !self.control.is_connected() {
            tracing::debug!("no active connection, IQ streaming not stopped");
            return Ok(());
        }

        let sent = self.send_message(&protocol::stop_iq()).await;
        self.finish_streaming().await;

        tracing::info!("IQ streaming stopped");
        sent
    }

    /// Tunes `channel` to `hz`.
    ///
    /// Fails with [`Error::NotConnected`](crate::Error::NotConnected) when
    /// there is no connection. Frequencies above [`MAX_FREQUENCY`](protocol::MAX_FREQUENCY) fail
    /// with a frame error before anything is sent.
    pub async fn change_frequency(&mut self, hz: u64, channel: u8) -> Result<()> {
        let message = protocol::set_frequency(hz, channel)?;
        self.send_message(&message).await
    }

    /// Disposes both channels and stops all background work.
    ///
    /// Idempotent. Channel operations fail with
    /// [`Error::Disposed`](crate::Error::Disposed) afterwards.
    pub fn dispose(&mut self) {
        self.abort_tasks();
        self.data.dispose();
        self.control.dispose();
    }

    async fn send_message(&mut self, message: &Message) -> Result<()> {
        let bytes = message.to_bytes()?;
        self.control.send(bytes).await
    }

    /// Stops the data listener, then lets the sample consumer store every
    /// queued payload before it ends.
    async fn finish_streaming(&mut self) {
        if let Err(e) = self.data.stop_listening() {
            tracing::warn!(error = %e, "failed to stop data channel");
        }

        if let Some(streaming) = self.streaming.take() {
            streaming.cancel.cancel();
            let _ = streaming.listen_task.await;

            // Closes the queue; the consumer drains it and returns
            self.data.set_payload_sender(None);
            let _ = streaming.sample_task.await;
        }
    }

    fn spawn_control_monitor(&mut self) {
        if let Some(task) = self.control_task.take() {
            task.abort();
        }

        let mut subscription = self.control.subscribe();
        self.control_task = Some(tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if let Event::Data(bytes) = event {
                    trace_control_response(&bytes);
                }
            }
        }));
    }
}

impl<C, D> NetSdrClient<C, D> {
    fn abort_tasks(&mut self) {
        if let Some(streaming) = self.streaming.take() {
            streaming.cancel.cancel();
            streaming.listen_task.abort();
            streaming.sample_task.abort();
        }
        if let Some(task) = self.control_task.take() {
            task.abort();
        }
    }
}

/// Stores queued payloads until the queue is closed and empty.
async fn consume_samples(mut payloads: mpsc::Receiver<Bytes>, store: Arc<Mutex<SampleFile>>) {
    while let Some(payload) = payloads.recv().await {
        if let Err(e) = store_payload(&payload, &store).await {
            tracing::warn!(error = %e, bytes = payload.len(), "dropped data payload");
        }
        if payloads.is_empty() {
            flush_samples(&store).await;
        }
    }
    flush_samples(&store).await;
}

async fn flush_samples(store: &Mutex<SampleFile>) {
    let mut store = store.lock().await;
    if let Err(e) = store.flush().await {
        tracing::warn!(error = %e, path = %store.path().display(), "failed to flush sample file");
    }
}

/// Decodes one datagram and appends data item bodies to the store.
///
/// Returns whether anything was written.
async fn store_payload(payload: &[u8], store: &Mutex<SampleFile>) -> Result<bool> {
    let message = protocol::decode(payload)?;
    if !message.is_data_item() {
        tracing::trace!(kind = ?message.kind, "ignoring non-data message on data channel");
        return Ok(false);
    }

    store.lock().await.append(&message.body).await?;
    Ok(true)
}

fn trace_control_response(bytes: &[u8]) {
    match protocol::decode(bytes) {
        Ok(message) => match ControlItem::parse(&message) {
            Ok(item) => tracing::debug!(
                kind = ?message.kind,
                code = item.code,
                params = %hex::encode(&item.params),
                "control response"
            ),
            Err(_) => tracing::debug!(
                kind = ?message.kind,
                body = %hex::encode(&message.body),
                "control response"
            ),
        },
        Err(e) => tracing::debug!(error = %e, data = %hex::encode(bytes), "undecoded control data"),
    }
}

impl<C, D> Drop for NetSdrClient<C, D> {
    fn drop(&mut self) {
        // Abort background tasks
        self.abort_tasks();
    }
}

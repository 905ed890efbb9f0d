use crate::core::errors::{ExchangeError, ProtocolError};
use crate::core::kernel::codec::WsCodec;
use crate::core::kernel::ws::{WsConfig, WsReader, WsTransport, WsWriter};
use crate::exchanges::bitstamp::codec::BitstampCodec;
use crate::exchanges::bitstamp::router::{MessageRouter, RouteOutcome};
use crate::exchanges::bitstamp::subscription::{Subscription, SubscriptionRegistry};
use futures_util::future::try_join_all;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// Lifecycle of a [`WebSocketSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

type SendAck = oneshot::Sender<Result<(), ExchangeError>>;

/// A frame queued for the writer task
struct Outbound {
    frame: Message,
    ack: Option<SendAck>,
}

type Link = mpsc::UnboundedSender<Outbound>;

/// Why a connection ended
enum Disconnect {
    Shutdown,
    Reconnect,
}

const PROTOCOL_ERROR_BUFFER: usize = 64;
/// Upper bound on unsubscribing and on the close handshake when shutting a connection down
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Self-healing Bitstamp WebSocket session.
///
/// One connection at a time. The writer task is the only thing that writes to
/// the socket; the receive loop reads it and hands every frame to the
/// [`MessageRouter`]. Dropped connections and `bts:request_reconnect` are
/// followed by a fresh connection that replays the registry's current
/// subscriptions.
///
/// ```rust,no_run
/// use stampx::core::kernel::{TungsteniteWs, WsConfig};
/// use stampx::exchanges::bitstamp::{callback, Channel, Subscription, WebSocketSession};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), stampx::ExchangeError> {
/// let transport = TungsteniteWs::new("wss://ws.bitstamp.net".to_string(), "bitstamp".to_string());
/// let session = Arc::new(WebSocketSession::new(transport, WsConfig::default()));
///
/// session
///     .subscribe(
///         Subscription::new(Channel::live_trades("btc", "usd")?)
///             .with_callback(callback(|frame| async move {
///                 println!("{}", frame);
///                 Ok(())
///             })),
///     )
///     .await?;
///
/// let runner = Arc::clone(&session);
/// tokio::spawn(async move { runner.run().await });
/// # Ok(())
/// # }
/// ```
pub struct WebSocketSession<T: WsTransport> {
    transport: T,
    config: WsConfig,
    codec: BitstampCodec,
    registry: Arc<SubscriptionRegistry>,
    router: MessageRouter,
    state: watch::Sender<ConnectionState>,
    protocol_errors: broadcast::Sender<ProtocolError>,
    link: Mutex<Option<Link>>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl<T: WsTransport> WebSocketSession<T> {
    pub fn new(transport: T, config: WsConfig) -> Self {
        Self::with_registry(transport, config, Arc::new(SubscriptionRegistry::new()))
    }

    /// Build a session around an existing registry
    pub fn with_registry(
        transport: T,
        config: WsConfig,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (protocol_errors, _) = broadcast::channel(PROTOCOL_ERROR_BUFFER);

        Self {
            transport,
            config,
            codec: BitstampCodec,
            router: MessageRouter::new(Arc::clone(&registry)),
            registry,
            state,
            protocol_errors,
            link: Mutex::new(None),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// `bts:error` events reported by the server
    pub fn protocol_errors(&self) -> broadcast::Receiver<ProtocolError> {
        self.protocol_errors.subscribe()
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Register a subscription and, if a connection is up, send its subscribe frame.
    ///
    /// Duplicate channels are rejected with [`ExchangeError::DuplicateChannel`].
    pub async fn subscribe(&self, subscription: Subscription) -> Result<String, ExchangeError> {
        self.ensure_open()?;
        let frame = self
            .codec
            .encode_subscription(&subscription.channel().subscribe_message())?;

        let (channel_id, ack) = {
            let link = self.link.lock().await;
            let channel_id = self.registry.add(subscription)?;
            let ack = link.as_ref().and_then(|link| enqueue(link, frame));
            (channel_id, ack)
        };

        if let Some(ack) = ack {
            // A failed write drops the connection; the frame is replayed on reconnect.
            if let Err(e) = wait_ack(ack).await {
                debug!(channel = %channel_id, error = %e, "Subscribe frame not delivered");
            }
        }
        info!(channel = %channel_id, "Subscribed");
        Ok(channel_id)
    }

    /// Remove a subscription and, if a connection is up, send its unsubscribe frame.
    pub async fn unsubscribe(
        &self,
        channel_id: &str,
    ) -> Result<Option<Arc<Subscription>>, ExchangeError> {
        self.ensure_open()?;

        let (removed, ack) = {
            let link = self.link.lock().await;
            let Some(removed) = self.registry.remove(channel_id) else {
                return Ok(None);
            };
            let frame = self
                .codec
                .encode_unsubscription(&removed.channel().unsubscribe_message())?;
            let ack = link.as_ref().and_then(|link| enqueue(link, frame));
            (removed, ack)
        };

        if let Some(ack) = ack {
            if let Err(e) = wait_ack(ack).await {
                debug!(channel = %channel_id, error = %e, "Unsubscribe frame not delivered");
            }
        }
        info!(channel = %channel_id, "Unsubscribed");
        Ok(Some(removed))
    }

    /// Close the session for good.
    ///
    /// With `send_unsubscribe` every registered channel is unsubscribed first.
    /// Any later call fails with [`ExchangeError::SessionClosed`].
    pub async fn close(&self, send_unsubscribe: bool) -> Result<(), ExchangeError> {
        self.ensure_open()?;

        if send_unsubscribe {
            let acks = {
                let link = self.link.lock().await;
                match link.as_ref() {
                    Some(link) => self
                        .registry
                        .unsubscribe_frames(&self.codec)?
                        .into_iter()
                        .filter_map(|frame| enqueue(link, frame))
                        .collect(),
                    None => Vec::new(),
                }
            };

            match timeout(CLOSE_TIMEOUT, try_join_all(acks.into_iter().map(wait_ack))).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Failed to unsubscribe before closing"),
                Err(_) => warn!("Timed out unsubscribing before closing"),
            }
        }

        self.shutdown.cancel();
        self.set_state(ConnectionState::Closed);
        info!("WebSocket session closed");
        Ok(())
    }

    /// Drive the session until it is closed or can no longer reconnect.
    ///
    /// Returns `Ok(())` after [`close`](Self::close), [`ExchangeError::ReconnectExhausted`]
    /// when every reconnect attempt failed and [`ExchangeError::AuthError`] when the
    /// server rejected every private channel.
    #[instrument(skip(self), fields(exchange = "bitstamp"))]
    pub async fn run(&self) -> Result<(), ExchangeError> {
        self.ensure_open()?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ExchangeError::InvalidState(
                "WebSocket session is already running".to_string(),
            ));
        }

        let result = self.run_until_closed().await;

        self.shutdown.cancel();
        self.set_state(ConnectionState::Closed);
        if let Err(e) = &result {
            error!(error = %e, "WebSocket session terminated");
        }
        result
    }

    async fn run_until_closed(&self) -> Result<(), ExchangeError> {
        if self.config.startup_delay_ms > 0 {
            debug!(delay_ms = self.config.startup_delay_ms, "Delaying first connection");
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Ok(()),
                () = sleep(Duration::from_millis(self.config.startup_delay_ms)) => {}
            }
        }

        let heartbeat = self.codec.encode_heartbeat()?;
        let mut backoff = self.config.reconnect_backoff();
        let mut failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Ok(()),
                connected = self.transport.connect() => connected,
            };

            match connected {
                Ok((writer, reader)) => {
                    failures = 0;
                    backoff = self.config.reconnect_backoff();
                    match self.serve(writer, reader, heartbeat.clone()).await? {
                        Disconnect::Shutdown => return Ok(()),
                        Disconnect::Reconnect => self.set_state(ConnectionState::Reconnecting),
                    }
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.config.max_reconnect_attempts {
                        return Err(ExchangeError::ReconnectExhausted { attempts: failures });
                    }

                    let delay = backoff
                        .next()
                        .unwrap_or(Duration::from_millis(self.config.max_reconnect_delay_ms));
                    warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "WebSocket connection failed, retrying"
                    );
                    self.set_state(ConnectionState::Reconnecting);

                    tokio::select! {
                        biased;
                        () = self.shutdown.cancelled() => return Ok(()),
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Run one connection from subscription replay to teardown.
    async fn serve(
        &self,
        writer: Box<dyn WsWriter>,
        reader: Box<dyn WsReader>,
        heartbeat: Message,
    ) -> Result<Disconnect, ExchangeError> {
        let connection = self.shutdown.child_token();
        let (outbound, queue) = mpsc::unbounded_channel();
        let mut writer_task = tokio::spawn(write_loop(writer, queue, connection.clone()));

        // Snapshot and link publication happen under one lock, so a concurrent
        // subscribe lands either in the snapshot or on the new link, never both.
        let acks = {
            let mut link = self.link.lock().await;
            let acks: Vec<_> = self
                .registry
                .subscribe_frames(&self.codec)?
                .into_iter()
                .filter_map(|frame| enqueue(&outbound, frame))
                .collect();
            *link = Some(outbound.clone());
            acks
        };

        let replayed = acks.len();
        let heartbeat_task = tokio::spawn(heartbeat_loop(
            outbound,
            heartbeat,
            Duration::from_millis(self.config.heartbeat_interval_ms),
            connection.clone(),
        ));

        let replay = try_join_all(acks.into_iter().map(wait_ack));
        let outcome = self
            .receive_loop(reader, replay, replayed, &mut writer_task, &connection)
            .await;

        self.teardown(connection, heartbeat_task, writer_task).await;
        outcome
    }

    /// Read until the connection ends. The replay acks are awaited alongside the
    /// reader, so a stalled writer never hides a dropped socket.
    async fn receive_loop<F>(
        &self,
        mut reader: Box<dyn WsReader>,
        replay: F,
        replayed: usize,
        writer_task: &mut JoinHandle<Result<(), ExchangeError>>,
        connection: &CancellationToken,
    ) -> Result<Disconnect, ExchangeError>
    where
        F: Future<Output = Result<Vec<()>, ExchangeError>>,
    {
        tokio::pin!(replay);
        let mut replaying = true;
        let mut rejected = HashSet::new();

        loop {
            tokio::select! {
                biased;
                () = connection.cancelled() => return Ok(Disconnect::Shutdown),
                written = &mut *writer_task => {
                    match written {
                        Ok(Err(e)) => warn!(error = %e, "WebSocket write failed, reconnecting"),
                        Ok(Ok(())) => debug!("Writer stopped, reconnecting"),
                        Err(e) => warn!(error = %e, "Writer task aborted, reconnecting"),
                    }
                    return Ok(Disconnect::Reconnect);
                }
                acked = &mut replay, if replaying => {
                    replaying = false;
                    if let Err(e) = acked {
                        warn!(error = %e, "Failed to replay subscriptions");
                        return Ok(Disconnect::Reconnect);
                    }
                    self.set_state(ConnectionState::Connected);
                    info!(subscriptions = replayed, "WebSocket connected");
                }
                next = reader.next_raw() => match next {
                    None => {
                        warn!("WebSocket closed by server, reconnecting");
                        return Ok(Disconnect::Reconnect);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive failed, reconnecting");
                        return Ok(Disconnect::Reconnect);
                    }
                    Some(Ok(frame)) => match self.router.route(frame).await {
                        Ok(RouteOutcome::Handled) => {}
                        Ok(RouteOutcome::Reconnect) => {
                            info!("Server requested reconnect");
                            return Ok(Disconnect::Reconnect);
                        }
                        Err(ExchangeError::Protocol(protocol_error)) => {
                            error!(error = %protocol_error, code = ?protocol_error.code, "Received bts:error");
                            let _ = self.protocol_errors.send(protocol_error.clone());
                            self.check_private_rejections(&mut rejected, &protocol_error)?;
                        }
                        Err(e) => warn!(error = %e, "Dropping malformed frame"),
                    },
                },
            }
        }
    }

    /// Fail once every private channel has been rejected on this connection.
    fn check_private_rejections(
        &self,
        rejected: &mut HashSet<String>,
        protocol_error: &ProtocolError,
    ) -> Result<(), ExchangeError> {
        let Some(channel) = protocol_error.channel.as_ref() else {
            return Ok(());
        };

        let private = self.registry.private_channel_ids();
        if !private.contains(channel) {
            return Ok(());
        }

        rejected.insert(channel.clone());
        if private.iter().all(|id| rejected.contains(id)) {
            return Err(ExchangeError::AuthError(format!(
                "Server rejected every private channel: {}",
                private.join(", ")
            )));
        }
        Ok(())
    }

    /// Stop both background tasks and release the socket before anything reconnects.
    async fn teardown(
        &self,
        connection: CancellationToken,
        heartbeat_task: JoinHandle<()>,
        writer_task: JoinHandle<Result<(), ExchangeError>>,
    ) {
        connection.cancel();
        self.link.lock().await.take();

        if let Err(e) = heartbeat_task.await {
            debug!(error = %e, "Heartbeat task ended abnormally");
        }
        // Already joined when the writer is the reason for the disconnect
        if !writer_task.is_finished() {
            if let Err(e) = writer_task.await {
                debug!(error = %e, "Writer task ended abnormally");
            }
        }
        debug!("Connection torn down");
    }

    fn ensure_open(&self) -> Result<(), ExchangeError> {
        if self.shutdown.is_cancelled() {
            Err(ExchangeError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next || *current == ConnectionState::Closed {
                return false;
            }
            debug!(from = %current, to = %next, "Connection state changed");
            *current = next;
            true
        });
    }
}

impl<T: WsTransport> fmt::Debug for WebSocketSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketSession")
            .field("state", &self.state())
            .field("subscriptions", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Queue a frame with an acknowledgement; `None` if the writer is gone.
fn enqueue(link: &Link, frame: Message) -> Option<oneshot::Receiver<Result<(), ExchangeError>>> {
    let (ack, done) = oneshot::channel();
    link.send(Outbound {
        frame,
        ack: Some(ack),
    })
    .ok()
    .map(|()| done)
}

async fn wait_ack(done: oneshot::Receiver<Result<(), ExchangeError>>) -> Result<(), ExchangeError> {
    done.await.map_err(|_| {
        ExchangeError::NetworkError("Connection closed before the frame was sent".to_string())
    })?
}

/// Sole writer of a connection; closes the socket on the way out.
async fn write_loop(
    mut writer: Box<dyn WsWriter>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    connection: CancellationToken,
) -> Result<(), ExchangeError> {
    let result = loop {
        tokio::select! {
            biased;
            () = connection.cancelled() => break Ok(()),
            next = queue.recv() => {
                let Some(Outbound { frame, ack }) = next else {
                    break Ok(());
                };
                trace!(?frame, "Sending frame");
                let sent = tokio::select! {
                    biased;
                    () = connection.cancelled() => break Ok(()),
                    sent = writer.send_raw(frame) => sent,
                };
                match sent {
                    Ok(()) => {
                        if let Some(ack) = ack {
                            let _ = ack.send(Ok(()));
                        }
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        if let Some(ack) = ack {
                            let _ = ack.send(Err(e));
                        }
                        break Err(ExchangeError::NetworkError(reason));
                    }
                }
            }
        }
    };

    match timeout(CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Failed to close WebSocket cleanly"),
        Err(_) => debug!("Timed out closing WebSocket, dropping it"),
    }
    result
}

async fn heartbeat_loop(
    outbound: Link,
    heartbeat: Message,
    period: Duration,
    connection: CancellationToken,
) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = connection.cancelled() => break,
            _ = ticker.tick() => {
                trace!("Sending heartbeat");
                let frame = Outbound { frame: heartbeat.clone(), ack: None };
                if outbound.send(frame).is_err() {
                    break;
                }
            }
        }
    }
}

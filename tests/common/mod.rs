#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use stampx::core::kernel::{WsReader, WsTransport, WsWriter};
use stampx::ExchangeError;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

pub const WAIT: Duration = Duration::from_secs(2);

/// In-memory transport: every successful `connect` hands the server side of the
/// new connection to the test through a channel.
pub struct MockTransport {
    connections: mpsc::UnboundedSender<MockConnection>,
    failures_left: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
    stall_writes: bool,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockConnection>) {
        let (connections, accepted) = mpsc::unbounded_channel();
        (
            Self {
                connections,
                failures_left: Arc::new(AtomicU32::new(0)),
                attempts: Arc::new(AtomicU32::new(0)),
                stall_writes: false,
            },
            accepted,
        )
    }

    /// Fail the next `count` connection attempts
    pub fn failing(self, count: u32) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Writes on every connection hang forever, like a socket with a full send buffer
    pub fn stalling_writes(mut self) -> Self {
        self.stall_writes = true;
        self
    }

    pub fn attempts(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.attempts)
    }

    /// Handle for failing upcoming attempts after the transport has been moved
    pub fn failures(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.failures_left)
    }
}

#[async_trait]
impl WsTransport for MockTransport {
    async fn connect(&self) -> Result<(Box<dyn WsWriter>, Box<dyn WsReader>), ExchangeError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ExchangeError::NetworkError("connection refused".to_string()));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let fail_writes = Arc::new(AtomicBool::new(false));

        self.connections
            .send(MockConnection {
                sent: sent_rx,
                inbound: inbound_tx,
                closed: Arc::clone(&closed),
                fail_writes: Arc::clone(&fail_writes),
            })
            .map_err(|_| ExchangeError::NetworkError("test harness gone".to_string()))?;

        Ok((
            Box::new(MockWriter {
                sent: sent_tx,
                closed,
                fail_writes,
                stall: self.stall_writes,
            }),
            Box::new(MockReader { inbound: inbound_rx }),
        ))
    }
}

struct MockWriter {
    sent: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    stall: bool,
}

#[async_trait]
impl WsWriter for MockWriter {
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ExchangeError::NetworkError("broken pipe".to_string()));
        }
        self.sent
            .send(msg)
            .map_err(|_| ExchangeError::NetworkError("peer gone".to_string()))
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockReader {
    inbound: mpsc::UnboundedReceiver<Message>,
}

#[async_trait]
impl WsReader for MockReader {
    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
        self.inbound.recv().await.map(Ok)
    }
}

/// Server side of one mock connection. Dropping it closes the connection.
pub struct MockConnection {
    sent: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MockConnection {
    /// Next frame written by the client, as JSON
    pub async fn next_frame(&mut self) -> Value {
        let message = timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client writer dropped");
        match message {
            Message::Text(text) => serde_json::from_str(&text).expect("client sent invalid JSON"),
            other => panic!("unexpected client frame: {:?}", other),
        }
    }

    /// Next `count` frames, skipping heartbeats
    pub async fn next_frames(&mut self, count: usize) -> Vec<Value> {
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            let frame = self.next_frame().await;
            if frame["event"] != "bts:heartbeat" {
                frames.push(frame);
            }
        }
        frames
    }

    pub fn push(&self, frame: Value) {
        self.push_raw(frame.to_string());
    }

    pub fn push_raw(&self, text: impl Into<String>) {
        self.inbound
            .send(Message::Text(text.into()))
            .expect("client reader dropped");
    }

    /// Make every further client write fail
    pub fn break_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close flag that outlives this handle
    pub fn client_closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

pub async fn next_connection(accepted: &mut mpsc::UnboundedReceiver<MockConnection>) -> MockConnection {
    timeout(WAIT, accepted.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("transport dropped")
}

/// Channel names carried by a batch of control frames
pub fn channels(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|frame| frame["data"]["channel"].as_str().unwrap_or_default().to_string())
        .collect()
}

/*
[INPUT]:  Test scenarios that need a socket or a REST snapshot without a network
[OUTPUT]: In-memory connector, scripted sessions, gated fetcher and client fixtures
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for wirebook-adapter tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{sink, stream};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use wiremock::MockServer;
use wirebook_adapter::{
    Connector, Credentials, Frame, Result, SnapshotFetcher, SnapshotRequest, StreamClient,
    StreamConfig, WirebookError,
};
use wirebook_adapter::ws::{FrameSink, FrameStream};

pub const PUBLIC_URL: &str = "wss://stream.test/public";
pub const PRIVATE_URL: &str = "wss://stream.test/private";

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

pub fn test_credentials() -> Credentials {
    Credentials::new("test-key", "test-secret")
}

/// Stream config with the heartbeat off so sessions only carry frames under test
pub fn quiet_config() -> StreamConfig {
    StreamConfig {
        ping_interval_ms: 0,
        ..Default::default()
    }
}

/// Let every spawned task run until it blocks (paused clock only)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Server side of one mocked socket
pub struct MockSession {
    pub url: String,
    outbound: mpsc::UnboundedReceiver<Frame>,
    inbound: mpsc::UnboundedSender<Result<Frame>>,
}

impl MockSession {
    /// Next frame the client sent
    pub async fn next_frame(&mut self) -> Frame {
        self.outbound
            .recv()
            .await
            .expect("client side of the mock socket dropped")
    }

    /// Next text frame the client sent, parsed as JSON
    pub async fn next_json(&mut self) -> Value {
        loop {
            if let Frame::Text(text) = self.next_frame().await {
                return serde_json::from_str(&text).expect("client sent invalid JSON");
            }
        }
    }

    /// Frame already queued by the client, if any
    pub fn try_next_frame(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }

    pub fn push(&self, value: Value) {
        let _ = self.inbound.send(Ok(Frame::Text(value.to_string())));
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.inbound.send(Ok(Frame::Text(text.to_string())));
    }

    pub fn push_frame(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    /// Server-initiated close
    pub fn close(&self) {
        let _ = self.inbound.send(Ok(Frame::Close));
    }

    pub fn ack(&self, id: &Value) {
        self.push(serde_json::json!({"op": "subscribe", "id": id, "success": true}));
    }
}

/// Connector that hands every opened socket to the test as a `MockSession`
pub struct MockConnector {
    connects: AtomicUsize,
    sessions: mpsc::UnboundedSender<MockSession>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockSession>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            connects: AtomicUsize::new(0),
            sessions: tx,
        });
        (connector, rx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Frame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Result<Frame>>();

        let frame_sink = sink::unfold(out_tx, |tx, frame: Frame| async move {
            tx.send(frame)
                .map_err(|_| WirebookError::network("mock peer gone"))?;
            Ok::<_, WirebookError>(tx)
        });
        let frame_stream = stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        self.sessions
            .send(MockSession {
                url: url.to_string(),
                outbound: out_rx,
                inbound: in_tx,
            })
            .map_err(|_| WirebookError::network("test dropped the session receiver"))?;

        Ok((Box::pin(frame_sink), Box::pin(frame_stream)))
    }
}

/// Snapshot fetcher that blocks until the test releases a response
pub struct GatedFetcher {
    requests: std::sync::Mutex<Vec<SnapshotRequest>>,
    responses: Mutex<mpsc::UnboundedReceiver<Result<Value>>>,
}

impl GatedFetcher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedSender<Result<Value>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fetcher = Arc::new(Self {
            requests: std::sync::Mutex::new(Vec::new()),
            responses: Mutex::new(rx),
        });
        (fetcher, tx)
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("fetcher lock poisoned")
            .iter()
            .map(|r| r.endpoint.clone())
            .collect()
    }
}

#[async_trait]
impl SnapshotFetcher for GatedFetcher {
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Value> {
        self.requests
            .lock()
            .expect("fetcher lock poisoned")
            .push(request.clone());
        self.responses
            .lock()
            .await
            .recv()
            .await
            .unwrap_or_else(|| Err(WirebookError::network("fetch gate closed")))
    }
}

/// Client over the mock transport with one pinned market
pub fn client_with(
    connector: Arc<MockConnector>,
    config: StreamConfig,
    credentials: Option<Credentials>,
    fetcher: Option<Arc<GatedFetcher>>,
) -> Arc<StreamClient> {
    let mut builder = StreamClient::builder()
        .public_url(PUBLIC_URL)
        .private_url(PRIVATE_URL)
        .config(config)
        .connector(connector)
        .market("BTC/USDT", "BTC-USDT");
    if let Some(credentials) = credentials {
        builder = builder.credentials(credentials);
    }
    if let Some(fetcher) = fetcher {
        builder = builder.fetcher(fetcher);
    }
    Arc::new(builder.build().expect("test client should build"))
}

/*
[INPUT]:  Commands from callers, frames from the socket, bootstrap results, timers
[OUTPUT]: Subscribe/auth/heartbeat frames and resolved or rejected waiters
[POS]:    WebSocket layer - single-writer event loop owning one connection's state
[UPDATE]: When changing frame handling, heartbeat, timeouts or shutdown
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{ChannelKind, Inbound, Payload, Venue};
use super::registry::{Registration, TopicRegistry};
use super::router::{self, Effect, StreamState};
use super::transport::{Connector, Frame, FrameSink, FrameStream};
use super::update::StreamUpdate;
use super::waiters::{PendingCalls, UpdateReply};
use crate::auth::{AuthHandshake, AuthReply, AuthStep, Credentials};
use crate::config::StreamConfig;
use crate::error::{Result, WirebookError};
use crate::http::SnapshotFetcher;
use crate::types::Balances;

const SWEEP_INTERVAL: Duration = Duration::from_millis(250);
const UNRECOGNIZED_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

static UNRECOGNIZED_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closed,
}

/// Everything a connection needs to subscribe one logical stream
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeRequest {
    pub channel: ChannelKind,
    pub symbol: Option<String>,
    pub market_id: Option<String>,
    pub timeframe: Option<String>,
    pub topic: String,
    pub hash: String,
}

#[derive(Debug)]
pub enum Command {
    Subscribe {
        request: SubscribeRequest,
        reply: UpdateReply,
    },
    Unsubscribe {
        request: SubscribeRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    Authenticate {
        credentials: Credentials,
        reply: AuthReply,
    },
    Balances {
        reply: oneshot::Sender<Balances>,
    },
    Close,
}

enum Internal {
    Bootstrap {
        channel: ChannelKind,
        result: Result<Payload>,
    },
}

/// Cloneable handle to a running connection loop
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    url: String,
    connection_id: Uuid,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl ConnectionHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed() || self.status() == ConnectionStatus::Closed
    }

    /// Resolves once the loop has shut down
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| *s == ConnectionStatus::Closed).await;
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| {
            WirebookError::network(format!("connection to {} is closed", self.url))
        })
    }

    /// Register interest and return the receiver for the next resolution
    pub async fn subscribe(
        &self,
        request: SubscribeRequest,
    ) -> Result<oneshot::Receiver<Result<StreamUpdate>>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { request, reply }).await?;
        Ok(rx)
    }

    pub async fn unsubscribe(&self, request: SubscribeRequest) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Unsubscribe { request, reply }).await?;
        rx.await
            .map_err(|_| WirebookError::network("connection closed during unsubscribe"))?
    }

    pub async fn authenticate(&self, credentials: Credentials) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Authenticate { credentials, reply }).await?;
        rx.await
            .map_err(|_| WirebookError::network("connection closed during login"))?
    }

    /// Read-only copy of the connection's balance view
    pub async fn balances(&self) -> Result<Balances> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Balances { reply }).await?;
        rx.await
            .map_err(|_| WirebookError::network("connection closed during balance read"))
    }

    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close).await;
    }
}

/// Shared collaborators for every connection the pool opens
#[derive(Clone)]
pub struct ConnectionContext {
    pub venue: Arc<dyn Venue>,
    pub config: StreamConfig,
    pub fetcher: Option<Arc<dyn SnapshotFetcher>>,
    /// venue market id -> unified symbol, known up front
    pub markets: HashMap<String, String>,
}

/// Open a socket and spawn its event loop
pub async fn open(
    url: &str,
    connector: &dyn Connector,
    context: &ConnectionContext,
) -> Result<ConnectionHandle> {
    let (sink, stream) = connector.connect(url).await?;
    let connection_id = Uuid::new_v4();
    let (commands_tx, commands_rx) = mpsc::channel(context.config.outbound_buffer);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Open);
    let (internal_tx, internal_rx) = mpsc::channel(8);

    info!(url, %connection_id, venue = context.venue.name(), "ws connection opened");

    let connection = Connection {
        url: url.to_string(),
        connection_id,
        venue: context.venue.clone(),
        config: context.config.clone(),
        fetcher: context.fetcher.clone(),
        sink,
        state: StreamState::new(context.config.clone(), context.markets.clone()),
        registry: TopicRegistry::new(),
        pending: PendingCalls::new(),
        auth: AuthHandshake::new(),
        auth_request_id: None,
        last_pong: Instant::now(),
        status: status_tx,
        internal_tx,
    };
    tokio::spawn(connection.run(commands_rx, stream, internal_rx));

    Ok(ConnectionHandle {
        url: url.to_string(),
        connection_id,
        commands: commands_tx,
        status: status_rx,
    })
}

struct Connection {
    url: String,
    connection_id: Uuid,
    venue: Arc<dyn Venue>,
    config: StreamConfig,
    fetcher: Option<Arc<dyn SnapshotFetcher>>,
    sink: FrameSink,
    state: StreamState,
    registry: TopicRegistry,
    pending: PendingCalls,
    auth: AuthHandshake,
    auth_request_id: Option<u64>,
    last_pong: Instant,
    status: watch::Sender<ConnectionStatus>,
    internal_tx: mpsc::Sender<Internal>,
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl Connection {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut stream: FrameStream,
        mut internal: mpsc::Receiver<Internal>,
    ) {
        let mut heartbeat = self.config.ping_interval().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Close) | None => {
                        break WirebookError::network("connection closed by client");
                    }
                    Some(command) => {
                        if let Err(err) = self.handle_command(command).await {
                            break err;
                        }
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        if let Err(err) = self.handle_text(&text).await {
                            break err;
                        }
                    }
                    Some(Ok(Frame::Ping(payload))) => {
                        if let Err(err) = self.sink.send(Frame::Pong(payload)).await {
                            break err;
                        }
                    }
                    Some(Ok(Frame::Pong(_))) => {
                        self.last_pong = Instant::now();
                    }
                    Some(Ok(Frame::Close)) => {
                        break WirebookError::network("connection closed by server");
                    }
                    Some(Err(err)) => break err,
                    None => break WirebookError::network("connection stream ended"),
                },
                Some(event) = internal.recv() => {
                    if let Err(err) = self.handle_internal(event).await {
                        break err;
                    }
                }
                _ = tick(&mut heartbeat) => {
                    if let Err(err) = self.heartbeat().await {
                        break err;
                    }
                }
                _ = sweep.tick() => self.sweep(Instant::now()),
            }
        };

        self.shutdown(reason).await;
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        debug!(url = %self.url, bytes = text.len(), "ws frame sent");
        self.sink.send(Frame::Text(text)).await
    }

    fn deadline(&self) -> Option<Instant> {
        self.config
            .subscribe_timeout()
            .map(|timeout| Instant::now() + timeout)
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Subscribe { request, reply } => self.subscribe(request, reply).await,
            Command::Unsubscribe { request, reply } => self.unsubscribe(&request, reply).await,
            Command::Authenticate { credentials, reply } => {
                self.authenticate(credentials, reply).await
            }
            Command::Balances { reply } => {
                let _ = reply.send(self.state.balance().clone());
                Ok(())
            }
            Command::Close => Ok(()),
        }
    }

    async fn subscribe(&mut self, request: SubscribeRequest, reply: UpdateReply) -> Result<()> {
        if let (Some(market_id), Some(symbol)) = (&request.market_id, &request.symbol) {
            self.state.register_market(market_id, symbol);
        }

        let waiter = self.pending.register(&request.hash, reply);
        let deadline = self.deadline();
        let registration = self.registry.register(
            std::slice::from_ref(&request.topic),
            &request.hash,
            vec![(request.hash.clone(), waiter)],
            deadline,
        );

        match registration {
            Registration::Send { request_id, topics } => {
                match self.venue.subscribe_frame(request_id, &topics) {
                    Ok(frame) => {
                        self.send_text(frame).await?;
                        info!(
                            url = %self.url,
                            connection_id = %self.connection_id,
                            request_id,
                            topic = %request.topic,
                            hash = %request.hash,
                            "ws subscribe sent"
                        );
                    }
                    Err(err) => {
                        self.registry.reject(request_id);
                        self.pending.reject_waiter(&request.hash, waiter, &err);
                        return Ok(());
                    }
                }
                self.start_bootstrap(request.channel);
            }
            Registration::Joined { request_id } => {
                debug!(request_id, topic = %request.topic, "subscribe joined in-flight request");
            }
            Registration::Active => {
                debug!(topic = %request.topic, hash = %request.hash, "topic already live");
            }
        }
        Ok(())
    }

    async fn unsubscribe(
        &mut self,
        request: &SubscribeRequest,
        reply: oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        let removed = self.registry.release(&request.topic, &request.hash);
        self.pending.reject(
            &request.hash,
            &WirebookError::Unsubscribed(request.hash.clone()),
        );
        if !removed {
            let _ = reply.send(Ok(()));
            return Ok(());
        }

        // private topics are shared by every symbol filter; drop the whole cache
        let symbol = if request.channel.is_private() {
            None
        } else {
            request.symbol.as_deref()
        };
        self.state
            .evict(request.channel, symbol, request.timeframe.as_deref());

        let request_id = self.registry.next_request_id();
        match self
            .venue
            .unsubscribe_frame(request_id, std::slice::from_ref(&request.topic))
        {
            Ok(frame) => {
                self.send_text(frame).await?;
                info!(
                    url = %self.url,
                    connection_id = %self.connection_id,
                    request_id,
                    topic = %request.topic,
                    "ws unsubscribe sent"
                );
                let _ = reply.send(Ok(()));
            }
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        }
        Ok(())
    }

    async fn authenticate(&mut self, credentials: Credentials, reply: AuthReply) -> Result<()> {
        if let Err(err) = credentials.validate() {
            let _ = reply.send(Err(err));
            return Ok(());
        }

        let deadline = self.deadline();
        if self.auth.request(reply, deadline) != AuthStep::SendLogin {
            return Ok(());
        }

        let request_id = self.registry.next_request_id();
        let timestamp = chrono::Utc::now().timestamp_millis();
        match self.venue.auth_frame(request_id, &credentials, timestamp) {
            Ok(frame) => {
                self.auth_request_id = Some(request_id);
                self.send_text(frame).await?;
                info!(url = %self.url, connection_id = %self.connection_id, request_id, "ws login sent");
            }
            Err(err) => {
                self.auth.fail(err);
            }
        }
        Ok(())
    }

    fn start_bootstrap(&mut self, channel: ChannelKind) {
        let Some(fetcher) = self.fetcher.clone() else {
            return;
        };
        let Some(request) = self.venue.bootstrap_request(channel) else {
            return;
        };
        if !self.state.begin_bootstrap(channel) {
            return;
        }

        info!(url = %self.url, %channel, endpoint = %request.endpoint, "bootstrap snapshot requested");
        let venue = self.venue.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = fetcher
                .fetch(&request)
                .await
                .and_then(|value| venue.parse_bootstrap(channel, value));
            let _ = internal.send(Internal::Bootstrap { channel, result }).await;
        });
    }

    async fn handle_internal(&mut self, event: Internal) -> Result<()> {
        match event {
            Internal::Bootstrap { channel, result } => {
                let effects = router::finish_bootstrap(&mut self.state, channel, result);
                self.apply_effects(effects).await
            }
        }
    }

    async fn handle_text(&mut self, text: &str) -> Result<()> {
        debug!(url = %self.url, bytes = text.len(), "ws frame received");
        match self.venue.decode(text) {
            Inbound::Pong => {
                self.last_pong = Instant::now();
            }
            Inbound::Ping => {
                self.last_pong = Instant::now();
                if let Some(pong) = self.venue.pong_frame() {
                    self.send_text(pong).await?;
                }
            }
            Inbound::Ack { id } => {
                if let Some(request) = self.registry.acknowledge(id) {
                    info!(
                        connection_id = %self.connection_id,
                        request_id = id,
                        topics = ?request.topics,
                        "ws subscribe acknowledged"
                    );
                }
            }
            Inbound::Rejected { id, code, message } => {
                let err = self.venue.error_taxonomy().map(&code, &message);
                if self.auth_request_id == Some(id) {
                    self.auth_request_id = None;
                    self.auth.fail(WirebookError::authentication(message));
                } else if let Some(request) = self.registry.reject(id) {
                    warn!(
                        connection_id = %self.connection_id,
                        request_id = id,
                        topics = ?request.topics,
                        error = %err,
                        "ws subscribe rejected"
                    );
                    for (hash, waiter) in &request.waiters {
                        self.pending.reject_waiter(hash, *waiter, &err);
                    }
                    for hash in &request.hashes {
                        self.pending.reject(hash, &err);
                    }
                }
            }
            Inbound::Auth {
                success,
                code,
                message,
            } => {
                self.auth_request_id = None;
                if success {
                    let waiters = self.auth.succeed();
                    info!(connection_id = %self.connection_id, waiters, "ws login accepted");
                } else {
                    let message = message.unwrap_or_else(|| "login rejected".to_string());
                    warn!(
                        connection_id = %self.connection_id,
                        code = code.as_deref().unwrap_or_default(),
                        %message,
                        "ws login rejected"
                    );
                    self.auth.fail(WirebookError::authentication(message));
                }
            }
            Inbound::Data(message) => {
                self.registry.mark_active(&message.topic);
                let effects = router::route(&mut self.state, message);
                self.apply_effects(effects).await?;
            }
            Inbound::Error { code, message } => {
                let err = self.venue.error_taxonomy().map(&code, &message);
                warn!(connection_id = %self.connection_id, error = %err, "ws error frame");
            }
            Inbound::Ignored => {}
            Inbound::Unrecognized(reason) => log_unrecognized_once(&reason, text),
        }
        Ok(())
    }

    async fn apply_effects(&mut self, effects: Vec<Effect>) -> Result<()> {
        for effect in effects {
            match effect {
                Effect::Resolve { hash, view } => {
                    if self.pending.has_waiters(&hash) {
                        let update = self.state.snapshot(&view);
                        let resolved = self.pending.resolve(&hash, &update);
                        debug!(%hash, resolved, "waiters resolved");
                    }
                }
                Effect::Resync {
                    topic,
                    hash,
                    symbol,
                } => {
                    let deadline = self.deadline();
                    let unsubscribe_id = self.registry.next_request_id();
                    let request_id = self.registry.resubscribe(&topic, &hash, deadline);
                    let topics = std::slice::from_ref(&topic);
                    let frames = self
                        .venue
                        .unsubscribe_frame(unsubscribe_id, topics)
                        .and_then(|unsub| {
                            self.venue
                                .subscribe_frame(request_id, topics)
                                .map(|sub| (unsub, sub))
                        });
                    match frames {
                        Ok((unsubscribe, subscribe)) => {
                            self.send_text(unsubscribe).await?;
                            self.send_text(subscribe).await?;
                            info!(
                                connection_id = %self.connection_id,
                                %symbol,
                                %topic,
                                request_id,
                                "order book resync requested"
                            );
                        }
                        Err(err) => {
                            if let Some(request) = self.registry.reject(request_id) {
                                for hash in &request.hashes {
                                    self.pending.reject(hash, &err);
                                }
                            }
                        }
                    }
                }
                Effect::Abandon { topic, hash, error } => {
                    warn!(connection_id = %self.connection_id, %topic, error = %error, "order book abandoned");
                    self.pending.reject(&hash, &error);
                    if self.registry.remove(&topic) {
                        let request_id = self.registry.next_request_id();
                        match self
                            .venue
                            .unsubscribe_frame(request_id, std::slice::from_ref(&topic))
                        {
                            Ok(frame) => self.send_text(frame).await?,
                            Err(err) => debug!(%topic, error = %err, "unsubscribe frame not built"),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn heartbeat(&mut self) -> Result<()> {
        let silent = self.last_pong.elapsed();
        if silent > self.config.pong_timeout() {
            return Err(WirebookError::network(format!(
                "no pong for {}ms",
                silent.as_millis()
            )));
        }
        match self.venue.ping_frame() {
            Some(frame) => self.send_text(frame).await,
            None => self.sink.send(Frame::Ping(Vec::new())).await,
        }
    }

    fn sweep(&mut self, now: Instant) {
        for (request_id, request) in self.registry.expired(now) {
            warn!(
                connection_id = %self.connection_id,
                request_id,
                topics = ?request.topics,
                "ws subscribe timed out"
            );
            let err = WirebookError::Timeout(format!(
                "subscribe request {request_id} was not acknowledged"
            ));
            for (hash, waiter) in &request.waiters {
                self.pending.reject_waiter(hash, *waiter, &err);
            }
            for hash in &request.hashes {
                self.pending.reject(hash, &err);
            }
        }

        if self.auth.is_expired(now) {
            warn!(connection_id = %self.connection_id, "ws login timed out");
            self.auth_request_id = None;
            self.auth
                .fail(WirebookError::Timeout("login was not answered".to_string()));
        }

        self.pending.prune();
    }

    async fn shutdown(mut self, reason: WirebookError) {
        let _ = self.status.send(ConnectionStatus::Closed);
        let rejected = self.pending.reject_all(&reason);
        self.auth.fail(reason.clone());
        self.registry.clear();
        let _ = self.sink.send(Frame::Close).await;
        let _ = self.sink.close().await;
        info!(
            url = %self.url,
            connection_id = %self.connection_id,
            rejected,
            reason = %reason,
            "ws connection closed"
        );
    }
}

fn log_unrecognized_once(reason: &str, raw: &str) {
    let count = UNRECOGNIZED_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    let preview = truncate_for_log(raw, RAW_LOG_MAX_BYTES);
    if count < UNRECOGNIZED_LOG_LIMIT {
        info!(
            sample_index = count + 1,
            sample_limit = UNRECOGNIZED_LOG_LIMIT,
            reason,
            message = %preview,
            "ws message unrecognized"
        );
    } else {
        debug!(reason, message = %preview, "ws message unrecognized");
    }
}

fn truncate_for_log(raw: &str, max_bytes: usize) -> String {
    if raw.len() <= max_bytes {
        return raw.to_string();
    }
    let mut end = max_bytes;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        let raw = "ab€cd";
        assert_eq!(truncate_for_log(raw, 3), "ab...");
        assert_eq!(truncate_for_log(raw, 64), raw);
    }
}

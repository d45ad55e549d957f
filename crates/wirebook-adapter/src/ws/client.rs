/*
[INPUT]:  Unified watch/unwatch calls (channel + symbol + timeframe) and credentials
[OUTPUT]: Typed snapshots of books, trades, candles, tickers, orders, positions, balances
[POS]:    WebSocket layer - public streaming facade over the connection pool
[UPDATE]: When adding watch methods or changing URL/credential routing
*/

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::connection::{ConnectionContext, SubscribeRequest};
use super::generic::GenericVenue;
use super::pool::ConnectionPool;
use super::protocol::{ChannelKind, Venue};
use super::registry::message_hash;
use super::transport::{Connector, TungsteniteConnector};
use super::update::StreamUpdate;
use crate::auth::Credentials;
use crate::config::StreamConfig;
use crate::error::{Result, WirebookError};
use crate::http::SnapshotFetcher;
use crate::orderbook::OrderBook;
use crate::types::{Balances, Ohlcv, Order, Position, Ticker, Trade};

/// Streaming client: one connection per URL, shared by every watch call
pub struct StreamClient {
    venue: Arc<dyn Venue>,
    public_url: String,
    private_url: String,
    credentials: Option<Credentials>,
    /// unified symbol -> venue market id
    market_ids: HashMap<String, String>,
    pool: ConnectionPool,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("venue", &self.venue.name())
            .field("public_url", &self.public_url)
            .field("private_url", &self.private_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl StreamClient {
    pub fn builder() -> StreamClientBuilder {
        StreamClientBuilder::default()
    }

    pub fn venue(&self) -> &dyn Venue {
        self.venue.as_ref()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.pool.context().config
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    fn market_id(&self, symbol: &str) -> String {
        self.market_ids
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| self.venue.market_id(symbol))
    }

    fn url_for(&self, channel: ChannelKind) -> &str {
        if channel.is_private() {
            &self.private_url
        } else {
            &self.public_url
        }
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials
            .as_ref()
            .ok_or_else(|| WirebookError::authentication("credentials required for private channels"))
    }

    /// Resolve everything a subscribe needs; fails before any socket is touched
    fn resolve(
        &self,
        channel: ChannelKind,
        symbol: Option<&str>,
        timeframe: Option<&str>,
    ) -> Result<SubscribeRequest> {
        if channel.requires_symbol() && symbol.is_none() {
            return Err(WirebookError::InvalidRequest(format!(
                "{channel} requires a symbol"
            )));
        }

        let market_id = symbol.map(|s| self.market_id(s));
        let topic = self
            .venue
            .topic(channel, market_id.as_deref(), timeframe)?;
        Ok(SubscribeRequest {
            channel,
            symbol: symbol.map(str::to_string),
            market_id,
            timeframe: timeframe.map(str::to_string),
            hash: message_hash(channel, symbol, timeframe),
            topic,
        })
    }

    /// Log in on the private connection; concurrent callers share one login
    pub async fn authenticate(&self) -> Result<()> {
        let credentials = self.credentials()?.clone();
        let handle = self.pool.ensure_connection(&self.private_url).await?;
        handle.authenticate(credentials).await
    }

    /// Wait for the next update of a logical stream
    pub async fn watch(
        &self,
        channel: ChannelKind,
        symbol: Option<&str>,
        timeframe: Option<&str>,
    ) -> Result<StreamUpdate> {
        let credentials = if channel.is_private() {
            Some(self.credentials()?.clone())
        } else {
            None
        };
        let request = self.resolve(channel, symbol, timeframe)?;

        let handle = self.pool.ensure_connection(self.url_for(channel)).await?;
        if let Some(credentials) = credentials {
            handle.authenticate(credentials).await?;
        }

        debug!(hash = %request.hash, topic = %request.topic, "watch");
        let reply = handle.subscribe(request).await?;
        reply
            .await
            .map_err(|_| WirebookError::network("connection dropped while waiting for update"))?
    }

    /// Stop a logical stream; waiters on it fail with `Unsubscribed`
    pub async fn unwatch(
        &self,
        channel: ChannelKind,
        symbol: Option<&str>,
        timeframe: Option<&str>,
    ) -> Result<()> {
        let request = self.resolve(channel, symbol, timeframe)?;
        match self.pool.get(self.url_for(channel)).await {
            Some(handle) => handle.unsubscribe(request).await,
            None => Ok(()),
        }
    }

    pub async fn watch_order_book(&self, symbol: &str, limit: Option<usize>) -> Result<OrderBook> {
        match self.watch(ChannelKind::OrderBook, Some(symbol), None).await? {
            StreamUpdate::OrderBook(book) => Ok(book.limited(limit)),
            other => Err(unexpected(ChannelKind::OrderBook, &other)),
        }
    }

    pub async fn watch_trades(&self, symbol: &str, limit: Option<usize>) -> Result<Vec<Trade>> {
        match self.watch(ChannelKind::Trades, Some(symbol), None).await? {
            StreamUpdate::Trades(trades) => Ok(tail(&trades, limit)),
            other => Err(unexpected(ChannelKind::Trades, &other)),
        }
    }

    pub async fn watch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Ohlcv>> {
        match self
            .watch(ChannelKind::Ohlcv, Some(symbol), Some(timeframe))
            .await?
        {
            StreamUpdate::Ohlcv(candles) => Ok(tail(&candles, limit)),
            other => Err(unexpected(ChannelKind::Ohlcv, &other)),
        }
    }

    pub async fn watch_ticker(&self, symbol: &str) -> Result<Ticker> {
        match self.watch(ChannelKind::Ticker, Some(symbol), None).await? {
            StreamUpdate::Ticker(ticker) => Ok(ticker.as_ref().clone()),
            other => Err(unexpected(ChannelKind::Ticker, &other)),
        }
    }

    pub async fn watch_orders(
        &self,
        symbol: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Order>> {
        match self.watch(ChannelKind::Orders, symbol, None).await? {
            StreamUpdate::Orders(orders) => Ok(tail(&orders, limit)),
            other => Err(unexpected(ChannelKind::Orders, &other)),
        }
    }

    pub async fn watch_positions(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        match self.watch(ChannelKind::Positions, symbol, None).await? {
            StreamUpdate::Positions(positions) => Ok(positions.as_ref().clone()),
            other => Err(unexpected(ChannelKind::Positions, &other)),
        }
    }

    pub async fn watch_balance(&self) -> Result<Balances> {
        match self.watch(ChannelKind::Balance, None, None).await? {
            StreamUpdate::Balance(balance) => Ok(balance.as_ref().clone()),
            other => Err(unexpected(ChannelKind::Balance, &other)),
        }
    }

    pub async fn unwatch_order_book(&self, symbol: &str) -> Result<()> {
        self.unwatch(ChannelKind::OrderBook, Some(symbol), None).await
    }

    pub async fn unwatch_trades(&self, symbol: &str) -> Result<()> {
        self.unwatch(ChannelKind::Trades, Some(symbol), None).await
    }

    pub async fn unwatch_ohlcv(&self, symbol: &str, timeframe: &str) -> Result<()> {
        self.unwatch(ChannelKind::Ohlcv, Some(symbol), Some(timeframe))
            .await
    }

    pub async fn unwatch_ticker(&self, symbol: &str) -> Result<()> {
        self.unwatch(ChannelKind::Ticker, Some(symbol), None).await
    }

    pub async fn unwatch_orders(&self, symbol: Option<&str>) -> Result<()> {
        self.unwatch(ChannelKind::Orders, symbol, None).await
    }

    pub async fn unwatch_positions(&self, symbol: Option<&str>) -> Result<()> {
        self.unwatch(ChannelKind::Positions, symbol, None).await
    }

    pub async fn unwatch_balance(&self) -> Result<()> {
        self.unwatch(ChannelKind::Balance, None, None).await
    }

    /// Combined balance across every open connection; the newest snapshot wins per field
    pub async fn balances(&self) -> Result<Balances> {
        let mut views = Vec::new();
        for handle in self.pool.handles().await {
            match handle.balances().await {
                Ok(balances) => views.push(balances),
                // a connection that closed meanwhile has nothing to contribute
                Err(err) => debug!(url = handle.url(), error = %err, "balance read skipped"),
            }
        }
        Ok(merge_oldest_first(views))
    }

    pub async fn close(&self) {
        self.pool.close_all().await;
    }
}

/// Unstamped views merge first, then ascending timestamp
fn merge_oldest_first(mut views: Vec<Balances>) -> Balances {
    views.sort_by_key(|view| view.timestamp);
    views.iter().fold(Balances::default(), |mut combined, view| {
        combined.merge(view);
        combined
    })
}

fn tail<T: Clone>(items: &[T], limit: Option<usize>) -> Vec<T> {
    let start = limit.map_or(0, |n| items.len().saturating_sub(n));
    items[start..].to_vec()
}

fn unexpected(channel: ChannelKind, update: &StreamUpdate) -> WirebookError {
    WirebookError::InvalidResponse(format!(
        "{channel} watch resolved with a {} update",
        update.kind()
    ))
}

/// Builder for [`StreamClient`]
#[derive(Default)]
pub struct StreamClientBuilder {
    venue: Option<Arc<dyn Venue>>,
    public_url: Option<String>,
    private_url: Option<String>,
    config: StreamConfig,
    credentials: Option<Credentials>,
    connector: Option<Arc<dyn Connector>>,
    fetcher: Option<Arc<dyn SnapshotFetcher>>,
    markets: Vec<(String, String)>,
}

impl StreamClientBuilder {
    pub fn venue(mut self, venue: Arc<dyn Venue>) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    /// Defaults to the public URL
    pub fn private_url(mut self, url: impl Into<String>) -> Self {
        self.private_url = Some(url.into());
        self
    }

    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// REST collaborator used for the balance/positions bootstrap
    pub fn fetcher(mut self, fetcher: Arc<dyn SnapshotFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Pin a unified symbol to a venue market id
    pub fn market(mut self, symbol: impl Into<String>, market_id: impl Into<String>) -> Self {
        self.markets.push((symbol.into(), market_id.into()));
        self
    }

    pub fn build(self) -> Result<StreamClient> {
        self.config.validate()?;

        let public_url = self
            .public_url
            .ok_or_else(|| WirebookError::Config("public_url is required".to_string()))?;
        let private_url = self.private_url.unwrap_or_else(|| public_url.clone());
        validate_ws_url(&public_url)?;
        validate_ws_url(&private_url)?;

        let venue = self
            .venue
            .unwrap_or_else(|| Arc::new(GenericVenue::default()));
        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(TungsteniteConnector::new(self.config.connect_timeout()))
        });

        let market_ids: HashMap<String, String> = self.markets.iter().cloned().collect();
        let markets = self
            .markets
            .into_iter()
            .map(|(symbol, market_id)| (market_id, symbol))
            .collect();

        let context = ConnectionContext {
            venue: venue.clone(),
            config: self.config,
            fetcher: self.fetcher,
            markets,
        };

        Ok(StreamClient {
            venue,
            public_url,
            private_url,
            credentials: self.credentials,
            market_ids,
            pool: ConnectionPool::new(connector, context),
        })
    }
}

fn validate_ws_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(WirebookError::Config(format!(
            "unsupported websocket scheme {other} in {raw}"
        ))),
    }
}

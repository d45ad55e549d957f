/*
[INPUT]:  Venue wire dialect (topic names, frame shapes, payload fields)
[OUTPUT]: Venue trait plus decoded inbound message types
[POS]:    WebSocket layer - seam between the engine and exchange-specific literals
[UPDATE]: When adding channel kinds or inbound message categories
*/

use std::fmt;

use serde_json::Value;

use crate::auth::Credentials;
use crate::error::{ErrorTaxonomy, Result};
use crate::http::SnapshotRequest;
use crate::orderbook::BookUpdate;
use crate::types::{Balances, Ohlcv, Order, Position, Ticker, Trade};

/// Logical stream kinds the engine knows how to merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    OrderBook,
    Trades,
    Ohlcv,
    Ticker,
    Orders,
    Positions,
    Balance,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::OrderBook => "orderbook",
            ChannelKind::Trades => "trades",
            ChannelKind::Ohlcv => "ohlcv",
            ChannelKind::Ticker => "ticker",
            ChannelKind::Orders => "orders",
            ChannelKind::Positions => "positions",
            ChannelKind::Balance => "balance",
        }
    }

    /// Requires an authenticated connection
    pub fn is_private(self) -> bool {
        matches!(
            self,
            ChannelKind::Orders | ChannelKind::Positions | ChannelKind::Balance
        )
    }

    /// Public channels are always scoped to one symbol
    pub fn requires_symbol(self) -> bool {
        !self.is_private()
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed content of a channel data message; record symbols are still venue market ids
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Book(BookUpdate),
    Trades(Vec<Trade>),
    Candles(Vec<Ohlcv>),
    Ticker(Ticker),
    Orders(Vec<Order>),
    Positions(Vec<Position>),
    Balance(Balances),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    pub channel: ChannelKind,
    pub topic: String,
    pub market_id: Option<String>,
    pub timeframe: Option<String>,
    pub payload: Payload,
}

/// Result of decoding one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Pong,
    /// Application-level ping from the server
    Ping,
    Ack {
        id: u64,
    },
    Rejected {
        id: u64,
        code: String,
        message: String,
    },
    Auth {
        success: bool,
        code: Option<String>,
        message: Option<String>,
    },
    Data(DataMessage),
    /// Error frame with no request id to correlate
    Error {
        code: String,
        message: String,
    },
    /// Control frame with nothing to do
    Ignored,
    /// Frame that could not be decoded
    Unrecognized(String),
}

/// Exchange wire dialect used by the streaming engine
pub trait Venue: Send + Sync {
    fn name(&self) -> &str;

    /// Venue market id for a unified symbol
    fn market_id(&self, symbol: &str) -> String;

    /// Wire topic; fails with `NotSupported` before any frame is sent
    fn topic(
        &self,
        channel: ChannelKind,
        market_id: Option<&str>,
        timeframe: Option<&str>,
    ) -> Result<String>;

    fn subscribe_frame(&self, request_id: u64, topics: &[String]) -> Result<String>;

    fn unsubscribe_frame(&self, request_id: u64, topics: &[String]) -> Result<String>;

    /// Application-level ping; `None` uses protocol ping frames
    fn ping_frame(&self) -> Option<String>;

    /// Reply to an application-level server ping
    fn pong_frame(&self) -> Option<String>;

    fn auth_frame(
        &self,
        request_id: u64,
        credentials: &Credentials,
        timestamp_ms: i64,
    ) -> Result<String>;

    fn decode(&self, text: &str) -> Inbound;

    /// One-time REST snapshot taken before trusting push updates
    fn bootstrap_request(&self, channel: ChannelKind) -> Option<SnapshotRequest>;

    fn parse_bootstrap(&self, channel: ChannelKind, value: Value) -> Result<Payload>;

    fn error_taxonomy(&self) -> &ErrorTaxonomy;
}

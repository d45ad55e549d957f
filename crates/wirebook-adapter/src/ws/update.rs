/*
[INPUT]:  Cache and book state after a merge
[OUTPUT]: Shared immutable snapshot delivered to waiting callers
[POS]:    WebSocket layer - value type resolved through the pending-call table
[UPDATE]: When adding channel kinds
*/

use std::sync::Arc;

use crate::orderbook::OrderBook;
use crate::types::{Balances, Ohlcv, Order, Position, Ticker, Trade};

/// State snapshot for one message hash; cheap to clone across waiters
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    OrderBook(Arc<OrderBook>),
    Trades(Arc<Vec<Trade>>),
    Ohlcv(Arc<Vec<Ohlcv>>),
    Ticker(Arc<Ticker>),
    Orders(Arc<Vec<Order>>),
    Positions(Arc<Vec<Position>>),
    Balance(Arc<Balances>),
}

impl StreamUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamUpdate::OrderBook(_) => "orderbook",
            StreamUpdate::Trades(_) => "trades",
            StreamUpdate::Ohlcv(_) => "ohlcv",
            StreamUpdate::Ticker(_) => "ticker",
            StreamUpdate::Orders(_) => "orders",
            StreamUpdate::Positions(_) => "positions",
            StreamUpdate::Balance(_) => "balance",
        }
    }
}

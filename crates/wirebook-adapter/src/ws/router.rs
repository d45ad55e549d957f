/*
[INPUT]:  Decoded channel data messages and bootstrap snapshots
[OUTPUT]: Merged per-symbol state plus effects (resolve / resync / abandon)
[POS]:    WebSocket layer - dispatch router and the state it alone mutates
[UPDATE]: When adding channel handlers or changing merge policy
*/

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use super::protocol::{ChannelKind, DataMessage, Payload};
use super::registry::message_hash;
use super::update::StreamUpdate;
use crate::cache::{BootstrapGate, CandleOutcome, OhlcvCache, OrderCache, PositionCache, TradeCache};
use crate::config::StreamConfig;
use crate::error::{ExchangeErrorKind, Result, WirebookError};
use crate::orderbook::{ApplyOutcome, BookReconstructor};
use crate::types::{Balances, Position, Ticker};

/// Which piece of state a resolution should snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Book(String),
    Trades(String),
    Candles(String, String),
    Ticker(String),
    Orders(Option<String>),
    Positions(Option<String>),
    Balance,
}

/// Side effect requested by a handler; executed by the connection loop
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Resolve { hash: String, view: View },
    Resync { topic: String, hash: String, symbol: String },
    Abandon { topic: String, hash: String, error: WirebookError },
}

/// Per-connection caches; only the connection loop touches this
#[derive(Debug)]
pub struct StreamState {
    config: StreamConfig,
    /// venue market id -> unified symbol
    symbols: HashMap<String, String>,
    books: HashMap<String, BookReconstructor>,
    trades: HashMap<String, TradeCache>,
    candles: HashMap<(String, String), OhlcvCache>,
    tickers: HashMap<String, Ticker>,
    orders: OrderCache,
    positions: PositionCache,
    balance: Balances,
    balance_gate: BootstrapGate<Balances>,
    positions_gate: BootstrapGate<Vec<Position>>,
}

impl StreamState {
    pub fn new(config: StreamConfig, symbols: HashMap<String, String>) -> Self {
        Self {
            orders: OrderCache::new(config.orders_limit),
            positions: PositionCache::new(config.positions_limit),
            config,
            symbols,
            books: HashMap::new(),
            trades: HashMap::new(),
            candles: HashMap::new(),
            tickers: HashMap::new(),
            balance: Balances::default(),
            balance_gate: BootstrapGate::new(),
            positions_gate: BootstrapGate::new(),
        }
    }

    pub fn register_market(&mut self, market_id: &str, symbol: &str) {
        self.symbols
            .insert(market_id.to_string(), symbol.to_string());
    }

    /// Unified symbol for a venue market id; unknown ids pass through
    pub fn symbol_for(&self, market_id: &str) -> String {
        self.symbols
            .get(market_id)
            .cloned()
            .unwrap_or_else(|| market_id.to_string())
    }

    pub fn balance(&self) -> &Balances {
        &self.balance
    }

    pub fn book(&self, symbol: &str) -> Option<&BookReconstructor> {
        self.books.get(symbol)
    }

    /// Start a bootstrap fetch for a private channel; false if not applicable
    pub fn begin_bootstrap(&mut self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Balance => self.balance_gate.start(),
            ChannelKind::Positions => self.positions_gate.start(),
            _ => false,
        }
    }

    /// Build the value delivered for a view
    pub fn snapshot(&self, view: &View) -> StreamUpdate {
        match view {
            View::Book(symbol) => {
                let book = self
                    .books
                    .get(symbol)
                    .map(|rec| rec.book().clone())
                    .unwrap_or_else(|| crate::orderbook::OrderBook::new(symbol.clone()));
                StreamUpdate::OrderBook(Arc::new(book))
            }
            View::Trades(symbol) => StreamUpdate::Trades(Arc::new(
                self.trades
                    .get(symbol)
                    .map(|cache| cache.latest(None))
                    .unwrap_or_default(),
            )),
            View::Candles(symbol, timeframe) => StreamUpdate::Ohlcv(Arc::new(
                self.candles
                    .get(&(symbol.clone(), timeframe.clone()))
                    .map(|cache| cache.latest(None))
                    .unwrap_or_default(),
            )),
            View::Ticker(symbol) => {
                let ticker = self.tickers.get(symbol).cloned().unwrap_or(Ticker {
                    symbol: symbol.clone(),
                    timestamp: None,
                    bid: None,
                    ask: None,
                    last: None,
                    high: None,
                    low: None,
                    base_volume: None,
                });
                StreamUpdate::Ticker(Arc::new(ticker))
            }
            View::Orders(symbol) => StreamUpdate::Orders(Arc::new(
                self.orders.latest(symbol.as_deref(), None),
            )),
            View::Positions(symbol) => StreamUpdate::Positions(Arc::new(
                self.positions.latest(symbol.as_deref(), None),
            )),
            View::Balance => StreamUpdate::Balance(Arc::new(self.balance.clone())),
        }
    }

    /// Drop cached state after an unsubscribe
    pub fn evict(&mut self, channel: ChannelKind, symbol: Option<&str>, timeframe: Option<&str>) {
        match (channel, symbol) {
            (ChannelKind::OrderBook, Some(symbol)) => {
                self.books.remove(symbol);
            }
            (ChannelKind::Trades, Some(symbol)) => {
                self.trades.remove(symbol);
            }
            (ChannelKind::Ohlcv, Some(symbol)) => {
                let timeframe = timeframe.unwrap_or_default().to_string();
                self.candles.remove(&(symbol.to_string(), timeframe));
            }
            (ChannelKind::Ticker, Some(symbol)) => {
                self.tickers.remove(symbol);
            }
            (ChannelKind::Orders, Some(symbol)) => self.orders.remove_symbol(symbol),
            (ChannelKind::Orders, None) => self.orders.clear(),
            (ChannelKind::Positions, Some(symbol)) => self.positions.remove_symbol(symbol),
            (ChannelKind::Positions, None) => {
                self.positions.clear();
                self.positions_gate.reset();
            }
            (ChannelKind::Balance, _) => {
                self.balance = Balances::default();
                self.balance_gate.reset();
            }
            _ => {}
        }
    }
}

type Handler = fn(&mut StreamState, DataMessage) -> Vec<Effect>;

static ROUTES: &[(ChannelKind, Handler)] = &[
    (ChannelKind::OrderBook, handle_order_book as Handler),
    (ChannelKind::Trades, handle_trades as Handler),
    (ChannelKind::Ohlcv, handle_ohlcv as Handler),
    (ChannelKind::Ticker, handle_ticker as Handler),
    (ChannelKind::Orders, handle_orders as Handler),
    (ChannelKind::Positions, handle_positions as Handler),
    (ChannelKind::Balance, handle_balance as Handler),
];

/// Dispatch one data message to its channel handler
pub fn route(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    match ROUTES.iter().find(|(kind, _)| *kind == message.channel) {
        Some((_, handler)) => handler(state, message),
        None => {
            debug!(channel = %message.channel, topic = %message.topic, "no route for channel");
            Vec::new()
        }
    }
}

fn message_symbol(state: &StreamState, message: &DataMessage) -> String {
    state.symbol_for(message.market_id.as_deref().unwrap_or_default())
}

fn mismatch(message: &DataMessage) -> Vec<Effect> {
    warn!(channel = %message.channel, topic = %message.topic, "payload does not match channel");
    Vec::new()
}

fn handle_order_book(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    let symbol = message_symbol(state, &message);
    let Payload::Book(mut update) = message.payload else {
        return mismatch(&message);
    };
    update.symbol = symbol.clone();
    let hash = message_hash(ChannelKind::OrderBook, Some(&symbol), None);
    let max_buffered = state.config.max_buffered_deltas;
    let max_attempts = state.config.max_resync_attempts;

    let book = state
        .books
        .entry(symbol.clone())
        .or_insert_with(|| BookReconstructor::new(symbol.clone(), max_buffered));

    match book.apply(update) {
        ApplyOutcome::Applied => vec![Effect::Resolve {
            hash,
            view: View::Book(symbol),
        }],
        ApplyOutcome::Buffered | ApplyOutcome::Ignored => Vec::new(),
        ApplyOutcome::ResyncRequired(reason) => {
            let attempt = book.begin_resync();
            if attempt > max_attempts {
                warn!(%symbol, ?reason, attempt, "order book resync limit reached");
                state.books.remove(&symbol);
                return vec![Effect::Abandon {
                    topic: message.topic,
                    hash,
                    error: WirebookError::exchange(
                        ExchangeErrorKind::Generic,
                        "resync",
                        format!("order book for {symbol} failed to resynchronize after {max_attempts} attempts"),
                    ),
                }];
            }
            warn!(%symbol, ?reason, attempt, "order book invalidated, resyncing");
            vec![Effect::Resync {
                topic: message.topic,
                hash,
                symbol,
            }]
        }
    }
}

fn handle_trades(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    let symbol = message_symbol(state, &message);
    let Payload::Trades(trades) = message.payload else {
        return mismatch(&message);
    };
    let limit = state.config.trades_limit;
    let cache = state
        .trades
        .entry(symbol.clone())
        .or_insert_with(|| TradeCache::new(limit));
    cache.extend(trades.into_iter().map(|mut trade| {
        trade.symbol = symbol.clone();
        trade
    }));
    vec![Effect::Resolve {
        hash: message_hash(ChannelKind::Trades, Some(&symbol), None),
        view: View::Trades(symbol),
    }]
}

fn handle_ohlcv(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    let symbol = message_symbol(state, &message);
    let timeframe = message.timeframe.clone().unwrap_or_default();
    let Payload::Candles(candles) = message.payload else {
        return mismatch(&message);
    };
    let limit = state.config.ohlcv_limit;
    let cache = state
        .candles
        .entry((symbol.clone(), timeframe.clone()))
        .or_insert_with(|| OhlcvCache::new(limit));

    let changed = candles
        .into_iter()
        .map(|candle| cache.append_or_replace_last(candle))
        .filter(|outcome| *outcome != CandleOutcome::Rejected)
        .count();
    if changed == 0 {
        return Vec::new();
    }
    vec![Effect::Resolve {
        hash: message_hash(ChannelKind::Ohlcv, Some(&symbol), Some(&timeframe)),
        view: View::Candles(symbol, timeframe),
    }]
}

fn handle_ticker(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    let symbol = message_symbol(state, &message);
    let Payload::Ticker(mut ticker) = message.payload else {
        return mismatch(&message);
    };
    ticker.symbol = symbol.clone();
    state.tickers.insert(symbol.clone(), ticker);
    vec![Effect::Resolve {
        hash: message_hash(ChannelKind::Ticker, Some(&symbol), None),
        view: View::Ticker(symbol),
    }]
}

/// Resolve the unfiltered hash plus one per touched symbol
fn private_effects(channel: ChannelKind, symbols: BTreeSet<String>) -> Vec<Effect> {
    let view = |symbol: Option<String>| match channel {
        ChannelKind::Orders => View::Orders(symbol),
        _ => View::Positions(symbol),
    };
    let mut effects = vec![Effect::Resolve {
        hash: message_hash(channel, None, None),
        view: view(None),
    }];
    effects.extend(symbols.into_iter().map(|symbol| Effect::Resolve {
        hash: message_hash(channel, Some(&symbol), None),
        view: view(Some(symbol)),
    }));
    effects
}

fn handle_orders(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    let Payload::Orders(orders) = message.payload else {
        return mismatch(&message);
    };
    let mut touched = BTreeSet::new();
    for mut order in orders {
        order.symbol = state.symbol_for(&order.symbol);
        touched.insert(order.symbol.clone());
        state.orders.upsert(order);
    }
    private_effects(ChannelKind::Orders, touched)
}

fn apply_positions(state: &mut StreamState, positions: Vec<Position>) -> BTreeSet<String> {
    let mut touched = BTreeSet::new();
    for mut position in positions {
        position.symbol = state.symbol_for(&position.symbol);
        touched.insert(position.symbol.clone());
        state.positions.upsert(position);
    }
    touched
}

/// An update stamped earlier than the snapshot it would be folded into
fn predates(update: Option<i64>, snapshot: Option<i64>) -> bool {
    matches!((update, snapshot), (Some(update), Some(snapshot)) if update < snapshot)
}

/// Drop queued positions older than the entry the snapshot installed
fn newer_positions(state: &StreamState, positions: Vec<Position>) -> Vec<Position> {
    positions
        .into_iter()
        .filter(|position| {
            let symbol = state.symbol_for(&position.symbol);
            let current = state
                .positions
                .get(&symbol, &position.id)
                .and_then(|p| p.timestamp);
            let keep = !predates(position.timestamp, current);
            if !keep {
                debug!(%symbol, id = %position.id, "queued position older than snapshot dropped");
            }
            keep
        })
        .collect()
}

fn handle_positions(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    let Payload::Positions(positions) = message.payload else {
        return mismatch(&message);
    };
    match state.positions_gate.admit(positions) {
        Some(positions) => {
            let touched = apply_positions(state, positions);
            private_effects(ChannelKind::Positions, touched)
        }
        None => {
            debug!("positions update queued behind bootstrap");
            Vec::new()
        }
    }
}

fn handle_balance(state: &mut StreamState, message: DataMessage) -> Vec<Effect> {
    let Payload::Balance(update) = message.payload else {
        return mismatch(&message);
    };
    match state.balance_gate.admit(update) {
        Some(update) => {
            state.balance.merge(&update);
            vec![Effect::Resolve {
                hash: message_hash(ChannelKind::Balance, None, None),
                view: View::Balance,
            }]
        }
        None => {
            debug!("balance update queued behind bootstrap");
            Vec::new()
        }
    }
}

/// Install a fetched snapshot and fold the updates queued while it was in flight
pub fn finish_bootstrap(
    state: &mut StreamState,
    channel: ChannelKind,
    result: Result<Payload>,
) -> Vec<Effect> {
    match (channel, result) {
        (ChannelKind::Balance, Ok(Payload::Balance(snapshot))) => {
            let snapshot_ts = snapshot.timestamp;
            let mut merged = snapshot;
            if !predates(state.balance.timestamp, snapshot_ts) {
                merged.merge(&state.balance);
            }
            for update in state.balance_gate.finish() {
                if predates(update.timestamp, snapshot_ts) {
                    debug!(ts = ?update.timestamp, ?snapshot_ts, "queued balance older than snapshot dropped");
                    continue;
                }
                merged.merge(&update);
            }
            state.balance = merged;
            vec![Effect::Resolve {
                hash: message_hash(ChannelKind::Balance, None, None),
                view: View::Balance,
            }]
        }
        (ChannelKind::Positions, Ok(Payload::Positions(snapshot))) => {
            let mut touched = apply_positions(state, snapshot);
            for update in state.positions_gate.finish() {
                let update = newer_positions(state, update);
                touched.extend(apply_positions(state, update));
            }
            private_effects(ChannelKind::Positions, touched)
        }
        (ChannelKind::Balance, Err(err)) => {
            warn!(error = %err, "balance bootstrap failed");
            for update in state.balance_gate.abort() {
                state.balance.merge(&update);
            }
            Vec::new()
        }
        (ChannelKind::Positions, Err(err)) => {
            warn!(error = %err, "positions bootstrap failed");
            for update in state.positions_gate.abort() {
                apply_positions(state, update);
            }
            Vec::new()
        }
        (channel, Ok(_)) => {
            warn!(%channel, "bootstrap payload does not match channel");
            match channel {
                ChannelKind::Balance => {
                    state.balance_gate.abort();
                }
                ChannelKind::Positions => {
                    state.positions_gate.abort();
                }
                _ => {}
            }
            Vec::new()
        }
        (channel, Err(err)) => {
            debug!(%channel, error = %err, "bootstrap result ignored");
            Vec::new()
        }
    }
}

/*
[INPUT]:  Price levels from snapshot and delta messages
[OUTPUT]: Depth-ordered bid/ask sides with top-of-book views
[POS]:    Order book layer - storage for one symbol's book
[UPDATE]: When changing level storage or adding book analytics
*/

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, amount: Decimal) -> Self {
        Self { price, amount }
    }
}

/// One side of the book, keyed by price
#[derive(Debug, Clone, PartialEq)]
pub struct BookSide {
    levels: BTreeMap<Decimal, Decimal>,
    descending: bool,
}

impl BookSide {
    pub fn bids() -> Self {
        Self {
            levels: BTreeMap::new(),
            descending: true,
        }
    }

    pub fn asks() -> Self {
        Self {
            levels: BTreeMap::new(),
            descending: false,
        }
    }

    /// Insert or replace a level; a zero amount removes it
    pub fn store(&mut self, price: Decimal, amount: Decimal) {
        if amount.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, amount);
        }
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn amount_at(&self, price: Decimal) -> Option<Decimal> {
        self.levels.get(&price).copied()
    }

    pub fn best(&self) -> Option<PriceLevel> {
        let entry = if self.descending {
            self.levels.iter().next_back()
        } else {
            self.levels.iter().next()
        };
        entry.map(|(price, amount)| PriceLevel::new(*price, *amount))
    }

    /// Levels best-first, optionally truncated
    pub fn levels(&self, limit: Option<usize>) -> Vec<PriceLevel> {
        let take = limit.unwrap_or(usize::MAX);
        let to_level = |(price, amount): (&Decimal, &Decimal)| PriceLevel::new(*price, *amount);
        if self.descending {
            self.levels.iter().rev().take(take).map(to_level).collect()
        } else {
            self.levels.iter().take(take).map(to_level).collect()
        }
    }

    fn truncated(&self, limit: usize) -> Self {
        let mut side = Self {
            levels: BTreeMap::new(),
            descending: self.descending,
        };
        for level in self.levels(Some(limit)) {
            side.levels.insert(level.price, level.amount);
        }
        side
    }
}

/// Reconstructed order book for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: BookSide,
    pub asks: BookSide,
    pub nonce: Option<u64>,
    pub timestamp: Option<i64>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BookSide::bids(),
            asks: BookSide::asks(),
            nonce: None,
            timestamp: None,
        }
    }

    /// Replace both sides from a snapshot
    pub fn reset(
        &mut self,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
        nonce: Option<u64>,
        timestamp: Option<i64>,
    ) {
        self.clear();
        self.apply(bids, asks);
        self.nonce = nonce;
        self.timestamp = timestamp;
    }

    /// Merge (price, amount) pairs into both sides
    pub fn apply(&mut self, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) {
        for (price, amount) in bids {
            self.bids.store(*price, *amount);
        }
        for (price, amount) in asks {
            self.asks.store(*price, *amount);
        }
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.nonce = None;
        self.timestamp = None;
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.best()
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Best bid above best ask; a locked book (equal prices) is not crossed
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price > ask.price,
            _ => false,
        }
    }

    /// Copy of the book holding at most `limit` levels per side
    pub fn limited(&self, limit: Option<usize>) -> OrderBook {
        match limit {
            None => self.clone(),
            Some(limit) => OrderBook {
                symbol: self.symbol.clone(),
                bids: self.bids.truncated(limit),
                asks: self.asks.truncated(limit),
                nonce: self.nonce,
                timestamp: self.timestamp,
            },
        }
    }
}

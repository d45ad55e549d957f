/*
[INPUT]:  Unified schema definitions and serde requirements
[OUTPUT]: Typed Rust structs for tickers, trades, candles, orders, positions, balances
[POS]:    Data layer - records held by the streaming caches
[UPDATE]: When the unified schema changes or new record types are added
*/

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OrderStatus, OrderType, PositionSide, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub timestamp: Option<i64>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub base_volume: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Option<String>,
    pub symbol: String,
    pub timestamp: Option<i64>,
    pub side: Option<Side>,
    pub price: Decimal,
    pub amount: Decimal,
    pub order_id: Option<String>,
}

/// One candle; `timestamp` is the open time in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled: Decimal,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub contracts: Decimal,
    pub entry_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub timestamp: Option<i64>,
}

/// Per-currency balance; absent fields are unknown, not zero
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub free: Option<Decimal>,
    pub used: Option<Decimal>,
    pub total: Option<Decimal>,
}

impl Balance {
    /// Newest-wins merge: every field present in `newer` overrides
    pub fn merge(&mut self, newer: &Balance) {
        if newer.free.is_some() {
            self.free = newer.free;
        }
        if newer.used.is_some() {
            self.used = newer.used;
        }
        if newer.total.is_some() {
            self.total = newer.total;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balances {
    pub timestamp: Option<i64>,
    pub currencies: BTreeMap<String, Balance>,
}

impl Balances {
    pub fn get(&self, currency: &str) -> Option<&Balance> {
        self.currencies.get(currency)
    }

    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    /// Fold a newer partial update into this view field by field
    pub fn merge(&mut self, newer: &Balances) {
        for (currency, balance) in &newer.currencies {
            self.currencies
                .entry(currency.clone())
                .or_default()
                .merge(balance);
        }
        if let Some(ts) = newer.timestamp {
            self.timestamp = Some(self.timestamp.map_or(ts, |current| current.max(ts)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn balance(free: Option<i64>, used: Option<i64>, total: Option<i64>) -> Balance {
        Balance {
            free: free.map(Decimal::from),
            used: used.map(Decimal::from),
            total: total.map(Decimal::from),
        }
    }

    #[test]
    fn balances_merge_newest_wins_by_field() {
        let mut current = Balances {
            timestamp: Some(10),
            currencies: BTreeMap::from([
                ("USDT".to_string(), balance(Some(100), Some(0), Some(100))),
                ("BTC".to_string(), balance(Some(1), Some(0), Some(1))),
            ]),
        };
        let update = Balances {
            timestamp: Some(20),
            currencies: BTreeMap::from([
                ("USDT".to_string(), balance(Some(60), None, None)),
                ("ETH".to_string(), balance(Some(5), None, Some(5))),
            ]),
        };

        current.merge(&update);

        assert_eq!(current.timestamp, Some(20));
        assert_eq!(
            current.get("USDT"),
            Some(&balance(Some(60), Some(0), Some(100)))
        );
        assert_eq!(current.get("BTC"), Some(&balance(Some(1), Some(0), Some(1))));
        assert_eq!(current.get("ETH"), Some(&balance(Some(5), None, Some(5))));
    }

    #[test]
    fn order_status_accepts_venue_aliases() {
        let status: OrderStatus = serde_json::from_str("\"filled\"").unwrap();
        assert_eq!(status, OrderStatus::Closed);
        let status: OrderStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status, OrderStatus::Canceled);
    }
}

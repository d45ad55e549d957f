/*
[INPUT]:  Raw JSON text frames in the generic venue dialect
[OUTPUT]: Parsed wire structs converted into unified records
[POS]:    WebSocket layer - message parsing for GenericVenue
[UPDATE]: When adding new message types or changing field names
*/

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::types::{
    Balance, Balances, Ohlcv, Order, OrderStatus, OrderType, Position, PositionSide, Side, Ticker,
    Trade, UpdateKind,
};

/// Envelope shared by every inbound frame
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<UpdateKind>,
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(default, rename = "prevSeq")]
    pub prev_seq: Option<u64>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RawFrame {
    /// Codes arrive as numbers or strings
    pub fn code_string(&self) -> Option<String> {
        self.code.as_ref().map(|code| match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Accept either a single object or a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookData {
    #[serde(default)]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    pub asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeData {
    #[serde(default)]
    pub id: Option<String>,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default, rename = "orderId")]
    pub order_id: Option<String>,
}

impl TradeData {
    pub fn into_trade(self, market_id: &str) -> Trade {
        Trade {
            id: self.id,
            symbol: market_id.to_string(),
            timestamp: self.ts,
            side: self.side,
            price: self.price,
            amount: self.amount,
            order_id: self.order_id,
        }
    }
}

/// `[open_time, open, high, low, close, volume]`
#[derive(Debug, Clone, Deserialize)]
pub struct CandleData(
    pub i64,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
    pub Decimal,
);

impl From<CandleData> for Ohlcv {
    fn from(c: CandleData) -> Self {
        Ohlcv {
            timestamp: c.0,
            open: c.1,
            high: c.2,
            low: c.3,
            close: c.4,
            volume: c.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TickerData {
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
}

impl TickerData {
    pub fn into_ticker(self, market_id: &str, timestamp: Option<i64>) -> Ticker {
        Ticker {
            symbol: market_id.to_string(),
            timestamp,
            bid: self.bid,
            ask: self.ask,
            last: self.last,
            high: self.high,
            low: self.low,
            base_volume: self.volume,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderData {
    pub id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: OrderStatus,
    #[serde(default)]
    pub price: Option<Decimal>,
    pub amount: Decimal,
    #[serde(default)]
    pub filled: Decimal,
    #[serde(default)]
    pub ts: Option<i64>,
}

impl From<OrderData> for Order {
    fn from(o: OrderData) -> Self {
        Order {
            id: o.id,
            client_order_id: o.client_order_id,
            symbol: o.symbol,
            side: o.side,
            order_type: o.order_type,
            status: o.status,
            price: o.price,
            amount: o.amount,
            filled: o.filled,
            timestamp: o.ts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    #[serde(default)]
    pub id: Option<String>,
    pub symbol: String,
    pub side: PositionSide,
    pub contracts: Decimal,
    #[serde(default)]
    pub entry_price: Option<Decimal>,
    #[serde(default)]
    pub unrealized_pnl: Option<Decimal>,
    #[serde(default)]
    pub ts: Option<i64>,
}

impl From<PositionData> for Position {
    fn from(p: PositionData) -> Self {
        // one-way accounts omit the id; symbol and side identify the position
        let id = p.id.unwrap_or_else(|| {
            let side = match p.side {
                PositionSide::Long => "long",
                PositionSide::Short => "short",
                PositionSide::Both => "both",
            };
            format!("{}:{side}", p.symbol)
        });
        Position {
            id,
            symbol: p.symbol,
            side: p.side,
            contracts: p.contracts,
            entry_price: p.entry_price,
            unrealized_pnl: p.unrealized_pnl,
            timestamp: p.ts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceData {
    pub currency: String,
    #[serde(default)]
    pub free: Option<Decimal>,
    #[serde(default)]
    pub used: Option<Decimal>,
    #[serde(default)]
    pub total: Option<Decimal>,
}

pub fn into_balances(entries: Vec<BalanceData>, timestamp: Option<i64>) -> Balances {
    let currencies: BTreeMap<String, Balance> = entries
        .into_iter()
        .map(|entry| {
            (
                entry.currency,
                Balance {
                    free: entry.free,
                    used: entry.used,
                    total: entry.total,
                },
            )
        })
        .collect();
    Balances {
        timestamp,
        currencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame_numeric_code() {
        let frame: RawFrame =
            serde_json::from_str(r#"{"op":"subscribe","id":4,"success":false,"code":10002,"msg":"x"}"#)
                .unwrap();
        assert_eq!(frame.code_string().as_deref(), Some("10002"));
        assert_eq!(frame.success, Some(false));
    }

    #[test]
    fn test_book_levels_accept_strings_and_numbers() {
        let data: BookData =
            serde_json::from_str(r#"{"bids":[["100.5","1"]],"asks":[[101,2.25]]}"#).unwrap();
        assert_eq!(data.bids[0].0, Decimal::new(1005, 1));
        assert_eq!(data.asks[0].1, Decimal::new(225, 2));
    }

    #[test]
    fn test_position_without_id_is_keyed_by_side() {
        let data: PositionData = serde_json::from_str(
            r#"{"symbol":"BTC-USDT","side":"long","contracts":"2","entryPrice":"100"}"#,
        )
        .unwrap();
        let position = Position::from(data);
        assert_eq!(position.id, "BTC-USDT:long");
        assert_eq!(position.entry_price, Some(Decimal::from(100)));
    }

    #[test]
    fn test_one_or_many() {
        let one: OneOrMany<u32> = serde_json::from_str("7").unwrap();
        let many: OneOrMany<u32> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(one.into_vec(), vec![7]);
        assert_eq!(many.into_vec(), vec![1, 2]);
    }
}

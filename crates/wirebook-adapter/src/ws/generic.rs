/*
[INPUT]:  Unified subscribe requests and generic-dialect JSON frames
[OUTPUT]: Outbound op frames and decoded Inbound messages
[POS]:    WebSocket layer - reference Venue for the {"op","id","args"} dialect
[UPDATE]: When the generic dialect gains channels, timeframes or error codes
*/

use serde_json::{Value, json};

use super::message::{
    BalanceData, BookData, CandleData, OneOrMany, OrderData, PositionData, RawFrame, TickerData,
    TradeData, into_balances,
};
use super::protocol::{ChannelKind, DataMessage, Inbound, Payload, Venue};
use crate::auth::{Credentials, HmacSigner};
use crate::error::{ErrorTaxonomy, ExchangeErrorKind, Result, WirebookError};
use crate::http::SnapshotRequest;
use crate::orderbook::BookUpdate;
use crate::types::UpdateKind;

pub const SUPPORTED_TIMEFRAMES: &[&str] = &["1m", "5m", "15m", "1h", "4h", "1d"];

const BALANCE_ENDPOINT: &str = "/v1/account/balance";
const POSITIONS_ENDPOINT: &str = "/v1/account/positions";

/// Venue speaking the generic op/id/args dialect
#[derive(Debug, Clone)]
pub struct GenericVenue {
    name: String,
    taxonomy: ErrorTaxonomy,
}

impl Default for GenericVenue {
    fn default() -> Self {
        Self::new("generic")
    }
}

impl GenericVenue {
    pub fn new(name: impl Into<String>) -> Self {
        let taxonomy = ErrorTaxonomy::new()
            .exact("10001", ExchangeErrorKind::BadRequest)
            .exact("10002", ExchangeErrorKind::BadSymbol)
            .exact("20001", ExchangeErrorKind::PermissionDenied)
            .exact("30001", ExchangeErrorKind::InsufficientFunds)
            .exact("30002", ExchangeErrorKind::InvalidOrder)
            .exact("30003", ExchangeErrorKind::OrderNotFound)
            .exact("42900", ExchangeErrorKind::RateLimitExceeded)
            .exact("50001", ExchangeErrorKind::ExchangeNotAvailable)
            .broad("insufficient", ExchangeErrorKind::InsufficientFunds)
            .broad("unknown symbol", ExchangeErrorKind::BadSymbol)
            .broad("invalid topic", ExchangeErrorKind::BadRequest)
            .broad("too many", ExchangeErrorKind::RateLimitExceeded)
            .broad("permission", ExchangeErrorKind::PermissionDenied)
            .broad("maintenance", ExchangeErrorKind::ExchangeNotAvailable);
        Self {
            name: name.into(),
            taxonomy,
        }
    }

    /// Replace the venue error table
    pub fn with_taxonomy(mut self, taxonomy: ErrorTaxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    fn op_frame(op: &str, request_id: u64, args: Vec<Value>) -> Result<String> {
        Ok(serde_json::to_string(&json!({
            "op": op,
            "id": request_id,
            "args": args,
        }))?)
    }

    fn decode_data(&self, topic: &str, frame: RawFrame) -> Result<DataMessage> {
        let (channel, market_id, timeframe) = parse_topic(topic)
            .ok_or_else(|| WirebookError::InvalidResponse(format!("unknown topic {topic}")))?;
        let data = frame
            .data
            .ok_or_else(|| WirebookError::InvalidResponse(format!("{topic} carries no data")))?;
        let id = market_id.as_deref().unwrap_or_default();

        let payload = match channel {
            ChannelKind::OrderBook => {
                let book: BookData = serde_json::from_value(data)?;
                let kind = frame.kind.unwrap_or(if frame.prev_seq.is_some() {
                    UpdateKind::Delta
                } else {
                    UpdateKind::Snapshot
                });
                Payload::Book(BookUpdate {
                    kind,
                    symbol: id.to_string(),
                    bids: book.bids,
                    asks: book.asks,
                    sequence: frame.seq,
                    prev_sequence: frame.prev_seq,
                    timestamp: frame.ts,
                })
            }
            ChannelKind::Trades => {
                let trades: OneOrMany<TradeData> = serde_json::from_value(data)?;
                Payload::Trades(
                    trades
                        .into_vec()
                        .into_iter()
                        .map(|trade| trade.into_trade(id))
                        .collect(),
                )
            }
            ChannelKind::Ohlcv => {
                let candles: Vec<CandleData> = serde_json::from_value(data)?;
                Payload::Candles(candles.into_iter().map(Into::into).collect())
            }
            ChannelKind::Ticker => {
                let ticker: TickerData = serde_json::from_value(data)?;
                Payload::Ticker(ticker.into_ticker(id, frame.ts))
            }
            other => parse_private(other, data, frame.ts)?,
        };

        Ok(DataMessage {
            channel,
            topic: topic.to_string(),
            market_id,
            timeframe,
            payload,
        })
    }
}

fn parse_topic(topic: &str) -> Option<(ChannelKind, Option<String>, Option<String>)> {
    let (head, rest) = match topic.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (topic, None),
    };
    match (head, rest) {
        ("book", Some(id)) => Some((ChannelKind::OrderBook, Some(id.to_string()), None)),
        ("trades", Some(id)) => Some((ChannelKind::Trades, Some(id.to_string()), None)),
        ("ticker", Some(id)) => Some((ChannelKind::Ticker, Some(id.to_string()), None)),
        ("candles", Some(rest)) => {
            let (timeframe, id) = rest.split_once('.')?;
            Some((
                ChannelKind::Ohlcv,
                Some(id.to_string()),
                Some(timeframe.to_string()),
            ))
        }
        ("orders", None) => Some((ChannelKind::Orders, None, None)),
        ("positions", None) => Some((ChannelKind::Positions, None, None)),
        ("balance", None) => Some((ChannelKind::Balance, None, None)),
        _ => None,
    }
}

fn parse_private(channel: ChannelKind, data: Value, ts: Option<i64>) -> Result<Payload> {
    match channel {
        ChannelKind::Orders => {
            let orders: OneOrMany<OrderData> = serde_json::from_value(data)?;
            Ok(Payload::Orders(
                orders.into_vec().into_iter().map(Into::into).collect(),
            ))
        }
        ChannelKind::Positions => {
            let positions: OneOrMany<PositionData> = serde_json::from_value(data)?;
            Ok(Payload::Positions(
                positions.into_vec().into_iter().map(Into::into).collect(),
            ))
        }
        ChannelKind::Balance => {
            let balances: OneOrMany<BalanceData> = serde_json::from_value(data)?;
            Ok(Payload::Balance(into_balances(balances.into_vec(), ts)))
        }
        other => Err(WirebookError::NotSupported(format!(
            "{other} is not a private channel"
        ))),
    }
}

impl Venue for GenericVenue {
    fn name(&self) -> &str {
        &self.name
    }

    fn market_id(&self, symbol: &str) -> String {
        symbol.replace(['/', ':'], "-")
    }

    fn topic(
        &self,
        channel: ChannelKind,
        market_id: Option<&str>,
        timeframe: Option<&str>,
    ) -> Result<String> {
        if channel.is_private() {
            return Ok(channel_prefix(channel).to_string());
        }

        let id = market_id.ok_or_else(|| {
            WirebookError::InvalidRequest(format!("{channel} requires a symbol"))
        })?;
        match channel {
            ChannelKind::Ohlcv => {
                let timeframe = timeframe.ok_or_else(|| {
                    WirebookError::InvalidRequest("ohlcv requires a timeframe".to_string())
                })?;
                if !SUPPORTED_TIMEFRAMES.contains(&timeframe) {
                    return Err(WirebookError::NotSupported(format!(
                        "{} does not stream {timeframe} candles",
                        self.name
                    )));
                }
                Ok(format!("candles.{timeframe}.{id}"))
            }
            _ => Ok(format!("{}.{id}", channel_prefix(channel))),
        }
    }

    fn subscribe_frame(&self, request_id: u64, topics: &[String]) -> Result<String> {
        Self::op_frame(
            "subscribe",
            request_id,
            topics.iter().map(|t| Value::from(t.as_str())).collect(),
        )
    }

    fn unsubscribe_frame(&self, request_id: u64, topics: &[String]) -> Result<String> {
        Self::op_frame(
            "unsubscribe",
            request_id,
            topics.iter().map(|t| Value::from(t.as_str())).collect(),
        )
    }

    fn ping_frame(&self) -> Option<String> {
        Some(r#"{"op":"ping"}"#.to_string())
    }

    fn pong_frame(&self) -> Option<String> {
        Some(r#"{"op":"pong"}"#.to_string())
    }

    fn auth_frame(
        &self,
        request_id: u64,
        credentials: &Credentials,
        timestamp_ms: i64,
    ) -> Result<String> {
        let signature =
            HmacSigner::new(&credentials.secret).sign_hex(&format!("auth{timestamp_ms}"))?;
        let mut args = vec![
            Value::from(credentials.api_key.as_str()),
            Value::from(timestamp_ms),
            Value::from(signature),
        ];
        if let Some(passphrase) = &credentials.passphrase {
            args.push(Value::from(passphrase.as_str()));
        }
        Self::op_frame("auth", request_id, args)
    }

    fn decode(&self, text: &str) -> Inbound {
        let frame: RawFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => return Inbound::Unrecognized(err.to_string()),
        };
        let code = frame.code_string();

        match frame.op.as_deref() {
            Some("pong") => return Inbound::Pong,
            Some("ping") => return Inbound::Ping,
            Some("auth") => {
                return Inbound::Auth {
                    success: frame.success.unwrap_or(false),
                    code,
                    message: frame.msg,
                };
            }
            Some("subscribe") | Some("unsubscribe") => {
                return match (frame.id, frame.success) {
                    (Some(id), Some(true)) => Inbound::Ack { id },
                    (Some(id), Some(false)) => Inbound::Rejected {
                        id,
                        code: code.unwrap_or_default(),
                        message: frame.msg.unwrap_or_default(),
                    },
                    _ => Inbound::Ignored,
                };
            }
            _ => {}
        }

        if let Some(topic) = frame.topic.clone() {
            return match self.decode_data(&topic, frame) {
                Ok(message) => Inbound::Data(message),
                Err(err) => Inbound::Unrecognized(err.to_string()),
            };
        }

        if frame.op.as_deref() == Some("error") || frame.success == Some(false) {
            return Inbound::Error {
                code: code.unwrap_or_default(),
                message: frame.msg.unwrap_or_default(),
            };
        }

        Inbound::Ignored
    }

    fn bootstrap_request(&self, channel: ChannelKind) -> Option<SnapshotRequest> {
        match channel {
            ChannelKind::Balance => Some(SnapshotRequest::signed(BALANCE_ENDPOINT)),
            ChannelKind::Positions => Some(SnapshotRequest::signed(POSITIONS_ENDPOINT)),
            _ => None,
        }
    }

    fn parse_bootstrap(&self, channel: ChannelKind, value: Value) -> Result<Payload> {
        let (data, ts) = match value {
            Value::Object(mut map) if map.contains_key("data") => {
                let ts = map.get("ts").and_then(Value::as_i64);
                (map.remove("data").unwrap_or(Value::Null), ts)
            }
            other => (other, None),
        };
        parse_private(channel, data, ts)
    }

    fn error_taxonomy(&self) -> &ErrorTaxonomy {
        &self.taxonomy
    }
}

fn channel_prefix(channel: ChannelKind) -> &'static str {
    match channel {
        ChannelKind::OrderBook => "book",
        ChannelKind::Trades => "trades",
        ChannelKind::Ohlcv => "candles",
        ChannelKind::Ticker => "ticker",
        ChannelKind::Orders => "orders",
        ChannelKind::Positions => "positions",
        ChannelKind::Balance => "balance",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn venue() -> GenericVenue {
        GenericVenue::default()
    }

    #[rstest]
    #[case(ChannelKind::OrderBook, Some("BTC-USDT"), None, "book.BTC-USDT")]
    #[case(ChannelKind::Trades, Some("BTC-USDT"), None, "trades.BTC-USDT")]
    #[case(ChannelKind::Ohlcv, Some("ETH-USDT"), Some("1h"), "candles.1h.ETH-USDT")]
    #[case(ChannelKind::Ticker, Some("ETH-USDT"), None, "ticker.ETH-USDT")]
    #[case(ChannelKind::Orders, Some("ETH-USDT"), None, "orders")]
    #[case(ChannelKind::Balance, None, None, "balance")]
    fn test_topics(
        #[case] channel: ChannelKind,
        #[case] market_id: Option<&str>,
        #[case] timeframe: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(venue().topic(channel, market_id, timeframe).unwrap(), expected);
    }

    #[test]
    fn test_unsupported_timeframe() {
        let err = venue()
            .topic(ChannelKind::Ohlcv, Some("BTC-USDT"), Some("7m"))
            .unwrap_err();
        assert!(matches!(err, WirebookError::NotSupported(_)));
    }

    #[test]
    fn test_market_id() {
        assert_eq!(venue().market_id("BTC/USDT"), "BTC-USDT");
        assert_eq!(venue().market_id("BTC/USDT:USDT"), "BTC-USDT-USDT");
    }

    #[test]
    fn test_subscribe_frame_shape() {
        let frame = venue()
            .subscribe_frame(7, &["ticker.BTC-USDT".to_string()])
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"op": "subscribe", "id": 7, "args": ["ticker.BTC-USDT"]}));
    }

    #[test]
    fn test_auth_frame_signs_timestamp() {
        let creds = Credentials::new("key", "secret");
        let frame = venue().auth_frame(1, &creds, 1_700_000_000_000).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        let expected = HmacSigner::new("secret")
            .sign_hex("auth1700000000000")
            .unwrap();
        assert_eq!(value["op"], "auth");
        assert_eq!(value["args"][0], "key");
        assert_eq!(value["args"][1], 1_700_000_000_000_i64);
        assert_eq!(value["args"][2], expected.as_str());
    }

    #[rstest]
    #[case(r#"{"op":"pong"}"#, Inbound::Pong)]
    #[case(r#"{"op":"ping"}"#, Inbound::Ping)]
    #[case(r#"{"op":"subscribe","id":3,"success":true}"#, Inbound::Ack { id: 3 })]
    #[case(r#"{"op":"welcome"}"#, Inbound::Ignored)]
    fn test_decode_control(#[case] raw: &str, #[case] expected: Inbound) {
        assert_eq!(venue().decode(raw), expected);
    }

    #[test]
    fn test_decode_rejection() {
        let inbound = venue()
            .decode(r#"{"op":"subscribe","id":9,"success":false,"code":"10002","msg":"unknown symbol"}"#);
        assert_eq!(
            inbound,
            Inbound::Rejected {
                id: 9,
                code: "10002".to_string(),
                message: "unknown symbol".to_string()
            }
        );
    }

    #[test]
    fn test_decode_book_delta() {
        let inbound = venue().decode(
            r#"{"topic":"book.BTC-USDT","type":"delta","seq":11,"prevSeq":10,"ts":5,"data":{"bids":[["99","0"]],"asks":[]}}"#,
        );
        let Inbound::Data(message) = inbound else {
            panic!("expected data, got {inbound:?}");
        };
        assert_eq!(message.channel, ChannelKind::OrderBook);
        assert_eq!(message.market_id.as_deref(), Some("BTC-USDT"));
        let Payload::Book(update) = message.payload else {
            panic!("expected book payload");
        };
        assert_eq!(update.kind, UpdateKind::Delta);
        assert_eq!(update.sequence, Some(11));
        assert_eq!(update.prev_sequence, Some(10));
        assert_eq!(update.bids, vec![(Decimal::from(99), Decimal::ZERO)]);
    }

    #[test]
    fn test_decode_candles_topic() {
        let inbound = venue().decode(
            r#"{"topic":"candles.1m.ETH-USDT","data":[[60000,"1","2","0.5","1.5","10"]]}"#,
        );
        let Inbound::Data(message) = inbound else {
            panic!("expected data");
        };
        assert_eq!(message.timeframe.as_deref(), Some("1m"));
        assert!(matches!(message.payload, Payload::Candles(ref c) if c.len() == 1));
    }

    #[test]
    fn test_decode_malformed_is_unrecognized() {
        assert!(matches!(venue().decode("not json"), Inbound::Unrecognized(_)));
        assert!(matches!(
            venue().decode(r#"{"topic":"book.BTC-USDT","data":{"bids":"oops"}}"#),
            Inbound::Unrecognized(_)
        ));
    }

    #[test]
    fn test_parse_bootstrap_balance_envelope() {
        let payload = venue()
            .parse_bootstrap(
                ChannelKind::Balance,
                json!({"ts": 9, "data": [{"currency": "USDT", "free": "100", "used": "0", "total": "100"}]}),
            )
            .unwrap();
        let Payload::Balance(balances) = payload else {
            panic!("expected balance");
        };
        assert_eq!(balances.timestamp, Some(9));
        assert_eq!(
            balances.get("USDT").and_then(|b| b.free),
            Some(Decimal::from(100))
        );
    }
}

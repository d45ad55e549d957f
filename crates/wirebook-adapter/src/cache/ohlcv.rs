/*
[INPUT]:  Candle updates for one (symbol, timeframe) series
[OUTPUT]: Timestamp-ordered candle series capped at a fixed capacity
[POS]:    Cache layer - OHLCV append-or-replace-last series
[UPDATE]: When changing candle merge rules
*/

use tracing::debug;

use super::ring::BoundedBuffer;
use crate::types::Ohlcv;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleOutcome {
    /// Same open time as the last candle; the open candle was updated
    Replaced,
    Appended,
    /// Older than the last candle; dropped
    Rejected,
}

#[derive(Debug, Clone)]
pub struct OhlcvCache {
    candles: BoundedBuffer<Ohlcv>,
}

impl OhlcvCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: BoundedBuffer::new(capacity),
        }
    }

    pub fn append_or_replace_last(&mut self, candle: Ohlcv) -> CandleOutcome {
        let last_ts = self.candles.last().map(|last| last.timestamp);
        match last_ts {
            Some(ts) if candle.timestamp == ts => {
                if let Some(last) = self.candles.last_mut() {
                    *last = candle;
                }
                CandleOutcome::Replaced
            }
            Some(ts) if candle.timestamp < ts => {
                debug!(timestamp = candle.timestamp, last = ts, "out-of-order candle ignored");
                CandleOutcome::Rejected
            }
            _ => {
                self.candles.append(candle);
                CandleOutcome::Appended
            }
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn latest(&self, limit: Option<usize>) -> Vec<Ohlcv> {
        self.candles.latest(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn candle(timestamp: i64, close: i64) -> Ohlcv {
        let close = Decimal::from(close);
        Ohlcv {
            timestamp,
            open: Decimal::from(9),
            high: close.max(Decimal::from(9)),
            low: Decimal::from(9),
            close,
            volume: Decimal::ONE,
        }
    }

    #[test]
    fn same_timestamp_replaces_then_newer_appends() {
        let mut cache = OhlcvCache::new(10);
        let t = 1_700_000_000_000;

        assert_eq!(cache.append_or_replace_last(candle(t, 10)), CandleOutcome::Appended);
        assert_eq!(cache.append_or_replace_last(candle(t, 12)), CandleOutcome::Replaced);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.latest(None)[0].close, Decimal::from(12));

        assert_eq!(
            cache.append_or_replace_last(candle(t + 60_000, 13)),
            CandleOutcome::Appended
        );
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn older_candle_is_rejected() {
        let mut cache = OhlcvCache::new(10);
        cache.append_or_replace_last(candle(120, 1));
        assert_eq!(cache.append_or_replace_last(candle(60, 2)), CandleOutcome::Rejected);
        assert_eq!(cache.latest(None), vec![candle(120, 1)]);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut cache = OhlcvCache::new(2);
        for ts in [60, 120, 180] {
            cache.append_or_replace_last(candle(ts, 1));
        }
        let stamps: Vec<i64> = cache.latest(None).iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![120, 180]);
    }
}

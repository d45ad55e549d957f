/*
[INPUT]:  Snapshot and delta book updates for one symbol, in arrival order
[OUTPUT]: Consistent OrderBook plus apply outcome (applied / buffered / ignored / resync)
[POS]:    Order book layer - per-symbol snapshot+delta state machine
[UPDATE]: When changing sequence validation, buffering or resync policy
*/

use std::collections::VecDeque;

use rust_decimal::Decimal;
use tracing::debug;

use super::book::OrderBook;
use crate::types::UpdateKind;

/// Book message decoded by a venue
#[derive(Debug, Clone, PartialEq)]
pub struct BookUpdate {
    pub kind: UpdateKind,
    pub symbol: String,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
    /// Final sequence number carried by this message
    pub sequence: Option<u64>,
    /// Sequence of the message this one follows, when the venue sends it
    pub prev_sequence: Option<u64>,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookState {
    Uninitialized,
    Streaming,
    /// Invalidated; waiting for a fresh snapshot
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncReason {
    SequenceGap { last_applied: u64, received: u64 },
    Crossed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Buffered,
    Ignored,
    ResyncRequired(ResyncReason),
}

#[derive(Debug)]
pub struct BookReconstructor {
    book: OrderBook,
    state: BookState,
    buffered: VecDeque<BookUpdate>,
    max_buffered: usize,
    resync_attempts: u32,
}

impl BookReconstructor {
    pub fn new(symbol: impl Into<String>, max_buffered: usize) -> Self {
        Self {
            book: OrderBook::new(symbol),
            state: BookState::Uninitialized,
            buffered: VecDeque::new(),
            max_buffered,
            resync_attempts: 0,
        }
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn state(&self) -> BookState {
        self.state
    }

    pub fn is_stale(&self) -> bool {
        self.state == BookState::Stale
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Count a resync request; reset by the next cleanly applied delta
    pub fn begin_resync(&mut self) -> u32 {
        self.resync_attempts += 1;
        self.resync_attempts
    }

    pub fn resync_attempts(&self) -> u32 {
        self.resync_attempts
    }

    pub fn apply(&mut self, update: BookUpdate) -> ApplyOutcome {
        match (update.kind, self.state) {
            (UpdateKind::Snapshot, _) => self.apply_snapshot(update),
            (UpdateKind::Delta, BookState::Streaming) => self.apply_delta(update),
            (UpdateKind::Delta, _) => {
                self.buffer(update);
                ApplyOutcome::Buffered
            }
        }
    }

    fn apply_snapshot(&mut self, update: BookUpdate) -> ApplyOutcome {
        self.book
            .reset(&update.bids, &update.asks, update.sequence, update.timestamp);
        self.state = BookState::Streaming;

        let pending = std::mem::take(&mut self.buffered);
        let replayed = pending.len();
        for delta in pending {
            if let ApplyOutcome::ResyncRequired(reason) = self.apply_delta(delta) {
                return ApplyOutcome::ResyncRequired(reason);
            }
        }
        if replayed > 0 {
            debug!(symbol = %self.book.symbol, replayed, "replayed buffered book deltas");
        }

        if self.book.is_crossed() {
            return self.invalidate(ResyncReason::Crossed);
        }
        ApplyOutcome::Applied
    }

    fn apply_delta(&mut self, update: BookUpdate) -> ApplyOutcome {
        if let (Some(current), Some(sequence)) = (self.book.nonce, update.sequence) {
            if sequence <= current {
                return ApplyOutcome::Ignored;
            }
            let in_order = match update.prev_sequence {
                Some(prev) => prev == current,
                None => sequence == current + 1,
            };
            if !in_order {
                return self.invalidate(ResyncReason::SequenceGap {
                    last_applied: current,
                    received: sequence,
                });
            }
        }

        self.book.apply(&update.bids, &update.asks);
        if update.sequence.is_some() {
            self.book.nonce = update.sequence;
        }
        if update.timestamp.is_some() {
            self.book.timestamp = update.timestamp;
        }

        if self.book.is_crossed() {
            return self.invalidate(ResyncReason::Crossed);
        }
        self.resync_attempts = 0;
        ApplyOutcome::Applied
    }

    fn buffer(&mut self, update: BookUpdate) {
        if self.max_buffered == 0 {
            return;
        }
        if self.buffered.len() >= self.max_buffered {
            self.buffered.pop_front();
        }
        self.buffered.push_back(update);
    }

    fn invalidate(&mut self, reason: ResyncReason) -> ApplyOutcome {
        self.book.clear();
        self.buffered.clear();
        self.state = BookState::Stale;
        ApplyOutcome::ResyncRequired(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn update(
        kind: UpdateKind,
        sequence: u64,
        bids: &[(i64, i64)],
        asks: &[(i64, i64)],
    ) -> BookUpdate {
        BookUpdate {
            kind,
            symbol: "BTC/USDT".to_string(),
            bids: bids.iter().map(|(p, a)| (d(*p), d(*a))).collect(),
            asks: asks.iter().map(|(p, a)| (d(*p), d(*a))).collect(),
            sequence: Some(sequence),
            prev_sequence: None,
            timestamp: Some(sequence as i64 * 100),
        }
    }

    fn snapshot(sequence: u64) -> BookUpdate {
        update(
            UpdateKind::Snapshot,
            sequence,
            &[(100, 1), (99, 2)],
            &[(101, 1), (102, 3)],
        )
    }

    fn delta(sequence: u64, bids: &[(i64, i64)]) -> BookUpdate {
        update(UpdateKind::Delta, sequence, bids, &[])
    }

    #[test]
    fn snapshot_then_delta_applies_in_order() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        assert_eq!(rec.state(), BookState::Uninitialized);

        assert_eq!(rec.apply(snapshot(10)), ApplyOutcome::Applied);
        assert_eq!(rec.state(), BookState::Streaming);
        assert_eq!(
            rec.apply(delta(11, &[(99, 0), (98, 5)])),
            ApplyOutcome::Applied
        );

        let bids: Vec<_> = rec
            .book()
            .bids
            .levels(None)
            .into_iter()
            .map(|l| (l.price, l.amount))
            .collect();
        assert_eq!(bids, vec![(d(100), d(1)), (d(98), d(5))]);
        assert_eq!(rec.book().nonce, Some(11));
        assert_eq!(rec.book().timestamp, Some(1100));
    }

    #[test]
    fn sequence_gap_marks_book_stale() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        rec.apply(snapshot(0));
        for seq in 1..=3 {
            assert_eq!(rec.apply(delta(seq, &[(90 + seq as i64, 1)])), ApplyOutcome::Applied);
        }

        let outcome = rec.apply(delta(5, &[(50, 1)]));
        assert_eq!(
            outcome,
            ApplyOutcome::ResyncRequired(ResyncReason::SequenceGap {
                last_applied: 3,
                received: 5
            })
        );
        assert!(rec.is_stale());
        assert_eq!(rec.book().bids.amount_at(d(50)), None);
        assert!(rec.book().bids.is_empty());
    }

    #[test]
    fn stale_deltas_are_ignored() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        rec.apply(snapshot(7));
        assert_eq!(rec.apply(delta(7, &[(50, 1)])), ApplyOutcome::Ignored);
        assert_eq!(rec.apply(delta(3, &[(50, 1)])), ApplyOutcome::Ignored);
        assert_eq!(rec.book().bids.amount_at(d(50)), None);
    }

    #[test]
    fn prev_sequence_links_range_updates() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        rec.apply(snapshot(100));

        let mut linked = delta(140, &[(97, 1)]);
        linked.prev_sequence = Some(100);
        assert_eq!(rec.apply(linked), ApplyOutcome::Applied);

        let mut broken = delta(180, &[(96, 1)]);
        broken.prev_sequence = Some(150);
        assert!(matches!(
            rec.apply(broken),
            ApplyOutcome::ResyncRequired(ResyncReason::SequenceGap { .. })
        ));
    }

    #[test]
    fn deltas_before_snapshot_are_buffered_and_replayed() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        assert_eq!(rec.apply(delta(4, &[(95, 1)])), ApplyOutcome::Buffered);
        assert_eq!(rec.apply(delta(6, &[(94, 1)])), ApplyOutcome::Buffered);
        assert_eq!(rec.buffered_len(), 2);

        assert_eq!(rec.apply(snapshot(5)), ApplyOutcome::Applied);
        assert_eq!(rec.buffered_len(), 0);
        assert_eq!(rec.book().nonce, Some(6));
        assert_eq!(rec.book().bids.amount_at(d(95)), None);
        assert_eq!(rec.book().bids.amount_at(d(94)), Some(d(1)));
    }

    #[test]
    fn buffer_drops_oldest_when_full() {
        let mut rec = BookReconstructor::new("BTC/USDT", 2);
        rec.apply(delta(1, &[]));
        rec.apply(delta(2, &[]));
        rec.apply(delta(3, &[]));
        assert_eq!(rec.buffered_len(), 2);
    }

    #[test]
    fn crossed_book_requires_resync() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        rec.apply(snapshot(1));
        assert_eq!(
            rec.apply(delta(2, &[(103, 1)])),
            ApplyOutcome::ResyncRequired(ResyncReason::Crossed)
        );
        assert!(rec.is_stale());
    }

    #[test]
    fn locked_book_is_not_crossed() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        rec.apply(snapshot(1));
        assert_eq!(rec.apply(delta(2, &[(101, 1)])), ApplyOutcome::Applied);
        assert!(!rec.is_stale());
        assert_eq!(rec.book().spread(), Some(Decimal::ZERO));
    }

    #[test]
    fn fresh_snapshot_recovers_and_delta_resets_attempts() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        rec.apply(snapshot(1));
        rec.apply(delta(9, &[]));
        assert_eq!(rec.begin_resync(), 1);

        assert_eq!(rec.apply(snapshot(20)), ApplyOutcome::Applied);
        assert_eq!(rec.state(), BookState::Streaming);
        assert_eq!(rec.resync_attempts(), 1);

        assert_eq!(rec.apply(delta(21, &[(91, 1)])), ApplyOutcome::Applied);
        assert_eq!(rec.resync_attempts(), 0);
    }

    #[test]
    fn delta_buffered_while_stale_links_to_next_snapshot() {
        let mut rec = BookReconstructor::new("BTC/USDT", 10);
        rec.apply(snapshot(1));
        rec.apply(delta(9, &[]));
        assert_eq!(rec.begin_resync(), 1);

        assert_eq!(rec.apply(delta(21, &[(90, 1)])), ApplyOutcome::Buffered);
        assert_eq!(rec.apply(snapshot(20)), ApplyOutcome::Applied);
        assert_eq!(rec.book().nonce, Some(21));
        assert_eq!(rec.book().bids.amount_at(d(90)), Some(d(1)));
        assert_eq!(rec.resync_attempts(), 0);

        assert_eq!(rec.apply(delta(22, &[(91, 1)])), ApplyOutcome::Applied);
    }
}

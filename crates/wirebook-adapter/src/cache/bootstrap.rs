/*
[INPUT]:  Push updates arriving while a one-time REST snapshot is in flight
[OUTPUT]: Ordered queue of updates to fold over the fetched snapshot
[POS]:    Cache layer - guards snapshot bootstrap against lost push updates
[UPDATE]: When changing how fetched snapshots merge with live updates
*/

#[derive(Debug, Clone, PartialEq)]
enum Phase<U> {
    Idle,
    Fetching(Vec<U>),
    Ready,
}

/// Bootstrap guard for one private channel.
///
/// While a fetch is in flight, push updates are queued instead of applied.
/// When the fetch completes the caller installs the snapshot and then folds
/// the queued updates over it, so nothing received mid-fetch is lost.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapGate<U> {
    phase: Phase<U>,
}

impl<U> Default for BootstrapGate<U> {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl<U> BootstrapGate<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fetch; false if one is running or the snapshot is already merged
    pub fn start(&mut self) -> bool {
        if matches!(self.phase, Phase::Idle) {
            self.phase = Phase::Fetching(Vec::new());
            true
        } else {
            false
        }
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.phase, Phase::Fetching(_))
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready)
    }

    /// Queue the update during a fetch, otherwise hand it back for immediate use
    pub fn admit(&mut self, update: U) -> Option<U> {
        match &mut self.phase {
            Phase::Fetching(queued) => {
                queued.push(update);
                None
            }
            _ => Some(update),
        }
    }

    /// Fetch succeeded: returns the updates to apply on top of the snapshot
    pub fn finish(&mut self) -> Vec<U> {
        match std::mem::replace(&mut self.phase, Phase::Ready) {
            Phase::Fetching(queued) => queued,
            _ => Vec::new(),
        }
    }

    /// Fetch failed: returns queued updates and allows a later retry
    pub fn abort(&mut self) -> Vec<U> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Fetching(queued) => queued,
            Phase::Ready => {
                self.phase = Phase::Ready;
                Vec::new()
            }
            Phase::Idle => Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Balance, Balances};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn balances(ts: i64, currency: &str, free: Option<i64>, total: Option<i64>) -> Balances {
        Balances {
            timestamp: Some(ts),
            currencies: BTreeMap::from([(
                currency.to_string(),
                Balance {
                    free: free.map(Decimal::from),
                    used: None,
                    total: total.map(Decimal::from),
                },
            )]),
        }
    }

    #[test]
    fn updates_during_fetch_are_not_lost() {
        let mut gate = BootstrapGate::new();
        assert!(gate.start());
        assert!(!gate.start());

        assert!(gate.admit(balances(5, "USDT", Some(40), None)).is_none());

        let mut view = balances(3, "USDT", Some(100), Some(100));
        for update in gate.finish() {
            view.merge(&update);
        }

        let usdt = view.get("USDT").cloned().unwrap_or_default();
        assert_eq!(usdt.free, Some(Decimal::from(40)));
        assert_eq!(usdt.total, Some(Decimal::from(100)));
        assert_eq!(view.timestamp, Some(5));
        assert!(gate.is_ready());

        let passthrough = gate.admit(balances(6, "BTC", Some(1), None));
        assert!(passthrough.is_some());
    }

    #[test]
    fn abort_allows_retry() {
        let mut gate: BootstrapGate<u32> = BootstrapGate::new();
        assert!(gate.start());
        gate.admit(1);
        assert_eq!(gate.abort(), vec![1]);
        assert!(!gate.is_fetching());
        assert!(gate.start());
    }
}

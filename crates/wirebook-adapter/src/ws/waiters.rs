/*
[INPUT]:  Caller reply channels keyed by message hash; updates and errors to deliver
[OUTPUT]: Fan-out of each resolution to every waiter registered at that moment
[POS]:    WebSocket layer - pending-call table owned by one connection loop
[UPDATE]: When changing waiter lifetime or cancellation handling
*/

use std::collections::HashMap;

use tokio::sync::oneshot;

use super::registry::WaiterId;
use super::update::StreamUpdate;
use crate::error::{Result, WirebookError};

pub type UpdateReply = oneshot::Sender<Result<StreamUpdate>>;

/// Multi-waiter table with streaming semantics.
///
/// Resolving a hash drains its current waiters; a caller registering after
/// the drain waits for the next resolution, never the previous one.
#[derive(Debug, Default)]
pub struct PendingCalls {
    waiters: HashMap<String, Vec<(WaiterId, UpdateReply)>>,
    next_id: WaiterId,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hash: &str, reply: UpdateReply) -> WaiterId {
        self.next_id += 1;
        let id = self.next_id;
        let list = self.waiters.entry(hash.to_string()).or_default();
        // callers that gave up stop counting as interest
        list.retain(|(_, tx)| !tx.is_closed());
        list.push((id, reply));
        id
    }

    pub fn has_waiters(&self, hash: &str) -> bool {
        self.waiters
            .get(hash)
            .is_some_and(|list| list.iter().any(|(_, tx)| !tx.is_closed()))
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }

    pub fn resolve(&mut self, hash: &str, update: &StreamUpdate) -> usize {
        let Some(list) = self.waiters.remove(hash) else {
            return 0;
        };
        list.into_iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(_, tx)| tx.send(Ok(update.clone())))
            .filter(|sent| sent.is_ok())
            .count()
    }

    pub fn reject(&mut self, hash: &str, err: &WirebookError) -> usize {
        let Some(list) = self.waiters.remove(hash) else {
            return 0;
        };
        let count = list.len();
        for (_, tx) in list {
            let _ = tx.send(Err(err.clone()));
        }
        count
    }

    /// Reject one caller without touching other waiters on the same hash
    pub fn reject_waiter(&mut self, hash: &str, id: WaiterId, err: &WirebookError) -> bool {
        let Some(list) = self.waiters.get_mut(hash) else {
            return false;
        };
        let Some(pos) = list.iter().position(|(waiter, _)| *waiter == id) else {
            return false;
        };
        let (_, tx) = list.remove(pos);
        if list.is_empty() {
            self.waiters.remove(hash);
        }
        let _ = tx.send(Err(err.clone()));
        true
    }

    pub fn reject_all(&mut self, err: &WirebookError) -> usize {
        let hashes: Vec<String> = self.waiters.keys().cloned().collect();
        hashes.iter().map(|hash| self.reject(hash, err)).sum()
    }

    /// Drop entries whose callers stopped waiting
    pub fn prune(&mut self) {
        self.waiters.retain(|_, list| {
            list.retain(|(_, tx)| !tx.is_closed());
            !list.is_empty()
        });
    }
}

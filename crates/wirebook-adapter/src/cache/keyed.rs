/*
[INPUT]:  Order and position updates keyed by (symbol, id)
[OUTPUT]: Bounded upsert cache with stable slots and oldest-first eviction
[POS]:    Cache layer - keyed series for private channels
[UPDATE]: When changing upsert ordering or key derivation
*/

use std::collections::{BTreeMap, HashMap};

use crate::types::{Order, Position};

/// Identity of a cached record
pub trait CacheKey {
    fn symbol(&self) -> &str;
    fn id(&self) -> &str;

    fn cache_key(&self) -> (String, String) {
        (self.symbol().to_string(), self.id().to_string())
    }
}

impl CacheKey for Order {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn id(&self) -> &str {
        &self.id
    }
}

impl CacheKey for Position {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Upsert cache: an update for a known key replaces the value in its
/// original slot; new keys append; overflow evicts the oldest slot.
#[derive(Debug, Clone)]
pub struct KeyedCache<V> {
    slots: BTreeMap<u64, V>,
    index: HashMap<(String, String), u64>,
    next_slot: u64,
    capacity: usize,
}

pub type OrderCache = KeyedCache<Order>;
pub type PositionCache = KeyedCache<Position>;

impl<V: CacheKey + Clone> KeyedCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            index: HashMap::new(),
            next_slot: 0,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn upsert(&mut self, value: V) {
        let key = value.cache_key();
        if let Some(slot) = self.index.get(&key) {
            self.slots.insert(*slot, value);
            return;
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(slot, value);
        self.index.insert(key, slot);

        while self.slots.len() > self.capacity {
            if let Some((_, evicted)) = self.slots.pop_first() {
                self.index.remove(&evicted.cache_key());
            }
        }
    }

    pub fn get(&self, symbol: &str, id: &str) -> Option<&V> {
        self.index
            .get(&(symbol.to_string(), id.to_string()))
            .and_then(|slot| self.slots.get(slot))
    }

    /// Newest `limit` records (optionally for one symbol), oldest first
    pub fn latest(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<V> {
        let matching: Vec<&V> = self
            .slots
            .values()
            .filter(|value| symbol.is_none_or(|symbol| value.symbol() == symbol))
            .collect();
        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn remove_symbol(&mut self, symbol: &str) {
        self.slots.retain(|_, value| value.symbol() != symbol);
        self.index.retain(|(key_symbol, _), _| key_symbol != symbol);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }
}

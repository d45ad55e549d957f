/*
[INPUT]:  Items appended in arrival order (trades, raw records)
[OUTPUT]: Insertion-ordered buffer capped at a fixed capacity
[POS]:    Cache layer - append-only bounded buffer
[UPDATE]: When changing eviction or read-time slicing
*/

use std::collections::VecDeque;

use crate::types::Trade;

/// Insertion-ordered buffer that evicts the oldest item on overflow
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// Trades are appended without dedup by id
pub type TradeCache = BoundedBuffer<Trade>;

impl<T: Clone> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn append(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) {
        for item in items {
            self.append(item);
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.items.back_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Copy of the newest `limit` items, oldest first; never mutates the buffer
    pub fn latest(&self, limit: Option<usize>) -> Vec<T> {
        let skip = limit.map_or(0, |limit| self.items.len().saturating_sub(limit));
        self.items.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = BoundedBuffer::new(3);
        for item in ["A", "B", "C", "D"] {
            buffer.append(item);
        }
        assert_eq!(buffer.latest(None), vec!["B", "C", "D"]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn latest_is_a_read_time_slice() {
        let mut buffer = BoundedBuffer::new(10);
        buffer.extend(1..=5);
        assert_eq!(buffer.latest(Some(2)), vec![4, 5]);
        assert_eq!(buffer.latest(Some(50)), vec![1, 2, 3, 4, 5]);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn keeps_duplicates() {
        let mut buffer = BoundedBuffer::new(4);
        buffer.append("t1");
        buffer.append("t1");
        assert_eq!(buffer.len(), 2);
    }
}

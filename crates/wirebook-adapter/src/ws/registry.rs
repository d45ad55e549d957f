/*
[INPUT]:  Subscribe/unsubscribe requests, acks, rejections and data arrivals per topic
[OUTPUT]: Deduplicated subscribe requests with correlation ids and message hashes
[POS]:    WebSocket layer - topic registry owned by one connection loop
[UPDATE]: When changing subscribe idempotence, timeouts or hash construction
*/

use std::collections::{BTreeSet, HashMap};

use tokio::time::Instant;

use super::protocol::ChannelKind;

pub type WaiterId = u64;

/// Key shared by the producer (router) and the consumer (waiting caller)
pub fn message_hash(channel: ChannelKind, symbol: Option<&str>, timeframe: Option<&str>) -> String {
    match (channel, symbol) {
        (ChannelKind::OrderBook, Some(symbol)) => format!("orderbook:{symbol}"),
        (ChannelKind::Trades, Some(symbol)) => format!("trade:{symbol}"),
        (ChannelKind::Ohlcv, Some(symbol)) => {
            format!("ohlcv:{symbol}:{}", timeframe.unwrap_or_default())
        }
        (ChannelKind::Ticker, Some(symbol)) => format!("ticker:{symbol}"),
        (ChannelKind::Orders, Some(symbol)) => format!("orders:{symbol}"),
        (ChannelKind::Positions, Some(symbol)) => format!("positions:{symbol}"),
        (ChannelKind::Balance, _) => "balance".to_string(),
        (channel, None) => channel.as_str().to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopicStatus {
    Pending(u64),
    Active,
}

#[derive(Debug, Clone)]
struct TopicEntry {
    status: TopicStatus,
    /// Message hashes fed by this topic
    hashes: BTreeSet<String>,
}

/// Outstanding subscribe request awaiting ack
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub topics: Vec<String>,
    /// Waiters registered by the calls that produced this request
    pub waiters: Vec<(String, WaiterId)>,
    /// Hashes whose every waiter fails with this request (resubscribe after resync)
    pub hashes: Vec<String>,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// New topics: send a subscribe frame carrying this id
    Send {
        request_id: u64,
        topics: Vec<String>,
    },
    /// Topics already in flight; waiters attached to that request
    Joined { request_id: u64 },
    /// Topics already live; waiters just wait for the next update
    Active,
}

#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: HashMap<String, TopicEntry>,
    requests: HashMap<u64, PendingRequest>,
    next_request_id: u64,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locally unique correlation id
    pub fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    pub fn is_active(&self, topic: &str) -> bool {
        matches!(
            self.topics.get(topic).map(|entry| entry.status),
            Some(TopicStatus::Active)
        )
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn register(
        &mut self,
        topics: &[String],
        hash: &str,
        waiters: Vec<(String, WaiterId)>,
        deadline: Option<Instant>,
    ) -> Registration {
        let mut fresh = Vec::new();
        let mut joined = None;
        for topic in topics {
            match self.topics.get_mut(topic) {
                Some(entry) => {
                    entry.hashes.insert(hash.to_string());
                    if let TopicStatus::Pending(request_id) = entry.status {
                        joined.get_or_insert(request_id);
                    }
                }
                None => fresh.push(topic.clone()),
            }
        }

        if !fresh.is_empty() {
            let request_id = self.next_request_id();
            for topic in &fresh {
                self.topics.insert(
                    topic.clone(),
                    TopicEntry {
                        status: TopicStatus::Pending(request_id),
                        hashes: BTreeSet::from([hash.to_string()]),
                    },
                );
            }
            self.requests.insert(
                request_id,
                PendingRequest {
                    topics: fresh.clone(),
                    waiters,
                    hashes: Vec::new(),
                    deadline,
                },
            );
            return Registration::Send {
                request_id,
                topics: fresh,
            };
        }

        match joined.and_then(|id| self.requests.get_mut(&id).map(|request| (id, request))) {
            Some((request_id, request)) => {
                request.waiters.extend(waiters);
                Registration::Joined { request_id }
            }
            None => Registration::Active,
        }
    }

    /// Ack received: topics become live
    pub fn acknowledge(&mut self, request_id: u64) -> Option<PendingRequest> {
        let request = self.requests.remove(&request_id)?;
        for topic in &request.topics {
            if let Some(entry) = self.topics.get_mut(topic)
                && entry.status == TopicStatus::Pending(request_id)
            {
                entry.status = TopicStatus::Active;
            }
        }
        Some(request)
    }

    /// Rejection received: forget the request's topics so a retry re-sends them
    pub fn reject(&mut self, request_id: u64) -> Option<PendingRequest> {
        let request = self.requests.remove(&request_id)?;
        self.forget_pending(&request, request_id);
        Some(request)
    }

    /// Data on a topic counts as an implicit ack for that topic
    pub fn mark_active(&mut self, topic: &str) {
        let Some(entry) = self.topics.get_mut(topic) else {
            return;
        };
        let TopicStatus::Pending(request_id) = entry.status else {
            return;
        };
        entry.status = TopicStatus::Active;
        if let Some(request) = self.requests.get_mut(&request_id) {
            request.topics.retain(|t| t != topic);
            if request.topics.is_empty() {
                self.requests.remove(&request_id);
            }
        }
    }

    /// Requests past their deadline; their topics are forgotten
    pub fn expired(&mut self, now: Instant) -> Vec<(u64, PendingRequest)> {
        let ids: Vec<u64> = self
            .requests
            .iter()
            .filter(|(_, request)| request.deadline.is_some_and(|deadline| now >= deadline))
            .map(|(id, _)| *id)
            .collect();

        let mut expired = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.requests.remove(&id) {
                self.forget_pending(&request, id);
                expired.push((id, request));
            }
        }
        expired
    }

    /// Re-request a live topic (order book resync); failures reject every waiter of `hash`
    pub fn resubscribe(&mut self, topic: &str, hash: &str, deadline: Option<Instant>) -> u64 {
        let request_id = self.next_request_id();
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| TopicEntry {
                status: TopicStatus::Active,
                hashes: BTreeSet::new(),
            });
        entry.hashes.insert(hash.to_string());
        if let TopicStatus::Pending(previous) = entry.status
            && let Some(request) = self.requests.get_mut(&previous)
        {
            request.topics.retain(|t| t != topic);
        }
        entry.status = TopicStatus::Pending(request_id);
        self.requests.insert(
            request_id,
            PendingRequest {
                topics: vec![topic.to_string()],
                waiters: Vec::new(),
                hashes: vec![hash.to_string()],
                deadline,
            },
        );
        request_id
    }

    /// Drop one hash's interest; true when the topic has no interest left and was removed
    pub fn release(&mut self, topic: &str, hash: &str) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };
        entry.hashes.remove(hash);
        if !entry.hashes.is_empty() {
            return false;
        }
        self.remove(topic)
    }

    /// Forget a topic entirely
    pub fn remove(&mut self, topic: &str) -> bool {
        let Some(entry) = self.topics.remove(topic) else {
            return false;
        };
        if let TopicStatus::Pending(request_id) = entry.status
            && let Some(request) = self.requests.get_mut(&request_id)
        {
            request.topics.retain(|t| t != topic);
            if request.topics.is_empty() {
                self.requests.remove(&request_id);
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.topics.clear();
        self.requests.clear();
    }

    fn forget_pending(&mut self, request: &PendingRequest, request_id: u64) {
        for topic in &request.topics {
            if self
                .topics
                .get(topic)
                .is_some_and(|entry| entry.status == TopicStatus::Pending(request_id))
            {
                self.topics.remove(topic);
            }
        }
    }
}

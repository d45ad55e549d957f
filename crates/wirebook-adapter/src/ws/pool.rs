/*
[INPUT]:  WebSocket URLs requested by the stream client
[OUTPUT]: One live ConnectionHandle per URL, reopened lazily after a drop
[POS]:    WebSocket layer - connection pool shared by all callers of a client
[UPDATE]: When changing connect sharing or reconnect policy
*/

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::connection::{self, ConnectionContext, ConnectionHandle};
use super::transport::Connector;
use crate::error::Result;

type Slot = Arc<Mutex<Option<ConnectionHandle>>>;

/// Lazily opened connections keyed by URL
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    context: ConnectionContext,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, context: ConnectionContext) -> Self {
        Self {
            connector,
            context,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    async fn slot(&self, url: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Return the open connection for `url`, connecting if needed.
    ///
    /// Concurrent callers for the same URL queue on the slot lock, so only the
    /// first one opens a socket and the rest reuse it.
    pub async fn ensure_connection(&self, url: &str) -> Result<ConnectionHandle> {
        let slot = self.slot(url).await;
        let mut current = slot.lock().await;

        if let Some(handle) = current.as_ref() {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
            info!(url, connection_id = %handle.connection_id(), "replacing closed ws connection");
        }

        let handle = connection::open(url, self.connector.as_ref(), &self.context).await?;
        *current = Some(handle.clone());
        Ok(handle)
    }

    /// Open handle for `url` without connecting
    pub async fn get(&self, url: &str) -> Option<ConnectionHandle> {
        let slot = self.slots.lock().await.get(url).cloned()?;
        let current = slot.lock().await;
        current.as_ref().filter(|h| !h.is_closed()).cloned()
    }

    /// Every connection that is still open
    pub async fn handles(&self) -> Vec<ConnectionHandle> {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut handles = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(handle) = slot.lock().await.as_ref().filter(|h| !h.is_closed()) {
                handles.push(handle.clone());
            }
        }
        handles
    }

    pub async fn close(&self, url: &str) {
        let Some(slot) = self.slots.lock().await.remove(url) else {
            return;
        };
        if let Some(handle) = slot.lock().await.take() {
            debug!(url, connection_id = %handle.connection_id(), "closing ws connection");
            handle.close().await;
            handle.closed().await;
        }
    }

    pub async fn close_all(&self) {
        let urls: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        for url in urls {
            self.close(&url).await;
        }
    }
}

/*
[INPUT]:  Snapshot requests described by a venue (endpoint, params, auth)
[OUTPUT]: Raw JSON snapshot for the venue to parse
[POS]:    HTTP layer - REST snapshot collaborator used by the stream engine
[UPDATE]: When adding snapshot sources or request options
*/

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::client::RestClient;
use crate::error::{Result, WirebookError};

/// One-time REST snapshot request
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRequest {
    pub endpoint: String,
    /// JSON object whose entries become query parameters
    pub params: Value,
    pub signed: bool,
}

impl SnapshotRequest {
    pub fn public(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Value::Object(Default::default()),
            signed: false,
        }
    }

    pub fn signed(endpoint: impl Into<String>) -> Self {
        Self {
            signed: true,
            ..Self::public(endpoint)
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub(crate) fn query_pairs(&self) -> Result<Vec<(String, String)>> {
        match &self.params {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) => Ok(map
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), value)
                })
                .collect()),
            other => Err(WirebookError::InvalidRequest(format!(
                "snapshot params must be an object, got {other}"
            ))),
        }
    }
}

/// Source of bootstrap snapshots for private channels
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Value>;
}

#[async_trait]
impl SnapshotFetcher for RestClient {
    async fn fetch(&self, request: &SnapshotRequest) -> Result<Value> {
        let params = request.query_pairs()?;
        let builder = self.request(Method::GET, &request.endpoint, &params, request.signed)?;
        self.send_json(builder).await
    }
}

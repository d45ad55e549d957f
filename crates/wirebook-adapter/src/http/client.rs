/*
[INPUT]:  HTTP configuration (base URL, timeouts, optional credentials)
[OUTPUT]: Configured reqwest client returning typed JSON or mapped errors
[POS]:    HTTP layer - core client used for one-time snapshot bootstrap
[UPDATE]: When adding connection options or changing request signing
*/

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::auth::{Credentials, HmacSigner};
use crate::error::{Result, WirebookError};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Venue error body returned with non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, alias = "message")]
    msg: Option<String>,
}

/// REST client for snapshot endpoints
#[derive(Debug)]
pub struct RestClient {
    http_client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl RestClient {
    /// Create a new client with default configuration
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(base_url: &str, config: ClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| WirebookError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: Url::parse(base_url)?,
            credentials: None,
        })
    }

    /// Set credentials for signed requests
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, endpoint: &str, params: &[(String, String)]) -> Result<Url> {
        let mut url = self.base_url.join(endpoint)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Build a request; `signed` adds key, timestamp and HMAC headers
    pub(crate) fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(String, String)],
        signed: bool,
    ) -> Result<RequestBuilder> {
        let url = self.url(endpoint, params)?;
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        let mut builder = self.http_client.request(method.clone(), url);

        if signed {
            let credentials = self.credentials.as_ref().ok_or_else(|| {
                WirebookError::authentication("credentials required for signed request")
            })?;
            credentials.validate()?;
            let timestamp = chrono::Utc::now().timestamp_millis();
            let payload = format!("{timestamp}{}{path}", method.as_str());
            let signature = HmacSigner::new(&credentials.secret).sign_hex(&payload)?;
            builder = builder
                .header("X-API-KEY", &credentials.api_key)
                .header("X-TIMESTAMP", timestamp.to_string())
                .header("X-SIGNATURE", signature);
            if let Some(passphrase) = &credentials.passphrase {
                builder = builder.header("X-PASSPHRASE", passphrase);
            }
        }

        Ok(builder)
    }

    /// Send and decode a JSON response, mapping HTTP failures into the taxonomy
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), bytes = body.len(), "rest request failed");
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|parsed| {
                    let code = parsed.code.map(|c| match c {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    });
                    match (code, parsed.msg) {
                        (Some(code), Some(msg)) => Some(format!("{msg} ({code})")),
                        (None, Some(msg)) => Some(msg),
                        (Some(code), None) => Some(code),
                        (None, None) => None,
                    }
                })
                .unwrap_or(body);
            return Err(WirebookError::from_status(status, message));
        }

        serde_json::from_str(&body).map_err(|e| WirebookError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_with_params() {
        let client = RestClient::new("https://api.example.com").unwrap();
        let url = client
            .url(
                "/v1/balance",
                &[("account".to_string(), "spot".to_string())],
            )
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/balance?account=spot");

        let bare = client.url("/v1/positions", &[]).unwrap();
        assert_eq!(bare.query(), None);
    }

    #[test]
    fn test_signed_request_requires_credentials() {
        let client = RestClient::new("https://api.example.com").unwrap();
        let err = client
            .request(Method::GET, "/v1/balance", &[], true)
            .unwrap_err();
        assert!(err.is_auth_error());
    }
}

/*
[INPUT]:  YAML configuration file and credential environment variables
[OUTPUT]: Parsed and validated monitor configuration
[POS]:    Configuration layer - watch setup
[UPDATE]: When adding new configuration options
*/

use std::collections::BTreeMap;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use wirebook_adapter::{ChannelKind, Credentials, StreamConfig};

/// Top-level configuration for the monitor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Public stream endpoint
    pub public_url: String,
    /// Private stream endpoint; defaults to `public_url`
    #[serde(default)]
    pub private_url: Option<String>,
    /// REST base URL for balance and position snapshots
    #[serde(default)]
    pub rest_url: Option<String>,
    /// Names of the environment variables holding credentials
    #[serde(default)]
    pub credentials: Option<CredentialEnv>,
    #[serde(default)]
    pub stream: StreamConfig,
    /// Unified symbol -> venue market id overrides
    #[serde(default)]
    pub markets: BTreeMap<String, String>,
    pub watches: Vec<WatchConfig>,
}

/// Environment variable names; secrets never live in the YAML file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialEnv {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default)]
    pub passphrase_env: Option<String>,
}

/// Channel names accepted in the YAML file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchChannel {
    #[serde(alias = "orderbook")]
    OrderBook,
    Trades,
    Ohlcv,
    Ticker,
    Orders,
    Positions,
    Balance,
}

impl WatchChannel {
    pub fn kind(self) -> ChannelKind {
        match self {
            WatchChannel::OrderBook => ChannelKind::OrderBook,
            WatchChannel::Trades => ChannelKind::Trades,
            WatchChannel::Ohlcv => ChannelKind::Ohlcv,
            WatchChannel::Ticker => ChannelKind::Ticker,
            WatchChannel::Orders => ChannelKind::Orders,
            WatchChannel::Positions => ChannelKind::Positions,
            WatchChannel::Balance => ChannelKind::Balance,
        }
    }
}

/// One stream to follow
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatchConfig {
    pub channel: WatchChannel,
    #[serde(default)]
    pub symbol: Option<String>,
    /// Candle interval, required for `ohlcv`
    #[serde(default)]
    pub timeframe: Option<String>,
    /// Levels / entries shown per update
    #[serde(default)]
    pub limit: Option<usize>,
}

impl WatchConfig {
    /// Short label used in log fields
    pub fn label(&self) -> String {
        let mut label = self.channel.kind().as_str().to_string();
        if let Some(symbol) = &self.symbol {
            label.push(':');
            label.push_str(symbol);
        }
        if let Some(timeframe) = &self.timeframe {
            label.push(':');
            label.push_str(timeframe);
        }
        label
    }
}

fn default_api_key_env() -> String {
    "WIREBOOK_API_KEY".to_string()
}

fn default_secret_env() -> String {
    "WIREBOOK_API_SECRET".to_string()
}

impl MonitorConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn private_url(&self) -> &str {
        self.private_url.as_deref().unwrap_or(&self.public_url)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.stream.validate().context("stream settings")?;
        if self.watches.is_empty() {
            bail!("at least one watch is required");
        }
        for watch in &self.watches {
            let kind = watch.channel.kind();
            if kind.requires_symbol() && watch.symbol.is_none() {
                bail!("watch {} requires a symbol", watch.label());
            }
            if kind == ChannelKind::Ohlcv && watch.timeframe.is_none() {
                bail!("watch {} requires a timeframe", watch.label());
            }
            if kind.is_private() && self.credentials.is_none() {
                bail!("watch {} requires a credentials block", watch.label());
            }
        }
        Ok(())
    }

    /// Read credentials from the configured environment variables
    pub fn resolve_credentials(&self) -> anyhow::Result<Option<Credentials>> {
        let Some(env) = &self.credentials else {
            return Ok(None);
        };
        let api_key = std::env::var(&env.api_key_env)
            .with_context(|| format!("environment variable {} not set", env.api_key_env))?;
        let secret = std::env::var(&env.secret_env)
            .with_context(|| format!("environment variable {} not set", env.secret_env))?;
        let mut credentials = Credentials::new(api_key, secret);
        if let Some(name) = &env.passphrase_env {
            let passphrase = std::env::var(name)
                .with_context(|| format!("environment variable {name} not set"))?;
            credentials = credentials.with_passphrase(passphrase);
        }
        Ok(Some(credentials))
    }
}

/*
[INPUT]:  Caller-supplied stream settings (code or deserialized YAML/JSON)
[OUTPUT]: Validated timeouts, heartbeat cadence and cache limits
[POS]:    Configuration layer - shared by connection pool, caches and reconstructor
[UPDATE]: When adding connection options or cache limits
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WirebookError};

/// Streaming engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub connect_timeout_ms: u64,
    /// Zero disables the heartbeat
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    /// Zero disables subscribe/login timeouts
    pub subscribe_timeout_ms: u64,
    pub trades_limit: usize,
    pub ohlcv_limit: usize,
    pub orders_limit: usize,
    pub positions_limit: usize,
    pub max_buffered_deltas: usize,
    pub max_resync_attempts: u32,
    pub outbound_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ping_interval_ms: 20_000,
            pong_timeout_ms: 60_000,
            subscribe_timeout_ms: 10_000,
            trades_limit: 1000,
            ohlcv_limit: 1000,
            orders_limit: 1000,
            positions_limit: 1000,
            max_buffered_deltas: 100,
            max_resync_attempts: 3,
            outbound_buffer: 100,
        }
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_ms > 0).then(|| Duration::from_millis(self.ping_interval_ms))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn subscribe_timeout(&self) -> Option<Duration> {
        (self.subscribe_timeout_ms > 0).then(|| Duration::from_millis(self.subscribe_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("trades_limit", self.trades_limit),
            ("ohlcv_limit", self.ohlcv_limit),
            ("orders_limit", self.orders_limit),
            ("positions_limit", self.positions_limit),
            ("outbound_buffer", self.outbound_buffer),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(WirebookError::Config(format!("{name} must be greater than zero")));
        }

        if self.ping_interval_ms > 0 && self.pong_timeout_ms < self.ping_interval_ms {
            return Err(WirebookError::Config(format!(
                "pong_timeout_ms ({}) must not be shorter than ping_interval_ms ({})",
                self.pong_timeout_ms, self.ping_interval_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ping_interval(), Some(Duration::from_secs(20)));
        assert_eq!(config.subscribe_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: StreamConfig =
            serde_json::from_str(r#"{"trades_limit": 50, "ping_interval_ms": 0}"#).unwrap();
        assert_eq!(config.trades_limit, 50);
        assert_eq!(config.ohlcv_limit, 1000);
        assert!(config.ping_interval().is_none());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let config = StreamConfig {
            orders_limit: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("orders_limit"));
    }

    #[test]
    fn test_validate_rejects_short_pong_timeout() {
        let config = StreamConfig {
            ping_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(WirebookError::Config(_))));
    }
}

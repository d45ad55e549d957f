/*
[INPUT]:  Error sources (transport, venue responses, serialization, auth, REST)
[OUTPUT]: Structured, cloneable error types with retry hints and venue code mapping
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or extending the venue error taxonomy
*/

use std::collections::HashMap;
use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Exchange error sub-kinds decoded from venue codes and messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeErrorKind {
    BadRequest,
    BadSymbol,
    InvalidOrder,
    OrderNotFound,
    InsufficientFunds,
    PermissionDenied,
    RateLimitExceeded,
    ExchangeNotAvailable,
    Generic,
}

impl fmt::Display for ExchangeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeErrorKind::BadRequest => "BadRequest",
            ExchangeErrorKind::BadSymbol => "BadSymbol",
            ExchangeErrorKind::InvalidOrder => "InvalidOrder",
            ExchangeErrorKind::OrderNotFound => "OrderNotFound",
            ExchangeErrorKind::InsufficientFunds => "InsufficientFunds",
            ExchangeErrorKind::PermissionDenied => "PermissionDenied",
            ExchangeErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ExchangeErrorKind::ExchangeNotAvailable => "ExchangeNotAvailable",
            ExchangeErrorKind::Generic => "ExchangeError",
        };
        f.write_str(name)
    }
}

/// Main error type for the wirebook engine
///
/// Cloneable so one failure can be delivered to every waiter of a message hash.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WirebookError {
    /// Transport failure: socket closed, pong timeout, DNS, send on a dead connection
    #[error("Network error: {0}")]
    Network(String),

    /// Login rejected or credentials missing
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Venue reported an error for a specific request
    #[error("{kind} (code {code}): {message}")]
    Exchange {
        kind: ExchangeErrorKind,
        code: String,
        message: String,
    },

    /// Channel / market / parameter combination has no server-side equivalent
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Caller supplied an unusable request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No acknowledgment or response within the configured window
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Subscription was removed while the caller was waiting
    #[error("Unsubscribed: {0}")]
    Unsubscribed(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    UrlParse(String),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl WirebookError {
    pub fn network(message: impl Into<String>) -> Self {
        WirebookError::Network(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        WirebookError::Authentication {
            message: message.into(),
        }
    }

    pub fn exchange(
        kind: ExchangeErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        WirebookError::Exchange {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            WirebookError::Network(_) | WirebookError::Timeout(_) => true,
            WirebookError::Exchange { kind, .. } => matches!(
                kind,
                ExchangeErrorKind::RateLimitExceeded | ExchangeErrorKind::ExchangeNotAvailable
            ),
            _ => false,
        }
    }

    /// Get retry delay in seconds (if retryable)
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            WirebookError::Exchange {
                kind: ExchangeErrorKind::RateLimitExceeded,
                ..
            } => Some(5),
            WirebookError::Network(_) | WirebookError::Timeout(_) => Some(1),
            _ => None,
        }
    }

    /// Check if error indicates authentication failure
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            WirebookError::Authentication { .. }
                | WirebookError::Exchange {
                    kind: ExchangeErrorKind::PermissionDenied,
                    ..
                }
        )
    }

    /// Map an HTTP status from the REST snapshot collaborator
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = status.as_u16().to_string();
        match status.as_u16() {
            401 | 403 => WirebookError::Authentication { message },
            404 => WirebookError::exchange(ExchangeErrorKind::BadRequest, code, message),
            429 => WirebookError::exchange(ExchangeErrorKind::RateLimitExceeded, code, message),
            500..=599 => {
                WirebookError::exchange(ExchangeErrorKind::ExchangeNotAvailable, code, message)
            }
            _ => WirebookError::exchange(ExchangeErrorKind::BadRequest, code, message),
        }
    }
}

impl From<reqwest::Error> for WirebookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WirebookError::Timeout(err.to_string())
        } else if err.is_decode() {
            WirebookError::InvalidResponse(err.to_string())
        } else {
            WirebookError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for WirebookError {
    fn from(err: serde_json::Error) -> Self {
        WirebookError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for WirebookError {
    fn from(err: url::ParseError) -> Self {
        WirebookError::UrlParse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for WirebookError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        WirebookError::Network(err.to_string())
    }
}

/// Result type alias for wirebook operations
pub type Result<T> = std::result::Result<T, WirebookError>;

/// Venue error code table: exact matches first, then broad substring matches
#[derive(Debug, Clone, Default)]
pub struct ErrorTaxonomy {
    exact: HashMap<String, ExchangeErrorKind>,
    broad: Vec<(String, ExchangeErrorKind)>,
}

impl ErrorTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact code (or exact message) mapping
    pub fn exact(mut self, code: impl Into<String>, kind: ExchangeErrorKind) -> Self {
        self.exact.insert(code.into(), kind);
        self
    }

    /// Add a broad substring mapping; earlier entries win
    pub fn broad(mut self, needle: impl Into<String>, kind: ExchangeErrorKind) -> Self {
        self.broad.push((needle.into().to_ascii_lowercase(), kind));
        self
    }

    pub fn classify(&self, code: &str, message: &str) -> ExchangeErrorKind {
        if let Some(kind) = self.exact.get(code).or_else(|| self.exact.get(message)) {
            return *kind;
        }

        let lowered = message.to_ascii_lowercase();
        self.broad
            .iter()
            .find(|(needle, _)| lowered.contains(needle.as_str()))
            .map(|(_, kind)| *kind)
            .unwrap_or(ExchangeErrorKind::Generic)
    }

    /// Build the error delivered to the request's waiters
    pub fn map(&self, code: &str, message: &str) -> WirebookError {
        WirebookError::exchange(self.classify(code, message), code, message)
    }
}

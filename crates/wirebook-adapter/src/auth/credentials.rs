/*
[INPUT]:  API key material supplied by the caller's config loader
[OUTPUT]: Credentials value with redacted Debug output
[POS]:    Auth layer - credential container
[UPDATE]: When venues require additional credential fields
*/

use std::fmt;

use serde::Deserialize;

use crate::error::{Result, WirebookError};

/// API credentials for private channels
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub secret: String,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() || self.secret.is_empty() {
            return Err(WirebookError::authentication(
                "api_key and secret are required for private channels",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new("key-1", "super-secret").with_passphrase("pass");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("key-1"));
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("pass\""));
    }

    #[test]
    fn empty_secret_is_an_auth_error() {
        let err = Credentials::new("key", "").validate().unwrap_err();
        assert!(err.is_auth_error());
    }
}

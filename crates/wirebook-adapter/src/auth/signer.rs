/*
[INPUT]:  Secret key and login payload bytes
[OUTPUT]: HMAC-SHA256 signatures in hex or base64
[POS]:    Auth layer - cryptographic signing for login frames
[UPDATE]: When changing signing algorithm or signature encoding
*/

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, WirebookError};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer for login payloads
#[derive(Clone)]
pub struct HmacSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

impl HmacSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn digest(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| WirebookError::authentication(format!("invalid secret: {e}")))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Lowercase hex signature
    pub fn sign_hex(&self, payload: &str) -> Result<String> {
        Ok(hex::encode(self.digest(payload.as_bytes())?))
    }

    /// Standard base64 signature
    pub fn sign_base64(&self, payload: &str) -> Result<String> {
        Ok(STANDARD.encode(self.digest(payload.as_bytes())?))
    }
}

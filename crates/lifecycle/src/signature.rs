//! Webhook signature verification (HMAC-SHA256 over the raw body).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Invalid webhook signature")]
    Invalid,
}

/// Checks the hex HMAC a gateway sends with each notification.
///
/// Without a secret every request passes, which is meant for local
/// development only.
#[derive(Clone, Default)]
pub struct SignatureVerifier {
    secret: Option<Vec<u8>>,
}

impl SignatureVerifier {
    /// Creates a verifier. An empty secret disables verification.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(String::into_bytes),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Verifies `signature` against `body` in constant time.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };

        let signature = signature.map(str::trim).ok_or(SignatureError::Invalid)?;
        let expected = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;

        let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Invalid)?;
        mac.update(body);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Invalid)
    }

    /// Hex signature for `body`, or `None` when verification is disabled.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic SHA-256 fingerprint of a request payload.
///
/// Two requests carrying the same idempotency key must fingerprint equal to
/// be treated as the same logical operation. The digest is computed over a
/// canonical JSON serialization (object keys sorted), so incidental field
/// ordering in the wire representation does not affect the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFingerprint(String);

impl PayloadFingerprint {
    /// Computes the fingerprint of a payload. An absent payload hashes the
    /// empty byte string, a stable sentinel distinct from any JSON body.
    pub fn compute(payload: Option<&serde_json::Value>) -> Self {
        let mut hasher = Sha256::new();
        if let Some(value) = payload {
            // serde_json::Value keeps object keys sorted, so re-serializing
            // yields a canonical byte sequence.
            let canonical = serde_json::to_vec(value).unwrap_or_default();
            hasher.update(&canonical);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PayloadFingerprint {
    /// Rehydrates a fingerprint from its stored hex form.
    fn from(hex: String) -> Self {
        Self(hex)
    }
}

impl std::fmt::Display for PayloadFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

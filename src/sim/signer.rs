// Webhook signing: HMAC-SHA256 over payload bytes followed by the timestamp

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookSigner {
    secret: String,
}

impl WebhookSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Lowercase hex of `HMAC_SHA256(secret, payload || timestamp)`.
    /// The concatenation is byte-level; receivers must recompute it the same
    /// way against the raw body and the `X-Timestamp` header.
    pub fn sign(&self, payload: &[u8], timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload);
        mac.update(timestamp.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Value for the `X-Signature` header.
    pub fn signature_header(&self, payload: &[u8], timestamp: &str) -> String {
        format!("sha256={}", self.sign(payload, timestamp))
    }

    /// Constant-time check of a received hex signature. `signature` may carry
    /// the `sha256=` prefix.
    #[allow(dead_code)]
    pub fn verify(&self, payload: &[u8], timestamp: &str, signature: &str) -> bool {
        let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
        let expected = self.sign(payload, timestamp);
        expected.as_bytes().len() == signature.as_bytes().len()
            && expected
                .as_bytes()
                .iter()
                .zip(signature.as_bytes())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

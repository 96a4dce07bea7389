// Idempotency fingerprint for intent creation

use sha2::{Digest, Sha256};

use crate::sim::types::CreatePaymentIntentRequest;

/// Deterministic fingerprint of the creation inputs, used as the idempotency
/// key when the caller does not supply one.
///
/// Only the metadata *cardinality* participates, not its content: metadata is
/// opaque passthrough, and callers force a distinct intent by changing its
/// shape (e.g. adding a nonce key). Two requests that differ only in metadata
/// values intentionally collide.
pub fn fingerprint(req: &CreatePaymentIntentRequest) -> String {
    let content = format!(
        "{}:{}:{}:{}:{}:{}",
        req.reservation_id,
        req.amount,
        req.scenario.as_str(),
        req.delay_ms,
        req.webhook_url,
        req.metadata_cardinality(),
    );
    hex::encode(Sha256::digest(content.as_bytes()))
}

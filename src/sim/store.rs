// In-memory intent store with TTL eviction and an idempotency index.
//
// One lock guards both maps: contention here is negligible next to webhook
// I/O, and a single guard keeps put_if_absent linearizable per idempotency
// key without cross-map ordering concerns.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::sim::errors::SimError;
use crate::sim::types::PaymentIntent;

pub struct IntentStore {
    inner: RwLock<Inner>,
    ttl_ms: i64,
}

struct Inner {
    intents: HashMap<String, PaymentIntent>,
    idempotency_keys: HashMap<String, String>,
}

impl IntentStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                intents: HashMap::new(),
                idempotency_keys: HashMap::new(),
            }),
            ttl_ms: ttl.as_millis() as i64,
        }
    }

    /// Inserts the intent unless its idempotency key is already mapped.
    /// Returns the stored intent and whether it already existed; at most one
    /// caller per key ever observes `existed == false`.
    pub async fn put_if_absent(&self, intent: PaymentIntent) -> (PaymentIntent, bool) {
        let mut inner = self.inner.write().await;
        if let Some(existing_id) = inner.idempotency_keys.get(&intent.idempotency_key) {
            if let Some(existing) = inner.intents.get(existing_id) {
                return (existing.clone(), true);
            }
        }
        inner
            .idempotency_keys
            .insert(intent.idempotency_key.clone(), intent.id.clone());
        inner.intents.insert(intent.id.clone(), intent.clone());
        (intent, false)
    }

    pub async fn get(&self, id: &str) -> Option<PaymentIntent> {
        self.inner.read().await.intents.get(id).cloned()
    }

    /// Applies `f` to the entry under the write lock and returns the updated
    /// intent. `f` must only perform the one-way status transitions the
    /// domain allows.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<PaymentIntent, SimError>
    where
        F: FnOnce(&mut PaymentIntent),
    {
        let mut inner = self.inner.write().await;
        match inner.intents.get_mut(id) {
            Some(intent) => {
                f(intent);
                Ok(intent.clone())
            }
            None => Err(SimError::NotFound(id.to_string())),
        }
    }

    /// Evicts every entry older than the TTL along with its reverse index
    /// entry. Returns how many intents were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let expired: Vec<String> = inner
            .intents
            .iter()
            .filter(|(_, intent)| {
                now.signed_duration_since(intent.created_at).num_milliseconds() > self.ttl_ms
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(intent) = inner.intents.remove(id) {
                inner.idempotency_keys.remove(&intent.idempotency_key);
            }
        }
        expired.len()
    }
}

/// Periodic best-effort sweeper; lives until the process exits.
pub fn spawn_sweeper(store: Arc<IntentStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick completes immediately
        loop {
            ticker.tick().await;
            let removed = store.sweep(Utc::now()).await;
            if removed > 0 {
                debug!(removed, "swept expired payment intents");
            }
        }
    })
}

// Intent service: creation with idempotency, lookup, scheduled delivery.

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::sim::clock::Clock;
use crate::sim::dispatcher::{WebhookDispatcher, WebhookJob};
use crate::sim::errors::SimError;
use crate::sim::idempotency;
use crate::sim::metrics::SimMetrics;
use crate::sim::scenario::{self, ScenarioConfig, ScenarioPlan};
use crate::sim::store::IntentStore;
use crate::sim::types::{CreatePaymentIntentRequest, PaymentIntent, WebhookType};

pub struct IntentService {
    store: Arc<IntentStore>,
    dispatcher: Arc<WebhookDispatcher>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SimMetrics>,
    scenario_cfg: ScenarioConfig,
    rng: Mutex<SmallRng>,
}

impl IntentService {
    pub fn new(
        store: Arc<IntentStore>,
        dispatcher: Arc<WebhookDispatcher>,
        clock: Arc<dyn Clock>,
        metrics: Arc<SimMetrics>,
        scenario_cfg: ScenarioConfig,
        rng_seed: Option<u64>,
    ) -> Self {
        let rng = match rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            store,
            dispatcher,
            clock,
            metrics,
            scenario_cfg,
            rng: Mutex::new(rng),
        }
    }

    /// Creates a payment intent, or returns the previously created one when
    /// the idempotency key is already live. Only a fresh insert schedules a
    /// delivery.
    pub async fn create(
        &self,
        req: CreatePaymentIntentRequest,
        caller_key: Option<String>,
    ) -> Result<PaymentIntent, SimError> {
        req.validate()?;

        let key = match caller_key {
            Some(key) => {
                Uuid::parse_str(&key).map_err(|_| {
                    SimError::Validation("idempotency key must be a UUID".to_string())
                })?;
                key
            }
            None => idempotency::fingerprint(&req),
        };

        let now = self.clock.now();
        let intent = PaymentIntent::new(&req, key, now);
        let (stored, existed) = self.store.put_if_absent(intent).await;

        if existed {
            self.metrics.idempotency_hits.inc();
            info!(
                idempotency_key = %stored.idempotency_key,
                payment_intent_id = %stored.id,
                "idempotency hit"
            );
            return Ok(stored);
        }

        self.metrics.scenario(req.scenario).inc();

        let plan = {
            let mut rng = self.rng.lock().await;
            scenario::plan(req.scenario, req.delay_ms, &self.scenario_cfg, &mut *rng)
        };
        self.schedule_delivery(&stored, plan);

        info!(
            payment_intent_id = %stored.id,
            scenario = %stored.scenario,
            webhook_url = %stored.webhook_url,
            "payment intent created"
        );
        Ok(stored)
    }

    fn schedule_delivery(&self, intent: &PaymentIntent, plan: ScenarioPlan) {
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let clock = self.clock.clone();
        let id = intent.id.clone();
        let target_url = intent.webhook_url.clone();

        self.clock.after(
            plan.delay,
            Box::pin(async move {
                deliver(store, dispatcher, clock, id, plan, target_url).await;
            }),
        );

        info!(
            payment_intent_id = %intent.id,
            scenario = %intent.scenario,
            webhook_type = %plan.webhook_type,
            delay_ms = plan.delay.as_millis() as u64,
            "webhook delivery scheduled"
        );
    }

    pub async fn get(&self, id: &str) -> Result<PaymentIntent, SimError> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| SimError::NotFound(id.to_string()))
    }

    /// Forces delivery of a typed payload for an existing intent, bypassing
    /// scenario planning. No status change and no bus event.
    pub async fn test_webhook(
        &self,
        id: &str,
        kind: WebhookType,
        target_url: &str,
    ) -> Result<(), SimError> {
        let intent = self.get(id).await?;
        let payload = intent.webhook_payload(kind, self.clock.now());
        self.dispatcher.submit(WebhookJob {
            payload,
            target_url: target_url.to_string(),
            intent_id: intent.id.clone(),
            attempt: 1,
            event: None,
        });
        info!(
            payment_intent_id = %intent.id,
            webhook_type = %kind,
            target_url = %target_url,
            "test webhook scheduled"
        );
        Ok(())
    }
}

/// Fires at the planned time: writes the terminal status, then enqueues the
/// webhook job. The store update happens-before the first delivery attempt.
async fn deliver(
    store: Arc<IntentStore>,
    dispatcher: Arc<WebhookDispatcher>,
    clock: Arc<dyn Clock>,
    id: String,
    plan: ScenarioPlan,
    target_url: String,
) {
    let now = clock.now();
    let updated = match store
        .update(&id, |pi| {
            pi.finalize_status(plan.final_status, now);
        })
        .await
    {
        Ok(intent) => intent,
        Err(_) => {
            warn!(payment_intent_id = %id, "intent evicted before delivery, skipping webhook");
            return;
        }
    };

    let payload = updated.webhook_payload(plan.webhook_type, now);
    let event = updated.status_event(now);
    dispatcher.submit(WebhookJob {
        payload,
        target_url,
        intent_id: id,
        attempt: 1,
        event: Some(event),
    });
}

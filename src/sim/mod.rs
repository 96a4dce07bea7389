// Payment simulator core

pub mod clock;
pub mod dispatcher;
pub mod errors;
pub mod events;
pub mod idempotency;
pub mod metrics;
pub mod scenario;
pub mod service;
pub mod signer;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::settings::Settings;
use self::clock::{Clock, TokioClock};
use self::dispatcher::{DispatcherConfig, WebhookDispatcher};
use self::events::EventSink;
use self::metrics::SimMetrics;
use self::scenario::ScenarioConfig;
use self::service::IntentService;
use self::signer::WebhookSigner;
use self::store::IntentStore;

/// Owns the long-lived simulator state: store, dispatcher, service, metrics.
/// Constructed once at startup and handed to the HTTP boundary.
pub struct SimProvider {
    store: Arc<IntentStore>,
    dispatcher: Arc<WebhookDispatcher>,
    service: Arc<IntentService>,
    metrics: Arc<SimMetrics>,
}

impl SimProvider {
    pub fn new(cfg: &Settings, sink: Arc<dyn EventSink>) -> anyhow::Result<Self> {
        Self::with_clock(cfg, sink, Arc::new(TokioClock), None)
    }

    /// Wiring with an explicit clock and RNG seed; tests inject a virtual
    /// clock and a fixed seed here.
    pub fn with_clock(
        cfg: &Settings,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        rng_seed: Option<u64>,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(SimMetrics::new());
        let store = Arc::new(IntentStore::new(cfg.store_ttl));

        let dispatcher_cfg = DispatcherConfig {
            timeout: Duration::from_millis(cfg.webhook_timeout_ms),
            max_retries: cfg.webhook_max_retries,
            backoff_base: Duration::from_millis(cfg.webhook_backoff_ms),
            max_rps: cfg.webhook_max_rps,
            ..Default::default()
        };
        let dispatcher = Arc::new(WebhookDispatcher::new(
            dispatcher_cfg,
            WebhookSigner::new(cfg.webhook_secret.clone()),
            sink,
            clock.clone(),
            metrics.clone(),
        )?);

        let scenario_cfg = ScenarioConfig {
            approve_delay: Duration::from_millis(cfg.approve_delay_ms),
            fail_delay: Duration::from_millis(cfg.fail_delay_ms),
            delay_delay: Duration::from_millis(cfg.delay_delay_ms),
            random_approve_rate: cfg.random_approve_rate,
        };
        let service = Arc::new(IntentService::new(
            store.clone(),
            dispatcher.clone(),
            clock,
            metrics.clone(),
            scenario_cfg,
            rng_seed,
        ));

        Ok(Self {
            store,
            dispatcher,
            service,
            metrics,
        })
    }

    pub fn service(&self) -> Arc<IntentService> {
        Arc::clone(&self.service)
    }

    pub fn store(&self) -> Arc<IntentStore> {
        Arc::clone(&self.store)
    }

    pub fn dispatcher(&self) -> Arc<WebhookDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn metrics(&self) -> Arc<SimMetrics> {
        Arc::clone(&self.metrics)
    }
}

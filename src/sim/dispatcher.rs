// Webhook delivery: bounded queue, worker pool, signed POSTs, retries.
//
// Submission is a non-blocking offer; when the queue is full the job is
// dropped and counted, load-shedding instead of backpressuring intent
// creation. Failed attempts are re-enqueued through the clock after an
// exponential backoff, so workers stay free during waits.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::sim::clock::Clock;
use crate::sim::errors::DeliveryError;
use crate::sim::events::EventSink;
use crate::sim::metrics::SimMetrics;
use crate::sim::signer::WebhookSigner;
use crate::sim::types::{PaymentEvent, WebhookPayload};

const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// One scheduled delivery. `attempt` is 1-based; the event rides along only
/// until the first attempt publishes it.
pub struct WebhookJob {
    pub payload: WebhookPayload,
    pub target_url: String,
    pub intent_id: String,
    pub attempt: u32,
    pub event: Option<PaymentEvent>,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub workers: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_rps: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            workers: 8,
            timeout: Duration::from_millis(1000),
            max_retries: 5,
            backoff_base: Duration::from_millis(1000),
            max_rps: 500,
        }
    }
}

pub struct WebhookDispatcher {
    inner: Arc<Inner>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

struct Inner {
    http: reqwest::Client,
    tx: mpsc::Sender<WebhookJob>,
    signer: WebhookSigner,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SimMetrics>,
    limiter: TokenBucket,
    max_retries: u32,
    backoff_base: Duration,
}

impl WebhookDispatcher {
    pub fn new(
        cfg: DispatcherConfig,
        signer: WebhookSigner,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        metrics: Arc<SimMetrics>,
    ) -> anyhow::Result<Self> {
        // The simulator fans out to a handful of internal hosts, so a large
        // keep-alive pool pays off.
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(cfg.timeout)
            .pool_max_idle_per_host(1000)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let (tx, rx) = mpsc::channel(cfg.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            http,
            tx,
            signer,
            sink,
            clock,
            metrics,
            limiter: TokenBucket::new(cfg.max_rps),
            max_retries: cfg.max_retries,
            backoff_base: cfg.backoff_base,
        });

        let workers = (0..cfg.workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    inner.clone(),
                    rx.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
            shutdown_tx,
        })
    }

    /// Non-blocking offer. A full queue drops the job and counts it.
    pub fn submit(&self, job: WebhookJob) {
        let intent_id = job.intent_id.clone();
        match self.inner.tx.try_send(job) {
            Ok(()) => {
                debug!(payment_intent_id = %intent_id, "webhook scheduled");
            }
            Err(TrySendError::Full(_)) => {
                error!(payment_intent_id = %intent_id, "webhook queue full, dropping webhook");
                self.inner.metrics.webhook_dropped.inc();
            }
            Err(TrySendError::Closed(_)) => {
                warn!(payment_intent_id = %intent_id, "dispatcher stopped, dropping webhook");
                self.inner.metrics.webhook_dropped.inc();
            }
        }
    }

    /// Signals workers and waits for in-flight deliveries up to `deadline`.
    /// Jobs still queued and timers still pending are abandoned.
    pub async fn shutdown(&self, deadline: Duration) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            warn!("webhook workers did not drain before shutdown deadline");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    inner: Arc<Inner>,
    rx: Arc<Mutex<mpsc::Receiver<WebhookJob>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                _ = shutdown.changed() => None,
            }
        };
        let Some(job) = job else { break };

        let intent_id = job.intent_id.clone();
        if let Err(panic) = AssertUnwindSafe(inner.process(job)).catch_unwind().await {
            inner.metrics.worker_panics.inc();
            error!(
                worker_id,
                payment_intent_id = %intent_id,
                panic = %panic_message(panic.as_ref()),
                "webhook worker recovered from panic"
            );
        }
    }
    debug!(worker_id, "webhook worker stopped");
}

impl Inner {
    async fn process(&self, mut job: WebhookJob) {
        self.limiter.acquire().await;

        // Status events are at-most-once per transition; the webhook itself is
        // at-least-once. Only the first attempt carries the event.
        if job.attempt == 1 {
            if let Some(event) = job.event.take() {
                if let Err(err) = self.sink.publish(event).await {
                    self.metrics.event_publish_failures.inc();
                    warn!(
                        payment_intent_id = %job.intent_id,
                        error = %err,
                        "payment event publish failed"
                    );
                }
            }
        }

        let start = Instant::now();
        match self.post_signed(&job).await {
            Ok(status) => {
                self.metrics.webhook_success.inc();
                self.metrics
                    .webhook_latency
                    .observe(start.elapsed().as_secs_f64());
                info!(
                    payment_intent_id = %job.intent_id,
                    target_url = %job.target_url,
                    status_code = status,
                    attempt = job.attempt,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "webhook delivered"
                );
            }
            Err(err) => self.handle_failure(job, err).await,
        }
    }

    async fn post_signed(&self, job: &WebhookJob) -> Result<u16, DeliveryError> {
        let body =
            serde_json::to_vec(&job.payload).map_err(|e| DeliveryError::Payload(e.to_string()))?;
        let timestamp = self.clock.now().timestamp_millis().to_string();
        let signature = self.signer.signature_header(&body, &timestamp);

        let resp = self
            .http
            .post(&job.target_url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Id", format!("{}_{}", job.intent_id, job.attempt))
            .header("X-Timestamp", &timestamp)
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }

    async fn handle_failure(&self, mut job: WebhookJob, err: DeliveryError) {
        if !err.is_retryable() {
            self.metrics.webhook_error.inc();
            error!(
                payment_intent_id = %job.intent_id,
                error = %err,
                "failed to build webhook request"
            );
            return;
        }

        self.metrics.webhook_failure.inc();
        warn!(
            payment_intent_id = %job.intent_id,
            target_url = %job.target_url,
            reason = %err.reason(),
            attempt = job.attempt,
            "webhook delivery failed"
        );

        if job.attempt < self.max_retries {
            let backoff = backoff_delay(self.backoff_base, job.attempt);
            job.attempt += 1;
            let attempt = job.attempt;
            let intent_id = job.intent_id.clone();
            let tx = self.tx.clone();
            let metrics = self.metrics.clone();
            self.clock.after(
                backoff,
                Box::pin(async move {
                    match tx.try_send(job) {
                        Ok(()) => {
                            debug!(
                                payment_intent_id = %intent_id,
                                attempt,
                                backoff_ms = backoff.as_millis() as u64,
                                "webhook retry enqueued"
                            );
                        }
                        Err(_) => {
                            metrics.webhook_dropped.inc();
                            error!(payment_intent_id = %intent_id, "webhook retry queue full");
                        }
                    }
                }),
            );
        } else {
            self.metrics.webhook_abandoned.inc();
            error!(
                payment_intent_id = %job.intent_id,
                attempt = job.attempt,
                "webhook delivery abandoned after max retries"
            );
        }
    }
}

/// base * 2^(attempt-1), capped at 30 s.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let shift = (attempt - 1).min(20);
    base.saturating_mul(1u32 << shift).min(BACKOFF_CAP)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Token bucket over outbound POSTs; workers wait for a token instead of
/// dropping, so the cap shapes throughput without a second drop path.
struct TokenBucket {
    state: Mutex<BucketState>,
    rate: f64,
    capacity: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: tokio::time::Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: u32) -> Self {
        let rate = rate_per_sec.max(1) as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: rate,
                last_refill: tokio::time::Instant::now(),
            }),
            rate,
            capacity: rate,
        }
    }

    async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = tokio::time::Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::clock::VirtualClock;
    use crate::sim::events::RecordingSink;
    use crate::sim::types::{IntentStatus, WebhookType};
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    struct Received {
        webhook_id: String,
        timestamp: String,
        signature: String,
        body: Vec<u8>,
    }

    #[derive(Default)]
    struct ReceiverState {
        requests: StdMutex<Vec<Received>>,
        // Status codes to answer with, in order; empty means 200.
        statuses: StdMutex<VecDeque<u16>>,
    }

    impl ReceiverState {
        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    async fn receive(
        State(state): State<Arc<ReceiverState>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> StatusCode {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        state.requests.lock().unwrap().push(Received {
            webhook_id: header("X-Webhook-Id"),
            timestamp: header("X-Timestamp"),
            signature: header("X-Signature"),
            body: body.to_vec(),
        });
        let code = state.statuses.lock().unwrap().pop_front().unwrap_or(200);
        StatusCode::from_u16(code).unwrap()
    }

    async fn spawn_receiver(statuses: Vec<u16>) -> (String, Arc<ReceiverState>) {
        let state = Arc::new(ReceiverState {
            statuses: StdMutex::new(statuses.into()),
            ..Default::default()
        });
        let app = Router::new()
            .route("/wh", post(receive))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/wh"), state)
    }

    fn payload(intent_id: &str) -> WebhookPayload {
        WebhookPayload {
            kind: WebhookType::Approved,
            reservation_id: "rsv_1".to_string(),
            payment_intent_id: intent_id.to_string(),
            amount: 10000,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            metadata: None,
        }
    }

    fn job(intent_id: &str, url: &str, event: Option<PaymentEvent>) -> WebhookJob {
        WebhookJob {
            payload: payload(intent_id),
            target_url: url.to_string(),
            intent_id: intent_id.to_string(),
            attempt: 1,
            event,
        }
    }

    fn event(intent_id: &str) -> PaymentEvent {
        PaymentEvent {
            payment_id: intent_id.to_string(),
            reservation_id: "rsv_1".to_string(),
            user_id: String::new(),
            status: IntentStatus::Approved,
            amount: 10000,
            currency: String::new(),
            timestamp: 0,
            event_type: "payment.status_updated".to_string(),
        }
    }

    fn dispatcher(
        cfg: DispatcherConfig,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        metrics: Arc<SimMetrics>,
    ) -> WebhookDispatcher {
        WebhookDispatcher::new(cfg, WebhookSigner::new("whsec_test"), sink, clock, metrics)
            .unwrap()
    }

    async fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    #[tokio::test]
    async fn test_delivers_signed_post() {
        let (url, receiver) = spawn_receiver(vec![]).await;
        let metrics = Arc::new(SimMetrics::new());
        let clock: Arc<VirtualClock> = Arc::new(VirtualClock::new());
        let d = dispatcher(
            DispatcherConfig::default(),
            Arc::new(RecordingSink::default()),
            clock,
            metrics.clone(),
        );

        d.submit(job("pay_1", &url, None));
        assert!(wait_until(Duration::from_secs(5), || receiver.count() == 1).await);

        let requests = receiver.requests.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.webhook_id, "pay_1_1");
        assert!(!req.timestamp.is_empty());

        // Receiver-side verification: HMAC(secret, body || X-Timestamp).
        let signer = WebhookSigner::new("whsec_test");
        assert!(signer.verify(&req.body, &req.timestamp, &req.signature));

        let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body["type"], "payment.approved");
        assert_eq!(body["payment_intent_id"], "pay_1");
        drop(requests);

        assert_eq!(metrics.webhook_success.get(), 1);
        assert_eq!(metrics.webhook_failure.get(), 0);
        assert_eq!(metrics.webhook_latency.count(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        // 503 twice, then 200: three attempts with backoff 1s then 2s.
        let (url, receiver) = spawn_receiver(vec![503, 503]).await;
        let metrics = Arc::new(SimMetrics::new());
        let clock = Arc::new(VirtualClock::new());
        let cfg = DispatcherConfig {
            max_retries: 5,
            backoff_base: Duration::from_millis(1000),
            ..Default::default()
        };
        let d = dispatcher(
            cfg,
            Arc::new(RecordingSink::default()),
            clock.clone(),
            metrics.clone(),
        );

        d.submit(job("pay_1", &url, None));
        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_failure.get() == 1).await);
        assert_eq!(clock.pending_count(), 1);

        clock.advance(Duration::from_millis(1000)).await;
        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_failure.get() == 2).await);

        clock.advance(Duration::from_millis(2000)).await;
        assert!(wait_until(Duration::from_secs(5), || receiver.count() == 3).await);

        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_success.get() == 1).await);
        assert_eq!(metrics.webhook_failure.get(), 2);
        assert_eq!(metrics.webhook_abandoned.get(), 0);

        // Attempt numbering shows up in the dedup header.
        let requests = receiver.requests.lock().unwrap();
        let ids: Vec<_> = requests.iter().map(|r| r.webhook_id.clone()).collect();
        assert_eq!(ids, vec!["pay_1_1", "pay_1_2", "pay_1_3"]);

        // Each attempt is re-signed with a fresh timestamp.
        let signer = WebhookSigner::new("whsec_test");
        for req in requests.iter() {
            assert!(signer.verify(&req.body, &req.timestamp, &req.signature));
        }
    }

    #[tokio::test]
    async fn test_abandons_after_max_retries() {
        let (url, receiver) = spawn_receiver(vec![500; 16]).await;
        let metrics = Arc::new(SimMetrics::new());
        let clock = Arc::new(VirtualClock::new());
        let cfg = DispatcherConfig {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            ..Default::default()
        };
        let d = dispatcher(
            cfg,
            Arc::new(RecordingSink::default()),
            clock.clone(),
            metrics.clone(),
        );

        d.submit(job("pay_1", &url, None));
        for _ in 0..50 {
            if metrics.webhook_abandoned.get() == 1 {
                break;
            }
            clock.advance(Duration::from_secs(1)).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(metrics.webhook_abandoned.get(), 1);

        // Exactly max_retries POSTs, then silence.
        assert_eq!(receiver.count(), 3);
        assert_eq!(metrics.webhook_failure.get(), 3);
        assert_eq!(clock.pending_count(), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(receiver.count(), 3);
    }

    #[tokio::test]
    async fn test_queue_overflow_drops() {
        // No workers: nothing drains the queue, so capacity bounds submits.
        let (url, _receiver) = spawn_receiver(vec![]).await;
        let metrics = Arc::new(SimMetrics::new());
        let cfg = DispatcherConfig {
            queue_capacity: 2,
            workers: 0,
            ..Default::default()
        };
        let d = dispatcher(
            cfg,
            Arc::new(RecordingSink::default()),
            Arc::new(VirtualClock::new()),
            metrics.clone(),
        );

        for i in 0..5 {
            d.submit(job(&format!("pay_{i}"), &url, None));
        }
        assert_eq!(metrics.webhook_dropped.get(), 3);
    }

    #[tokio::test]
    async fn test_event_published_once_across_retries() {
        let (url, receiver) = spawn_receiver(vec![503]).await;
        let metrics = Arc::new(SimMetrics::new());
        let clock = Arc::new(VirtualClock::new());
        let sink = Arc::new(RecordingSink::default());
        let cfg = DispatcherConfig {
            backoff_base: Duration::from_millis(100),
            ..Default::default()
        };
        let d = dispatcher(cfg, sink.clone(), clock.clone(), metrics.clone());

        d.submit(job("pay_1", &url, Some(event("pay_1"))));
        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_failure.get() == 1).await);
        clock.advance(Duration::from_millis(100)).await;
        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_success.get() == 1).await);

        assert_eq!(receiver.count(), 2);
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payment_id, "pay_1");
    }

    #[tokio::test]
    async fn test_event_publish_failure_does_not_block_delivery() {
        let (url, receiver) = spawn_receiver(vec![]).await;
        let metrics = Arc::new(SimMetrics::new());
        let sink = Arc::new(RecordingSink::default());
        sink.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        let d = dispatcher(
            DispatcherConfig::default(),
            sink.clone(),
            Arc::new(VirtualClock::new()),
            metrics.clone(),
        );

        d.submit(job("pay_1", &url, Some(event("pay_1"))));
        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_success.get() == 1).await);
        assert_eq!(receiver.count(), 1);
        assert_eq!(metrics.event_publish_failures.get(), 1);
        assert!(sink.events().is_empty());
    }

    struct PanickingSink;

    #[async_trait]
    impl EventSink for PanickingSink {
        async fn publish(&self, _event: PaymentEvent) -> Result<()> {
            panic!("sink exploded");
        }
    }

    #[tokio::test]
    async fn test_worker_survives_panic() {
        let (url, receiver) = spawn_receiver(vec![]).await;
        let metrics = Arc::new(SimMetrics::new());
        let cfg = DispatcherConfig {
            workers: 1,
            ..Default::default()
        };
        let d = dispatcher(
            cfg,
            Arc::new(PanickingSink),
            Arc::new(VirtualClock::new()),
            metrics.clone(),
        );

        // First job panics in the sink; the lone worker must keep going.
        d.submit(job("pay_1", &url, Some(event("pay_1"))));
        assert!(wait_until(Duration::from_secs(5), || metrics.worker_panics.get() == 1).await);

        d.submit(job("pay_2", &url, None));
        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_success.get() == 1).await);
        assert_eq!(receiver.count(), 1);
    }

    #[tokio::test]
    async fn test_network_error_is_retried() {
        // Nothing listens on this port.
        let metrics = Arc::new(SimMetrics::new());
        let clock = Arc::new(VirtualClock::new());
        let cfg = DispatcherConfig {
            max_retries: 2,
            backoff_base: Duration::from_millis(100),
            timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let d = dispatcher(
            cfg,
            Arc::new(RecordingSink::default()),
            clock.clone(),
            metrics.clone(),
        );

        d.submit(job("pay_1", "http://127.0.0.1:1/wh", None));
        assert!(wait_until(Duration::from_secs(5), || metrics.webhook_failure.get() == 1).await);
        clock.advance(Duration::from_millis(100)).await;
        assert!(wait_until(Duration::from_secs(5), || {
            metrics.webhook_abandoned.get() == 1
        })
        .await);
        assert_eq!(metrics.webhook_failure.get(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_workers() {
        let (url, receiver) = spawn_receiver(vec![]).await;
        let metrics = Arc::new(SimMetrics::new());
        let d = dispatcher(
            DispatcherConfig::default(),
            Arc::new(RecordingSink::default()),
            Arc::new(VirtualClock::new()),
            metrics.clone(),
        );

        d.submit(job("pay_1", &url, None));
        assert!(wait_until(Duration::from_secs(5), || receiver.count() == 1).await);

        d.shutdown(Duration::from_secs(5)).await;
        // Submissions after shutdown are dropped once workers are gone.
        d.submit(job("pay_2", &url, None));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(receiver.count(), 1);
    }

    #[test]
    fn test_backoff_delay_schedule() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(base, 5), Duration::from_millis(16000));
        // Capped at 30 s.
        assert_eq!(backoff_delay(base, 7), Duration::from_secs(30));
        assert_eq!(backoff_delay(base, 30), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_paces_acquisitions() {
        let bucket = TokenBucket::new(2); // 2 rps, burst of 2

        let start = tokio::time::Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        // Bucket is empty; the third token needs ~500 ms of refill.
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(450));
    }
}

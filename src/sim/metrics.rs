// Process metrics: relaxed atomic counters and a fixed-bucket latency
// histogram, exported in Prometheus text format.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::sim::types::Scenario;

#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Cumulative histogram over the default latency buckets. The sum is kept in
/// microseconds so it fits an atomic counter.
pub struct Histogram {
    counts: [AtomicU64; LATENCY_BUCKETS.len()],
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            counts: Default::default(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }
}

impl Histogram {
    pub fn observe(&self, seconds: f64) {
        for (i, bound) in LATENCY_BUCKETS.iter().enumerate() {
            if seconds <= *bound {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn render(&self, name: &str, out: &mut String) {
        for (i, bound) in LATENCY_BUCKETS.iter().enumerate() {
            out.push_str(&format!(
                "{name}_bucket{{le=\"{bound}\"}} {}\n",
                self.counts[i].load(Ordering::Relaxed)
            ));
        }
        let count = self.count.load(Ordering::Relaxed);
        out.push_str(&format!("{name}_bucket{{le=\"+Inf\"}} {count}\n"));
        let sum = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        out.push_str(&format!("{name}_sum {sum}\n"));
        out.push_str(&format!("{name}_count {count}\n"));
    }
}

/// All counters for the simulator. Webhook delivery results share one metric
/// name with a `result` label.
#[derive(Default)]
pub struct SimMetrics {
    pub webhook_success: Counter,
    pub webhook_failure: Counter,
    pub webhook_dropped: Counter,
    pub webhook_abandoned: Counter,
    pub webhook_error: Counter,
    pub webhook_latency: Histogram,
    pub idempotency_hits: Counter,
    pub event_publish_failures: Counter,
    pub worker_panics: Counter,
    scenarios: [Counter; 4],
    http_requests: RwLock<HashMap<(String, u16), u64>>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scenario(&self, scenario: Scenario) -> &Counter {
        let idx = match scenario {
            Scenario::Approve => 0,
            Scenario::Fail => 1,
            Scenario::Delay => 2,
            Scenario::Random => 3,
        };
        &self.scenarios[idx]
    }

    pub fn record_http_request(&self, route: &str, status: u16) {
        let mut requests = self.http_requests.write().unwrap();
        *requests.entry((route.to_string(), status)).or_insert(0) += 1;
    }

    /// Prometheus text exposition for the `/metrics` endpoint.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP webhook_delivery_total Total number of webhook deliveries\n");
        out.push_str("# TYPE webhook_delivery_total counter\n");
        for (label, counter) in [
            ("success", &self.webhook_success),
            ("failure", &self.webhook_failure),
            ("dropped", &self.webhook_dropped),
            ("abandoned", &self.webhook_abandoned),
            ("error", &self.webhook_error),
        ] {
            out.push_str(&format!(
                "webhook_delivery_total{{result=\"{label}\"}} {}\n",
                counter.get()
            ));
        }

        out.push_str("\n# HELP webhook_latency_seconds Latency of webhook deliveries in seconds\n");
        out.push_str("# TYPE webhook_latency_seconds histogram\n");
        self.webhook_latency.render("webhook_latency_seconds", &mut out);

        out.push_str("\n# HELP idempotency_hits_total Total number of idempotency hits\n");
        out.push_str("# TYPE idempotency_hits_total counter\n");
        out.push_str(&format!(
            "idempotency_hits_total {}\n",
            self.idempotency_hits.get()
        ));

        out.push_str("\n# HELP scenario_counter_total Total number of payment scenarios executed\n");
        out.push_str("# TYPE scenario_counter_total counter\n");
        for scenario in [
            Scenario::Approve,
            Scenario::Fail,
            Scenario::Delay,
            Scenario::Random,
        ] {
            out.push_str(&format!(
                "scenario_counter_total{{scenario=\"{scenario}\"}} {}\n",
                self.scenario(scenario).get()
            ));
        }

        out.push_str("\n# HELP event_publish_failures_total Event bus publish failures\n");
        out.push_str("# TYPE event_publish_failures_total counter\n");
        out.push_str(&format!(
            "event_publish_failures_total {}\n",
            self.event_publish_failures.get()
        ));

        out.push_str("\n# HELP worker_panics_total Panics recovered inside delivery workers\n");
        out.push_str("# TYPE worker_panics_total counter\n");
        out.push_str(&format!("worker_panics_total {}\n", self.worker_panics.get()));

        out.push_str("\n# HELP http_requests_total Total number of HTTP requests\n");
        out.push_str("# TYPE http_requests_total counter\n");
        let requests = self.http_requests.read().unwrap();
        let mut entries: Vec<_> = requests.iter().collect();
        entries.sort();
        for ((route, status), count) in entries {
            out.push_str(&format!(
                "http_requests_total{{route=\"{route}\",status=\"{status}\"}} {count}\n"
            ));
        }

        out
    }
}

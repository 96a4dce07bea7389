use anyhow::bail;
use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_approve_delay_ms")]
    pub approve_delay_ms: u64,
    #[serde(default = "default_fail_delay_ms")]
    pub fail_delay_ms: u64,
    #[serde(default = "default_delay_delay_ms")]
    pub delay_delay_ms: u64,
    #[serde(default = "default_random_approve_rate")]
    pub random_approve_rate: f64,
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
    #[serde(default = "default_webhook_max_retries")]
    pub webhook_max_retries: u32,
    #[serde(default = "default_webhook_backoff_ms")]
    pub webhook_backoff_ms: u64,
    #[serde(default = "default_webhook_max_rps")]
    pub webhook_max_rps: u32,
    #[serde(default = "default_store_ttl", with = "humantime_serde")]
    pub store_ttl: Duration,
    #[serde(default = "default_store_sweep_interval", with = "humantime_serde")]
    pub store_sweep_interval: Duration,
    #[serde(default)]
    pub event_bus_name: String,
    #[serde(default = "default_event_source")]
    pub event_source: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            webhook_secret: String::new(),
            approve_delay_ms: default_approve_delay_ms(),
            fail_delay_ms: default_fail_delay_ms(),
            delay_delay_ms: default_delay_delay_ms(),
            random_approve_rate: default_random_approve_rate(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
            webhook_max_retries: default_webhook_max_retries(),
            webhook_backoff_ms: default_webhook_backoff_ms(),
            webhook_max_rps: default_webhook_max_rps(),
            store_ttl: default_store_ttl(),
            store_sweep_interval: default_store_sweep_interval(),
            event_bus_name: String::new(),
            event_source: default_event_source(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load from config.toml (if present) and environment variables.
    /// Environment variables override file values.
    /// Supported env keys: PORT, WEBHOOK_SECRET, DEFAULT_APPROVE_DELAY_MS,
    /// DEFAULT_FAIL_DELAY_MS, DEFAULT_DELAY_DELAY_MS, RANDOM_APPROVE_RATE,
    /// WEBHOOK_TIMEOUT_MS, WEBHOOK_MAX_RETRIES, WEBHOOK_BACKOFF_MS,
    /// WEBHOOK_MAX_RPS, STORE_TTL, STORE_SWEEP_INTERVAL, EVENT_BUS_NAME,
    /// EVENT_SOURCE, LOG_LEVEL
    pub fn load() -> Self {
        // 1) Start with defaults + config.toml only if it exists
        let base: Settings = Default::default();
        let mut fig = Figment::from(Serialized::defaults(base));
        if std::path::Path::new("config.toml").exists() {
            fig = fig.merge(Toml::file("config.toml"));
        }
        let mut cfg: Settings = fig.extract().unwrap_or_default();

        // 2) Overlay environment variables explicitly
        if let Ok(v) = std::env::var("PORT") {
            cfg.port = v.parse().unwrap_or(cfg.port);
        }
        if let Ok(v) = std::env::var("WEBHOOK_SECRET") {
            cfg.webhook_secret = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_APPROVE_DELAY_MS") {
            cfg.approve_delay_ms = v.parse().unwrap_or(cfg.approve_delay_ms);
        }
        if let Ok(v) = std::env::var("DEFAULT_FAIL_DELAY_MS") {
            cfg.fail_delay_ms = v.parse().unwrap_or(cfg.fail_delay_ms);
        }
        if let Ok(v) = std::env::var("DEFAULT_DELAY_DELAY_MS") {
            cfg.delay_delay_ms = v.parse().unwrap_or(cfg.delay_delay_ms);
        }
        if let Ok(v) = std::env::var("RANDOM_APPROVE_RATE") {
            cfg.random_approve_rate = v.parse().unwrap_or(cfg.random_approve_rate);
        }
        if let Ok(v) = std::env::var("WEBHOOK_TIMEOUT_MS") {
            cfg.webhook_timeout_ms = v.parse().unwrap_or(cfg.webhook_timeout_ms);
        }
        if let Ok(v) = std::env::var("WEBHOOK_MAX_RETRIES") {
            cfg.webhook_max_retries = v.parse().unwrap_or(cfg.webhook_max_retries);
        }
        if let Ok(v) = std::env::var("WEBHOOK_BACKOFF_MS") {
            cfg.webhook_backoff_ms = v.parse().unwrap_or(cfg.webhook_backoff_ms);
        }
        if let Ok(v) = std::env::var("WEBHOOK_MAX_RPS") {
            cfg.webhook_max_rps = v.parse().unwrap_or(cfg.webhook_max_rps);
        }
        if let Ok(v) = std::env::var("STORE_TTL") {
            cfg.store_ttl = parse_duration_env(&v, cfg.store_ttl);
        }
        if let Ok(v) = std::env::var("STORE_SWEEP_INTERVAL") {
            cfg.store_sweep_interval = parse_duration_env(&v, cfg.store_sweep_interval);
        }
        if let Ok(v) = std::env::var("EVENT_BUS_NAME") {
            cfg.event_bus_name = v;
        }
        if let Ok(v) = std::env::var("EVENT_SOURCE") {
            cfg.event_source = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            cfg.log_level = v;
        }

        cfg
    }

    pub fn from_env() -> Self {
        Self::load()
    }

    /// Startup validation; the HMAC secret has no workable default.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.webhook_secret.is_empty() {
            bail!("WEBHOOK_SECRET is required");
        }
        Ok(())
    }
}

fn parse_duration_env(value: &str, current: Duration) -> Duration {
    humantime::parse_duration(value).unwrap_or(current)
}

fn default_port() -> u16 {
    8080
}

fn default_approve_delay_ms() -> u64 {
    200
}

fn default_fail_delay_ms() -> u64 {
    100
}

fn default_delay_delay_ms() -> u64 {
    3000
}

fn default_random_approve_rate() -> f64 {
    0.8
}

fn default_webhook_timeout_ms() -> u64 {
    1000
}

fn default_webhook_max_retries() -> u32 {
    5
}

fn default_webhook_backoff_ms() -> u64 {
    1000
}

fn default_webhook_max_rps() -> u32 {
    500
}

fn default_store_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_store_sweep_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_event_source() -> String {
    "payment-sim-api".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Domain types for the payment simulator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use ulid::Ulid;

use crate::sim::errors::SimError;

/// Simulation scenario selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Approve,
    Fail,
    Delay,
    Random,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Approve => "approve",
            Scenario::Fail => "fail",
            Scenario::Delay => "delay",
            Scenario::Random => "random",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a payment intent. Transitions are one-way:
/// PENDING -> APPROVED or PENDING -> FAILED, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Pending,
    Approved,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "PENDING",
            IntentStatus::Approved => "APPROVED",
            IntentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound webhook type announced to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookType {
    #[serde(rename = "payment.approved")]
    Approved,
    #[serde(rename = "payment.failed")]
    Failed,
}

impl WebhookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookType::Approved => "payment.approved",
            WebhookType::Failed => "payment.failed",
        }
    }

    /// Parses the wire form; only the two delivered types are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment.approved" => Some(WebhookType::Approved),
            "payment.failed" => Some(WebhookType::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for WebhookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Metadata = HashMap<String, serde_json::Value>;

/// Request body for intent creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub reservation_id: String,
    #[serde(default)]
    pub user_id: String,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub scenario: Scenario,
    #[serde(default)]
    pub delay_ms: u64,
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl CreatePaymentIntentRequest {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.reservation_id.trim().is_empty() {
            return Err(SimError::Validation("reservation_id is required".into()));
        }
        if self.amount <= 0 {
            return Err(SimError::Validation("amount must be greater than 0".into()));
        }
        if self.webhook_url.trim().is_empty() {
            return Err(SimError::Validation("webhook_url is required".into()));
        }
        if reqwest::Url::parse(&self.webhook_url).is_err() {
            return Err(SimError::Validation(format!(
                "invalid webhook_url: {}",
                self.webhook_url
            )));
        }
        Ok(())
    }

    /// Number of metadata entries; feeds the idempotency fingerprint.
    pub fn metadata_cardinality(&self) -> usize {
        self.metadata.as_ref().map(HashMap::len).unwrap_or(0)
    }
}

/// A simulated charge tracked by the store.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    #[serde(rename = "payment_intent_id")]
    pub id: String,
    pub reservation_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub scenario: Scenario,
    #[serde(skip_serializing_if = "is_zero")]
    pub delay_ms: u64,
    pub webhook_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub status: IntentStatus,
    #[serde(skip_serializing)]
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub attempt_count: u32,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

impl PaymentIntent {
    /// Builds a fresh PENDING intent. The id is a `pay_`-prefixed ULID, so ids
    /// sort by creation time with a random suffix.
    pub fn new(
        req: &CreatePaymentIntentRequest,
        idempotency_key: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("pay_{}", Ulid::new()),
            reservation_id: req.reservation_id.clone(),
            user_id: req.user_id.clone(),
            amount: req.amount,
            currency: req.currency.clone(),
            scenario: req.scenario,
            delay_ms: req.delay_ms,
            webhook_url: req.webhook_url.clone(),
            metadata: req.metadata.clone(),
            status: IntentStatus::Pending,
            idempotency_key,
            created_at: now,
            updated_at: now,
            last_attempt_at: None,
            attempt_count: 0,
        }
    }

    /// Applies the terminal status of a scheduled delivery. Returns false
    /// without touching anything when the intent is already terminal.
    pub fn finalize_status(&mut self, status: IntentStatus, now: DateTime<Utc>) -> bool {
        if self.status != IntentStatus::Pending {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        self.last_attempt_at = Some(now);
        self.attempt_count += 1;
        true
    }

    pub fn webhook_payload(&self, kind: WebhookType, now: DateTime<Utc>) -> WebhookPayload {
        WebhookPayload {
            kind,
            reservation_id: self.reservation_id.clone(),
            payment_intent_id: self.id.clone(),
            amount: self.amount,
            timestamp: now.to_rfc3339(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn status_event(&self, now: DateTime<Utc>) -> PaymentEvent {
        PaymentEvent {
            payment_id: self.id.clone(),
            reservation_id: self.reservation_id.clone(),
            user_id: self.user_id.clone(),
            status: self.status,
            amount: self.amount,
            currency: self.currency.clone().unwrap_or_default(),
            timestamp: now.timestamp(),
            event_type: "payment.status_updated".to_string(),
        }
    }
}

/// Body of the outbound webhook POST. Field names are part of the wire
/// contract and must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub kind: WebhookType,
    pub reservation_id: String,
    pub payment_intent_id: String,
    pub amount: i64,
    #[serde(rename = "ts")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Status-change event mirrored to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub payment_id: String,
    pub reservation_id: String,
    pub user_id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
    pub timestamp: i64,
    pub event_type: String,
}

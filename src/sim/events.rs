// Event sink capability: mirrors intent status changes to an event bus.
//
// Delivery of the HTTP webhook never depends on the sink; publish failures
// are logged and counted, nothing more.

use anyhow::{bail, Result};
use async_trait::async_trait;
use aws_sdk_eventbridge::types::PutEventsRequestEntry;
use tracing::{debug, info};

use crate::sim::types::PaymentEvent;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: PaymentEvent) -> Result<()>;
}

/// Publishes to an AWS EventBridge bus.
pub struct EventBridgeSink {
    client: aws_sdk_eventbridge::Client,
    bus_name: String,
    source: String,
}

impl EventBridgeSink {
    /// Builds the client from the ambient AWS environment (credentials,
    /// region, optional custom endpoint for local stacks).
    pub async fn connect(bus_name: String, source: String) -> Result<Self> {
        let aws_cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        info!(bus_name = %bus_name, source = %source, "initialized EventBridge event sink");
        Ok(Self {
            client: aws_sdk_eventbridge::Client::new(&aws_cfg),
            bus_name,
            source,
        })
    }
}

#[async_trait]
impl EventSink for EventBridgeSink {
    async fn publish(&self, event: PaymentEvent) -> Result<()> {
        let detail = serde_json::to_string(&event)?;
        let entry = PutEventsRequestEntry::builder()
            .source(&self.source)
            .detail_type("Payment Status Updated")
            .detail(detail)
            .event_bus_name(&self.bus_name)
            .build();

        let out = self.client.put_events().entries(entry).send().await?;
        if out.failed_entry_count() > 0 {
            let reason = out
                .entries()
                .first()
                .and_then(|e| e.error_code())
                .unwrap_or("unknown");
            bail!("EventBridge rejected entry: {reason}");
        }

        debug!(
            payment_id = %event.payment_id,
            status = %event.status,
            "payment event published"
        );
        Ok(())
    }
}

/// Sink used when no event bus is configured; events are only logged.
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn publish(&self, event: PaymentEvent) -> Result<()> {
        debug!(
            payment_id = %event.payment_id,
            status = %event.status,
            "event bus not configured, dropping payment event"
        );
        Ok(())
    }
}

/// Test sink that records every published event.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<PaymentEvent>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl RecordingSink {
    pub fn events(&self) -> Vec<PaymentEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: PaymentEvent) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            bail!("sink unavailable");
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

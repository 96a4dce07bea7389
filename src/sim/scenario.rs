// Scenario planning: maps a scenario tag to the simulated outcome

use rand::Rng;
use std::time::Duration;

use crate::sim::types::{IntentStatus, Scenario, WebhookType};

/// Delay profile and approve rate, lifted out of the full settings so the
/// planner stays a pure function over plain values.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub approve_delay: Duration,
    pub fail_delay: Duration,
    pub delay_delay: Duration,
    pub random_approve_rate: f64,
}

/// What a scheduled delivery will do: the terminal status written to the
/// store, the delay before delivery, and the webhook type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioPlan {
    pub final_status: IntentStatus,
    pub delay: Duration,
    pub webhook_type: WebhookType,
}

pub fn plan(
    scenario: Scenario,
    delay_ms_override: u64,
    cfg: &ScenarioConfig,
    rng: &mut impl Rng,
) -> ScenarioPlan {
    match scenario {
        Scenario::Approve => approved(cfg.approve_delay),
        Scenario::Fail => failed(cfg.fail_delay),
        Scenario::Delay => {
            let delay = if delay_ms_override > 0 {
                Duration::from_millis(delay_ms_override)
            } else {
                cfg.delay_delay
            };
            approved(delay)
        }
        Scenario::Random => {
            if rng.gen::<f64>() < cfg.random_approve_rate {
                approved(cfg.approve_delay)
            } else {
                failed(cfg.fail_delay)
            }
        }
    }
}

fn approved(delay: Duration) -> ScenarioPlan {
    ScenarioPlan {
        final_status: IntentStatus::Approved,
        delay,
        webhook_type: WebhookType::Approved,
    }
}

fn failed(delay: Duration) -> ScenarioPlan {
    ScenarioPlan {
        final_status: IntentStatus::Failed,
        delay,
        webhook_type: WebhookType::Failed,
    }
}

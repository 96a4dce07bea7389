// Clock capability: current time plus one-shot scheduled tasks.
//
// Scheduled deliveries and retry backoffs are both expressed as
// `clock.after(delay, task)` so tests can substitute a virtual clock and fire
// timers on demand instead of sleeping.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::time::Duration;

#[cfg(test)]
use chrono::Duration as ChronoDuration;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Runs `task` once after `delay`. Fire-and-forget: pending tasks die with
    /// the process on shutdown.
    fn after(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// Production clock backed by the tokio timer wheel.
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn after(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

/// Manually advanced clock for tests. Tasks are queued with a virtual
/// deadline and fired, in deadline order, by `advance`.
#[cfg(test)]
pub struct VirtualClock {
    state: std::sync::Mutex<VirtualState>,
}

#[cfg(test)]
struct VirtualState {
    now: DateTime<Utc>,
    pending: Vec<(DateTime<Utc>, BoxFuture<'static, ()>)>,
}

#[cfg(test)]
impl VirtualClock {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(VirtualState {
                now: Utc::now(),
                pending: Vec::new(),
            }),
        }
    }

    /// Moves virtual time forward and runs every task whose deadline has
    /// passed, including tasks scheduled by tasks fired within this window.
    pub async fn advance(&self, delta: Duration) {
        {
            let mut state = self.state.lock().unwrap();
            state.now += ChronoDuration::from_std(delta).unwrap();
        }
        loop {
            let due = {
                let mut state = self.state.lock().unwrap();
                let now = state.now;
                let mut due: Vec<_> = Vec::new();
                let mut rest: Vec<_> = Vec::new();
                for entry in state.pending.drain(..) {
                    if entry.0 <= now {
                        due.push(entry);
                    } else {
                        rest.push(entry);
                    }
                }
                state.pending = rest;
                due.sort_by_key(|(deadline, _)| *deadline);
                due
            };
            if due.is_empty() {
                break;
            }
            for (_, task) in due {
                task.await;
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }
}

#[cfg(test)]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().now
    }

    fn after(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        let mut state = self.state.lock().unwrap();
        let deadline = state.now + ChronoDuration::from_std(delay).unwrap();
        state.pending.push((deadline, task));
    }
}

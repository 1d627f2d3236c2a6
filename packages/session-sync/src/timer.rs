//! Cancellable scheduled tasks
//!
//! Timers are owned values: dropping a [`ScheduledTask`] stops it, so a role
//! change or teardown that replaces or clears the owning field is enough to
//! guarantee nothing fires afterwards.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// A spawned timer task, cancelled on drop
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `tick` every `period`, first after one full period
    ///
    /// The task ends when `tick` returns `false` (usually because the
    /// receiving side went away) or when cancelled.
    pub fn every<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        if !tick() {
                            break;
                        }
                    }
                }
            }
        });
        Self { token, handle }
    }

    /// Run `fire` once after `delay`
    pub fn after<F>(delay: Duration, fire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = time::sleep(delay) => fire(),
            }
        });
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

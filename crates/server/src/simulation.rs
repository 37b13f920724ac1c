//! Periodic background work.
//!
//! Each [`PeriodicTask`] runs on its own tokio task, ticking at its own
//! interval until the stop token is cancelled.
//!
//! # Adding a new task
//!
//! 1. Implement [`PeriodicTask`] for your struct.
//! 2. Return it from `AppContext::periodic_tasks`.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Work run on a timer. Ticks are expected to be cheap; heavy work should be
/// spread over several ticks.
pub trait PeriodicTask: Send + Sync + 'static {
    /// Human-readable name, used for logging.
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    fn run(&self);
}

/// Spawn one tokio task per periodic task. The returned tracker is already
/// closed, so `wait()` resolves once every loop has seen `stop`.
pub fn start(tasks: Vec<Box<dyn PeriodicTask>>, stop: CancellationToken) -> TaskTracker {
    let tracker = TaskTracker::new();
    for task in tasks {
        let stop = stop.clone();
        tracker.spawn(async move {
            let name = task.name();
            let mut interval = tokio::time::interval(task.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so start-up loading can finish.
            interval.tick().await;

            tracing::info!("Periodic task '{}' started (interval {:?})", name, task.interval());

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => task.run(),
                }
            }
            tracing::debug!("Periodic task '{}' stopped", name);
        });
    }
    tracker.close();
    tracker
}

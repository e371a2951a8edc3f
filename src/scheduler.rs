//! Cancellable periodic task used for threshold re-publishing.
//!
//! `start` runs the tick once immediately and then every `period`; calling it
//! again replaces the running task. `stop` is idempotent. Dropping the handle
//! stops the task.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

// ---

#[derive(Debug, Default)]
pub struct RepublishTask {
    // ---
    handle: Option<JoinHandle<()>>,
    period: Option<Duration>,
}

impl RepublishTask {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the periodic task, aborting any previous one.
    pub fn start<F, Fut>(&mut self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // ---
        if let Some(previous) = self.handle.take() {
            debug!("Replacing running re-publish task");
            previous.abort();
        }

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });

        self.handle = Some(handle);
        self.period = Some(period);
        info!(period_secs = period.as_secs_f64(), "Threshold re-publish started");
    }

    /// Stop the task. Returns whether one was running.
    pub fn stop(&mut self) -> bool {
        // ---
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                self.period = None;
                info!("Threshold re-publish stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}

impl Drop for RepublishTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

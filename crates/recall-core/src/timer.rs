//! Fixed-interval background work on the tokio runtime.
//!
//! The tick closure does synchronous filesystem work, so it runs on the
//! blocking pool. A task never keeps the runtime alive: dropping the handle
//! signals the loop and aborts it.

use crate::{RecallError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to a running periodic task. Dropping stops the task.
pub struct PeriodicTask {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `tick` every `interval`, starting one interval from now.
    ///
    /// `tick` returns `false` to end the loop on its own. Requires a tokio
    /// runtime on the calling thread.
    pub fn spawn<F>(name: &'static str, interval: Duration, tick: F) -> Result<Self>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| RecallError::Config {
            message: format!("{} timer requires a tokio runtime: {}", name, e),
        })?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let tick = Arc::new(tick);

        let task_handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let tick = tick.clone();
                        match tokio::task::spawn_blocking(move || tick()).await {
                            Ok(true) => {}
                            Ok(false) => {
                                debug!("{} timer finished", name);
                                break;
                            }
                            Err(e) => warn!("{} tick failed: {}", name, e),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("{} timer stopped", name);
                            break;
                        }
                    }
                }
            }
        });

        debug!("Started {} timer ({:?})", name, interval);
        Ok(Self {
            name,
            shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    /// Whether the loop is still scheduled.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
            debug!("Stopping {} timer", self.name);
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

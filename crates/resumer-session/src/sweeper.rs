use crate::registry::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Background task that periodically sweeps the registry.
pub struct RetentionSweeper {
    registry: Arc<SessionRegistry>,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let interval = registry.config().sweep_interval();
        Self { registry, interval }
    }

    /// Starts the sweep loop on the current runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = timer.tick() => {
                        let report = self.registry.sweep(Instant::now());
                        if report.abandoned > 0 || report.evicted > 0 {
                            info!(
                                abandoned = report.abandoned,
                                evicted = report.evicted,
                                remaining = self.registry.session_count(),
                                "Retention sweep"
                            );
                        }
                    }
                }
            }
            debug!("Retention sweeper stopped");
        });
        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// Owner of a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.task).await;
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some() {
            self.task.abort();
        }
    }
}

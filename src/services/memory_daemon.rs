//! Expired-entry cleanup daemon for the shared memory store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::domain::ports::SharedMemoryStore;

/// Configuration for the cleanup daemon.
#[derive(Debug, Clone)]
pub struct CleanupDaemonConfig {
    /// Interval between cleanup sweeps.
    pub sweep_interval: Duration,
    /// Consecutive failures tolerated before the daemon stops.
    pub max_consecutive_failures: u32,
}

impl Default for CleanupDaemonConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            max_consecutive_failures: 5,
        }
    }
}

/// Spawn the cleanup loop. Flip the returned sender to stop it.
pub fn spawn_cleanup_daemon(
    store: Arc<dyn SharedMemoryStore>,
    config: CleanupDaemonConfig,
) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = interval(config.sweep_interval);
        let mut consecutive_failures = 0u32;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.cleanup_expired().await {
                        Ok(removed) => {
                            consecutive_failures = 0;
                            if removed > 0 {
                                debug!(removed, "cleaned up expired memory entries");
                            }
                        }
                        Err(err) => {
                            consecutive_failures += 1;
                            warn!(error = %err, consecutive_failures, "memory cleanup sweep failed");
                            if consecutive_failures >= config.max_consecutive_failures {
                                warn!("cleanup daemon stopping after repeated failures");
                                return;
                            }
                        }
                    }
                }
                _ = async { shutdown_rx.wait_for(|&s| s).await.map(|r| *r) } => return,
            }
        }
    });
    (shutdown_tx, handle)
}

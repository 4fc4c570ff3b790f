//! Background auto-sync: one periodic reconcile loop per opted-in vault.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::VaultSyncConfig;
use crate::engine::SyncEngine;

pub struct AutoSync {
    engine: Arc<SyncEngine>,
    vaults: Vec<PathBuf>,
}

impl AutoSync {
    pub fn new(engine: Arc<SyncEngine>, vaults: Vec<PathBuf>) -> Self {
        Self { engine, vaults }
    }

    /// Run until `shutdown` fires. Vaults without `enabled` and `autoSync` in
    /// their sidecar are skipped. Returns the number of vaults that were watched.
    ///
    /// A sync in flight when shutdown arrives is allowed to finish.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> usize {
        let mut handles = Vec::new();

        for path in self.vaults {
            let cfg = match VaultSyncConfig::load(&path) {
                Ok(Some(cfg)) if cfg.enabled && cfg.auto_sync => cfg,
                Ok(_) => {
                    debug!(vault = %path.display(), "auto-sync off, not watching");
                    continue;
                }
                Err(e) => {
                    warn!(vault = %path.display(), "skipping vault with unreadable sync config: {e}");
                    continue;
                }
            };

            let period = Duration::from_secs(cfg.sync_interval.max(1));
            let engine = self.engine.clone();
            let mut shutdown_rx = shutdown.subscribe();
            info!(vault = %path.display(), interval_secs = period.as_secs(), "auto-sync watching");

            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break,
                        _ = ticker.tick() => match engine.sync_vault(&path).await {
                            Ok(result) if result.success => {
                                debug!(vault = %path.display(), action = %result.action, "auto-sync tick");
                            }
                            Ok(result) => warn!(
                                vault = %path.display(),
                                error = result.error.as_deref().unwrap_or("unknown"),
                                "auto-sync failed; retrying next interval"
                            ),
                            Err(conflict) => warn!(
                                vault = %path.display(),
                                "auto-sync needs manual conflict resolution: {conflict}"
                            ),
                        },
                    }
                }
                debug!(vault = %path.display(), "auto-sync stopped");
            }));
        }

        let watched = handles.len();
        for handle in handles {
            let _ = handle.await;
        }
        watched
    }
}

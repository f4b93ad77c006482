//! Best-effort startup preloading.
//!
//! Tables are resolved one after another in a spawned task. The whole run
//! is bounded by a deadline; on expiry, or when the caller cancels, the
//! task stops between tables and whatever is left is resolved lazily later.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{Resolution, SourceResolver};

/// Outcome of a preload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Tables now in the resolved cache.
    pub loaded: Vec<String>,
    /// Tables that were not found or failed to resolve.
    pub failed: Vec<String>,
    /// Tables not attempted before the deadline or cancellation.
    pub remaining: Vec<String>,
    pub timed_out: bool,
}

/// A running preload.
pub struct PreloadHandle {
    cancel: CancellationToken,
    handle: JoinHandle<PreloadReport>,
    tables: Vec<String>,
}

impl PreloadHandle {
    /// Ask the preload to stop after the table in flight.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the preload to finish.
    pub async fn wait(self) -> PreloadReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("preload task failed: {}", e);
                PreloadReport {
                    remaining: self.tables,
                    ..Default::default()
                }
            }
        }
    }
}

impl SourceResolver {
    /// Start preloading `tables` in the background.
    pub fn spawn_preload(self: &Arc<Self>, tables: Vec<String>, timeout: Duration) -> PreloadHandle {
        let cancel = CancellationToken::new();
        let resolver = Arc::clone(self);
        let token = cancel.clone();
        let requested = tables.clone();

        let handle = tokio::spawn(async move { resolver.run_preload(tables, timeout, token).await });

        PreloadHandle {
            cancel,
            handle,
            tables: requested,
        }
    }

    /// Preload `tables` and wait for the outcome.
    pub async fn preload(self: &Arc<Self>, tables: Vec<String>, timeout: Duration) -> PreloadReport {
        self.spawn_preload(tables, timeout).wait().await
    }

    async fn run_preload(
        &self,
        tables: Vec<String>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> PreloadReport {
        let mut loaded = Vec::new();
        let mut failed = Vec::new();

        let work = async {
            for table in &tables {
                let outcome = tokio::select! { biased;
                    _ = cancel.cancelled() => break,
                    outcome = self.resolve(table) => outcome,
                };
                match outcome {
                    Ok(Resolution::Found(_)) => loaded.push(table.clone()),
                    Ok(Resolution::NotFound) => {
                        tracing::warn!("preload: table '{}' not found", table);
                        failed.push(table.clone());
                    }
                    Err(e) => {
                        tracing::warn!("preload: table '{}' failed: {}", table, e);
                        failed.push(table.clone());
                    }
                }
            }
        };

        let timed_out = tokio::time::timeout(timeout, work).await.is_err();
        if timed_out {
            cancel.cancel();
        }

        let remaining: Vec<String> = tables
            .iter()
            .filter(|t| !loaded.contains(*t) && !failed.contains(*t))
            .cloned()
            .collect();

        if timed_out {
            tracing::warn!(
                "preload timed out after {:?}, left to lazy resolution: {}",
                timeout,
                remaining.join(", ")
            );
        }
        tracing::info!(
            "preload finished: {} loaded, {} failed, {} remaining",
            loaded.len(),
            failed.len(),
            remaining.len()
        );

        PreloadReport {
            loaded,
            failed,
            remaining,
            timed_out,
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::autodownload::{AutoDownloadPolicy, PolicyContext};
use crate::cleanup::CleanupPolicy;
use crate::config::PolicyConfig;
use crate::device::DeviceState;
use crate::dispatch::DownloadRequester;
use crate::events::{PolicyEvent, SharedEventReporter};
use crate::storage::{StorageReader, StorageWriter};

/// What caused a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Periodic alarm
    Scheduled,
    /// The user refreshed feeds
    ManualRefresh,
    /// A download finished, freeing a download slot
    DownloadCompleted,
    /// Only shrink the episode cache back to its limit
    Cleanup,
}

/// Shared collaborators of the worker
#[derive(Clone)]
pub struct PolicyServices {
    pub reader: Arc<dyn StorageReader>,
    pub writer: Arc<dyn StorageWriter>,
    pub requester: Arc<dyn DownloadRequester>,
    pub device: Arc<dyn DeviceState>,
    pub reporter: SharedEventReporter,
}

impl PolicyServices {
    fn context(&self) -> PolicyContext<'_> {
        PolicyContext {
            reader: &*self.reader,
            writer: &*self.writer,
            requester: &*self.requester,
            device: &*self.device,
            reporter: &*self.reporter,
        }
    }
}

/// Sends triggers to a running worker
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    tx: mpsc::UnboundedSender<Trigger>,
}

impl PolicyHandle {
    /// Queue an evaluation without waiting for it.
    ///
    /// Returns false when the worker has stopped.
    pub fn trigger(&self, trigger: Trigger) -> bool {
        self.tx.send(trigger).is_ok()
    }
}

/// Background worker evaluating the policies one trigger at a time
pub struct PolicyWorker;

impl PolicyWorker {
    /// Start the worker on the current tokio runtime.
    ///
    /// Evaluations never overlap: triggers are processed in arrival order on a
    /// single task. The worker ends once every handle has been dropped.
    pub fn spawn(services: PolicyServices, config: PolicyConfig) -> (PolicyHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(rx, services, config));
        (PolicyHandle { tx }, handle)
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Trigger>,
    services: PolicyServices,
    config: PolicyConfig,
) {
    tracing::info!("starting policy worker");

    let auto_download = AutoDownloadPolicy::new(&config);
    let cleanup = CleanupPolicy::new(config.days_after_playback);
    let mut rng = StdRng::from_os_rng();

    while let Some(trigger) = rx.recv().await {
        tracing::debug!(?trigger, "policy evaluation triggered");
        let now = Utc::now();

        match trigger {
            Trigger::Cleanup => {
                match cleanup
                    .default_cleanup(&*services.reader, &*services.writer, config.cache_size, now)
                    .await
                {
                    Ok(outcome) => services.reporter.report(PolicyEvent::CleanupCompleted {
                        requested: outcome.requested,
                        deleted: outcome.deleted,
                        failed: outcome.failures.len(),
                    }),
                    Err(e) => tracing::error!(error = %e, "cleanup failed"),
                }
            }
            Trigger::Scheduled | Trigger::ManualRefresh | Trigger::DownloadCompleted => {
                match auto_download.run(&services.context(), now, &mut rng).await {
                    Ok(outcome) => tracing::debug!(
                        requested = outcome.requested.len(),
                        courtesy = ?outcome.courtesy,
                        "auto-download pass finished"
                    ),
                    Err(e) => tracing::error!(error = %e, "auto-download pass failed"),
                }
            }
        }
    }

    tracing::info!("policy worker stopped");
}

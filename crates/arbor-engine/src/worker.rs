//! In-process privilege refresh queue.

use std::collections::BTreeSet;

use arbor_core::error::{ArborError, ArborResult};
use arbor_core::repository::Store;
use arbor_core::task::{PrivilegeRefreshTask, TaskSink};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::privilege::{PrivilegeResolver, SyncOutcome};

/// Bounded channel sender used as the engine's [`TaskSink`].
#[derive(Debug, Clone)]
pub struct ChannelTaskSink {
    tx: mpsc::Sender<PrivilegeRefreshTask>,
}

impl ChannelTaskSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PrivilegeRefreshTask>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TaskSink for ChannelTaskSink {
    fn enqueue(&self, task: PrivilegeRefreshTask) -> ArborResult<()> {
        self.tx.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => {
                ArborError::Internal(format!("refresh queue full, dropped {}", task.name()))
            }
            TrySendError::Closed(task) => {
                ArborError::Internal(format!("refresh queue closed, dropped {}", task.name()))
            }
        })
    }
}

/// Counts of one processed task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drains refresh tasks and resyncs every affected profile on its own,
/// so a failing profile never blocks the rest.
pub struct PrivilegeRefreshWorker<S: Store> {
    resolver: PrivilegeResolver<S>,
    rx: mpsc::Receiver<PrivilegeRefreshTask>,
}

impl<S: Store> PrivilegeRefreshWorker<S> {
    pub fn new(resolver: PrivilegeResolver<S>, rx: mpsc::Receiver<PrivilegeRefreshTask>) -> Self {
        Self { resolver, rx }
    }

    /// Run until every sender is dropped.
    pub async fn run(mut self) {
        info!("Privilege refresh worker started");
        while let Some(task) = self.rx.recv().await {
            let name = task.name();
            match process(&self.resolver, &task).await {
                Ok(report) => debug!(
                    task = name,
                    synced = report.synced,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Refresh task processed"
                ),
                Err(e) => warn!(task = name, error = %e, "Refresh task failed"),
            }
        }
        info!("Privilege refresh worker stopped");
    }
}

/// Resync every profile `task` covers.
pub async fn process<S: Store>(
    resolver: &PrivilegeResolver<S>,
    task: &PrivilegeRefreshTask,
) -> ArborResult<RefreshReport> {
    let profiles: BTreeSet<Uuid> = match task {
        PrivilegeRefreshTask::Groups { group_ids, deleted } => {
            resolver.affected_profiles(group_ids, *deleted).await?
        }
        PrivilegeRefreshTask::Profiles { profile_ids } => profile_ids.iter().copied().collect(),
    };

    let mut report = RefreshReport::default();
    let mut pass = resolver.begin_pass();
    for profile in profiles {
        match resolver.sync_with(&mut pass, profile).await {
            Ok(SyncOutcome::Synced(_)) => report.synced += 1,
            Ok(SyncOutcome::NoAccount) => report.skipped += 1,
            Err(e) => {
                warn!(profile = %profile, error = %e, "Privilege sync failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

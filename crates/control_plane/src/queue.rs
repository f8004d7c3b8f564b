//! Per-host work queue.
//!
//! Delivery is pull based and at-least-once: pulling does not change an
//! item's status, so a host that crashes before acknowledging sees the
//! same `Waiting` item again. Status only ever moves forward.

use crate::error::QueueError;
use crate::repository::{WorkRepository, WorkTransition};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use weaver_types::{HostId, TargetType, WeaverWork, WorkId, WorkPayload, WorkStatus};

/// What a status report did to the stored item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    Applied,
    /// Accepted but without effect: the item is terminal or the report
    /// would move it backwards
    Ignored { current: WorkStatus },
}

/// Per-host FIFO of work items the agents collect on check-in.
///
/// Items are stored as `Waiting`, handed out oldest first in batches no
/// larger than `batch_size`, and then moved forward by the status reports
/// hosts send back. A report that would move an item backwards, or touch
/// one that already finished, is accepted and ignored.
///
/// # Example
///
/// ```rust,no_run
/// use control_plane::memory::MemoryStore;
/// use control_plane::queue::WorkQueue;
/// use std::sync::Arc;
/// use weaver_types::{HostId, TargetType, WorkStatus};
///
/// # async fn demo() -> Result<(), control_plane::error::QueueError> {
/// let queue = WorkQueue::new(Arc::new(MemoryStore::new()), 10);
/// let host = HostId::new();
/// let id = queue.enqueue(host, TargetType::Start, Vec::new()).await?;
///
/// let batch = queue.pull_pending(host, 5).await?;
/// assert_eq!(batch[0].id, id);
/// queue.report_status(id, WorkStatus::Completed, None).await?;
/// # Ok(())
/// # }
/// ```
pub struct WorkQueue {
    repository: Arc<dyn WorkRepository>,
    batch_size: usize,
}

impl WorkQueue {
    pub fn new(repository: Arc<dyn WorkRepository>, batch_size: usize) -> Self {
        Self {
            repository,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    pub async fn enqueue(
        &self,
        host_id: HostId,
        target_type: TargetType,
        payload: Vec<u8>,
    ) -> Result<WorkId, QueueError> {
        let work = self
            .repository
            .insert_work(host_id, target_type, payload)
            .await?;
        info!("📥 Queued {} work {} for host {}", target_type, work.id, host_id);
        Ok(work.id)
    }

    pub async fn enqueue_payload(
        &self,
        host_id: HostId,
        payload: &WorkPayload,
    ) -> Result<WorkId, QueueError> {
        let (target_type, bytes) = payload.encode()?;
        self.enqueue(host_id, target_type, bytes).await
    }

    /// Oldest `Waiting` items of a host, capped by the configured batch size.
    ///
    /// # Arguments
    ///
    /// * `host_id` - the host checking in
    /// * `max_items` - how many items the host asked for; zero returns nothing
    ///
    /// # Returns
    ///
    /// At most `min(max_items, batch_size)` items in creation order. They
    /// stay `Waiting` until the host reports on them.
    pub async fn pull_pending(
        &self,
        host_id: HostId,
        max_items: usize,
    ) -> Result<Vec<WeaverWork>, QueueError> {
        let limit = max_items.min(self.batch_size);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let work = self.repository.waiting_for_host(host_id, limit).await?;
        if !work.is_empty() {
            debug!("Handing {} work items to host {}", work.len(), host_id);
        }
        Ok(work)
    }

    pub async fn get(&self, work_id: WorkId) -> Result<Option<WeaverWork>, QueueError> {
        Ok(self.repository.get_work(work_id).await?)
    }

    #[instrument(skip(self, message))]
    pub async fn report_status(
        &self,
        work_id: WorkId,
        status: WorkStatus,
        message: Option<String>,
    ) -> Result<StatusOutcome, QueueError> {
        let transition = self
            .repository
            .transition_work(work_id, status, message, Utc::now())
            .await?
            .ok_or(QueueError::NotFound(work_id))?;

        match transition {
            WorkTransition::Applied => {
                debug!("Work {} is now {}", work_id, status);
                Ok(StatusOutcome::Applied)
            }
            WorkTransition::Rejected { current } => {
                warn!(
                    "Ignoring {} report for work {} which is already {}",
                    status, work_id, current
                );
                Ok(StatusOutcome::Ignored { current })
            }
        }
    }

    pub async fn list_for_host(&self, host_id: HostId) -> Result<Vec<WeaverWork>, QueueError> {
        Ok(self
            .repository
            .list_work(&move |w: &WeaverWork| w.host_id == host_id)
            .await?)
    }

    /// Removes every terminal item
    pub async fn purge_completed(&self) -> Result<usize, QueueError> {
        Ok(self
            .repository
            .remove_work(&|w: &WeaverWork| w.status.is_terminal())
            .await?)
    }

    /// Removes terminal items last updated before `cutoff`
    pub async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, QueueError> {
        Ok(self
            .repository
            .remove_work(&move |w: &WeaverWork| w.status.is_terminal() && w.updated_at < cutoff)
            .await?)
    }

    /// Removes everything queued for a decommissioned host
    pub async fn purge_host(&self, host_id: HostId) -> Result<usize, QueueError> {
        let removed = self
            .repository
            .remove_work(&move |w: &WeaverWork| w.host_id == host_id)
            .await?;
        info!("🗑️ Dropped {} work items of host {}", removed, host_id);
        Ok(removed)
    }

    /// Items that have been `InProgress` since before `now - older_than`
    pub async fn stale_in_progress(
        &self,
        older_than: chrono::Duration,
    ) -> Result<Vec<WeaverWork>, QueueError> {
        let cutoff = Utc::now() - older_than;
        Ok(self
            .repository
            .list_work(&move |w: &WeaverWork| {
                w.status == WorkStatus::InProgress && w.updated_at < cutoff
            })
            .await?)
    }
}

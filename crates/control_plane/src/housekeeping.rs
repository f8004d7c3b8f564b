//! Periodic maintenance: purge finished work, flag stuck work, age out
//! silent hosts and drop expired tokens.

use crate::queue::WorkQueue;
use crate::registration::HostAuthService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct HousekeepingSettings {
    pub interval: Duration,
    pub work_retention: Duration,
    pub stale_work_alert: Duration,
    pub host_stale_after: Duration,
}

/// What one pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub purged_work: usize,
    pub stale_work: usize,
    pub stale_hosts: usize,
    pub expired_tokens: usize,
}

fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36500))
}

pub struct Housekeeper {
    queue: Arc<WorkQueue>,
    auth: Arc<HostAuthService>,
    settings: HousekeepingSettings,
}

impl Housekeeper {
    pub fn new(
        queue: Arc<WorkQueue>,
        auth: Arc<HostAuthService>,
        settings: HousekeepingSettings,
    ) -> Self {
        Self {
            queue,
            auth,
            settings,
        }
    }

    /// Runs a single maintenance pass; each step is independent and a
    /// failing step is logged without skipping the others
    pub async fn run_once(&self) -> HousekeepingReport {
        let mut report = HousekeepingReport::default();
        let now = Utc::now();

        match self
            .queue
            .purge_older_than(now - chrono_duration(self.settings.work_retention))
            .await
        {
            Ok(purged) => report.purged_work = purged,
            Err(e) => error!("Failed to purge finished work: {}", e),
        }

        match self
            .queue
            .stale_in_progress(chrono_duration(self.settings.stale_work_alert))
            .await
        {
            Ok(stale) => {
                for work in &stale {
                    warn!(
                        "⚠️ Work {} ({}) on host {} has been in progress since {}",
                        work.id, work.target_type, work.host_id, work.updated_at
                    );
                }
                report.stale_work = stale.len();
            }
            Err(e) => error!("Failed to scan for stuck work: {}", e),
        }

        match self
            .auth
            .mark_stale_hosts(now - chrono_duration(self.settings.host_stale_after))
            .await
        {
            Ok(count) => report.stale_hosts = count,
            Err(e) => error!("Failed to age out silent hosts: {}", e),
        }

        match self.auth.purge_expired_tokens().await {
            Ok(count) => report.expired_tokens = count,
            Err(e) => error!("Failed to purge expired tokens: {}", e),
        }

        if report != HousekeepingReport::default() {
            info!("🧹 Housekeeping: {:?}", report);
        } else {
            debug!("Housekeeping found nothing to do");
        }
        report
    }

    /// Runs passes every interval until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Housekeeping stopped");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use weaver_types::{AccountId, HostId, TargetType, WorkStatus};

    #[tokio::test]
    async fn test_run_once_purges_and_flags() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(WorkQueue::new(store.clone(), 10));
        let auth = Arc::new(HostAuthService::new(
            store.clone(),
            "http://localhost",
            chrono::Duration::seconds(-1),
        ));

        let host = HostId::new();
        let done = queue.enqueue(host, TargetType::Start, Vec::new()).await.unwrap();
        let running = queue.enqueue(host, TargetType::Install, Vec::new()).await.unwrap();
        queue.report_status(done, WorkStatus::Completed, None).await.unwrap();
        queue.report_status(running, WorkStatus::InProgress, None).await.unwrap();

        auth.request_registration(AccountId::new(), "box").await.unwrap();

        let housekeeper = Housekeeper::new(
            queue.clone(),
            auth,
            HousekeepingSettings {
                interval: Duration::from_secs(60),
                work_retention: Duration::ZERO,
                stale_work_alert: Duration::ZERO,
                host_stale_after: Duration::ZERO,
            },
        );

        // Items updated in the same instant as the cutoff are not yet older
        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = housekeeper.run_once().await;
        assert_eq!(report.purged_work, 1);
        assert_eq!(report.stale_work, 1);
        assert!(queue.get(done).await.unwrap().is_none());
        assert!(queue.get(running).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let housekeeper = Housekeeper::new(
            Arc::new(WorkQueue::new(store.clone(), 10)),
            Arc::new(HostAuthService::new(
                store,
                "http://localhost",
                chrono::Duration::minutes(5),
            )),
            HousekeepingSettings {
                interval: Duration::from_millis(10),
                work_retention: Duration::from_secs(60),
                stale_work_alert: Duration::from_secs(60),
                host_stale_after: Duration::from_secs(60),
            },
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(housekeeper.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! One poll cycle: heartbeat, pull a batch, run it, report every item.

use crate::error::{AuthError, WorkFailure};
use crate::handlers::Handlers;
use crate::session::HostSession;
use crate::state::StateDetector;
use crate::telemetry::LatestUsage;
use dashmap::DashMap;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};
use weaver_types::wire::{CheckInRequest, ServerStateReport, WorkStatusUpdate};
use weaver_types::{ServerId, WeaverWork, WorkPayload, WorkStatus};

/// Servers this agent has handled, so check-ins can report their state
#[derive(Debug, Default, Clone)]
pub struct KnownServers {
    servers: Arc<DashMap<ServerId, KnownServer>>,
}

#[derive(Debug, Clone)]
struct KnownServer {
    install_dir: PathBuf,
    ports: Vec<u16>,
}

impl KnownServers {
    /// Remembers (or refreshes) the server a payload is about
    pub fn observe(&self, payload: &WorkPayload) {
        if let Some(spec) = payload.server() {
            self.servers.insert(
                spec.server_id,
                KnownServer {
                    install_dir: spec.install_dir.clone(),
                    ports: spec.ports.clone(),
                },
            );
        }
    }

    pub fn forget(&self, server_id: ServerId) {
        self.servers.remove(&server_id);
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub async fn detect_all(&self, detector: &StateDetector) -> Vec<ServerStateReport> {
        let snapshot: Vec<(ServerId, KnownServer)> = self
            .servers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut reports = Vec::with_capacity(snapshot.len());
        for (server_id, server) in snapshot {
            reports.push(ServerStateReport {
                server_id,
                state: detector.detect(&server.install_dir, &server.ports).await,
            });
        }
        reports
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Upper bound requested from the control plane per check-in
    pub max_batch_size: usize,
    /// Items of one batch allowed to run at the same time
    pub max_simultaneous: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_simultaneous: 1,
        }
    }
}

/// What one cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub received: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    session: Arc<HostSession>,
    handlers: Arc<Handlers>,
    detector: StateDetector,
    usage: LatestUsage,
    known: KnownServers,
    settings: DispatchSettings,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        session: Arc<HostSession>,
        handlers: Arc<Handlers>,
        detector: StateDetector,
        usage: LatestUsage,
        settings: DispatchSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_simultaneous.max(1)));
        Self {
            session,
            handlers,
            detector,
            usage,
            known: KnownServers::default(),
            settings,
            permits,
        }
    }

    pub fn known_servers(&self) -> &KnownServers {
        &self.known
    }

    /// Checks in and runs whatever work came back.
    ///
    /// The check-in carries the latest usage sample, the detected state of
    /// every known server and the batch size this host accepts. Returned
    /// items run concurrently, bounded by `max_simultaneous`, and each one
    /// reports `InProgress` and then `Completed` or `Failed`.
    ///
    /// # Returns
    ///
    /// A [`CycleReport`] once every item has finished. Only authentication
    /// and check-in failures are errors; a failed item is counted in the
    /// report instead.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<CycleReport, AuthError> {
        let request = CheckInRequest {
            usage: self.usage.read().await.clone(),
            servers: self.known.detect_all(&self.detector).await,
            max_items: Some(self.settings.max_batch_size),
        };
        let response = self.session.check_in(&request).await?;

        let mut report = CycleReport {
            received: response.work.len(),
            ..CycleReport::default()
        };
        if response.work.is_empty() {
            return Ok(report);
        }
        info!("📥 Received {} work items", response.work.len());

        let outcomes = join_all(response.work.into_iter().map(|work| self.run_bounded(work))).await;
        for succeeded in outcomes {
            if succeeded {
                report.completed += 1;
            } else {
                report.failed += 1;
            }
        }
        Ok(report)
    }

    async fn run_bounded(&self, work: WeaverWork) -> bool {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return false,
        };
        self.run_item(work).await
    }

    /// Runs one item end to end; returns whether it completed
    async fn run_item(&self, work: WeaverWork) -> bool {
        self.report(&work, WorkStatus::InProgress, None).await;

        let result = match work.decode() {
            Ok(item) => {
                self.known.observe(&item.payload);
                debug!("Running {} work {}", work.target_type, work.id);
                let result = self.handlers.handle(&item.payload).await;
                if let (Ok(()), WorkPayload::Uninstall(spec)) = (&result, &item.payload) {
                    self.known.forget(spec.server_id);
                }
                result
            }
            Err(e) => Err(WorkFailure::single(e.to_string())),
        };

        match result {
            Ok(()) => {
                info!("✅ Work {} ({}) completed", work.id, work.target_type);
                self.report(&work, WorkStatus::Completed, None).await;
                true
            }
            Err(failure) => {
                warn!("❌ Work {} ({}) failed: {}", work.id, work.target_type, failure);
                self.report(&work, WorkStatus::Failed, Some(failure.to_string()))
                    .await;
                false
            }
        }
    }

    async fn report(&self, work: &WeaverWork, status: WorkStatus, message: Option<String>) {
        let update = WorkStatusUpdate {
            work_id: work.id,
            status,
            message,
        };
        if let Err(e) = self.session.report_status(&update).await {
            error!("Could not report {} for work {}: {}", status, work.id, e);
        }
    }
}

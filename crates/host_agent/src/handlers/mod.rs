//! Work handlers, one per payload variant.
//!
//! Handlers never panic on bad input: every problem becomes a message in a
//! [`WorkFailure`], which the dispatcher reports as the item's status text.

mod configure;
mod install;
mod lifecycle;

pub use configure::configure;
pub use lifecycle::{start, uninstall_files};

use crate::backup::BackupManager;
use crate::error::WorkFailure;
use crate::installer::InstallerDriver;
use crate::process::ProcessTable;
use crate::session::{ArtifactSource, ServerRecords};
use std::sync::Arc;
use tracing::info;
use weaver_types::{ServerSpec, WorkPayload};

/// Everything a handler may touch on the host
pub struct Handlers {
    pub installer: Arc<InstallerDriver>,
    pub artifacts: Arc<dyn ArtifactSource>,
    pub records: Arc<dyn ServerRecords>,
    pub processes: Arc<dyn ProcessTable>,
    pub backups: BackupManager,
}

impl Handlers {
    pub async fn handle(&self, payload: &WorkPayload) -> Result<(), WorkFailure> {
        match payload {
            WorkPayload::Install(job) | WorkPayload::Update(job) => {
                install::install(self, &job.server, job.validate).await
            }
            WorkPayload::Start(spec) => start(spec),
            WorkPayload::Stop(spec) => self.stop(spec).await,
            WorkPayload::Restart(spec) => {
                self.stop(spec).await?;
                start(spec)
            }
            WorkPayload::Uninstall(spec) => self.uninstall(spec).await,
            WorkPayload::Backup(spec) => self.backup(spec).await,
            WorkPayload::Configure(spec) => configure(spec).await,
            WorkPayload::InstallerMaintenance => self
                .installer
                .self_update()
                .await
                .map_err(|e| WorkFailure::single(e.to_string())),
        }
    }

    /// Terminates every process under the install directory; none is fine
    pub async fn stop(&self, spec: &ServerSpec) -> Result<(), WorkFailure> {
        let killed = self
            .processes
            .terminate_under(&spec.install_dir)
            .await
            .map_err(|e| WorkFailure::single(e.to_string()))?;
        info!("Stopped server {} ({} processes)", spec.server_id, killed);
        Ok(())
    }

    async fn uninstall(&self, spec: &ServerSpec) -> Result<(), WorkFailure> {
        self.stop(spec).await?;
        uninstall_files(&spec.install_dir).await?;
        self.records
            .delete_server(spec.server_id)
            .await
            .map_err(|e| WorkFailure::single(format!("Files removed but record deletion failed: {}", e)))?;
        info!("🗑️ Server {} uninstalled", spec.server_id);
        Ok(())
    }

    async fn backup(&self, spec: &ServerSpec) -> Result<(), WorkFailure> {
        let report = self.backups.backup(spec).await;
        if report.failures.is_empty() {
            Ok(())
        } else {
            Err(WorkFailure(report.failures))
        }
    }
}

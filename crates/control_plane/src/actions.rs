//! Operator actions on game servers, turned into queued work.

use crate::error::ActionError;
use crate::profiles::ProfileService;
use crate::queue::WorkQueue;
use crate::repository::{CatalogRepository, HostRepository};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use weaver_types::wire::{ManualDownload, ServerStateReport};
use weaver_types::{
    GameId, HostId, InstallJob, ResourceSpec, ServerId, ServerSpec, TargetType, WorkId,
    WorkPayload,
};

pub struct ServerActions {
    catalog: Arc<dyn CatalogRepository>,
    hosts: Arc<dyn HostRepository>,
    profiles: Arc<ProfileService>,
    queue: Arc<WorkQueue>,
}

impl ServerActions {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        hosts: Arc<dyn HostRepository>,
        profiles: Arc<ProfileService>,
        queue: Arc<WorkQueue>,
    ) -> Self {
        Self {
            catalog,
            hosts,
            profiles,
            queue,
        }
    }

    /// Snapshot of a server with its resolved resources
    pub async fn build_spec(&self, server_id: ServerId) -> Result<(HostId, ServerSpec), ActionError> {
        let server = self
            .catalog
            .get_server(server_id)
            .await?
            .filter(|s| !s.deleted)
            .ok_or(ActionError::ServerNotFound(server_id))?;
        let game = self
            .catalog
            .get_game(server.game_id)
            .await?
            .ok_or(ActionError::GameNotFound(server.game_id))?;
        let resources = self
            .profiles
            .resolve_server(server_id)
            .await?
            .iter()
            .map(ResourceSpec::from)
            .collect();

        Ok((
            server.host_id,
            ServerSpec {
                server_id,
                game_id: game.id,
                install_dir: server.install_dir,
                source: game.source,
                ports: server.ports,
                resources,
            },
        ))
    }

    /// Queues `target` for the server's host
    #[instrument(skip(self))]
    pub async fn dispatch(
        &self,
        server_id: ServerId,
        target: TargetType,
        validate: bool,
    ) -> Result<WorkId, ActionError> {
        let (host_id, spec) = self.build_spec(server_id).await?;
        let payload = match target {
            TargetType::Install => WorkPayload::Install(InstallJob {
                server: spec,
                validate,
            }),
            TargetType::Update => WorkPayload::Update(InstallJob {
                server: spec,
                validate,
            }),
            TargetType::Start => WorkPayload::Start(spec),
            TargetType::Stop => WorkPayload::Stop(spec),
            TargetType::Restart => WorkPayload::Restart(spec),
            TargetType::Uninstall => WorkPayload::Uninstall(spec),
            TargetType::Backup => WorkPayload::Backup(spec),
            TargetType::Configure => WorkPayload::Configure(spec),
            TargetType::InstallerMaintenance => {
                return Err(ActionError::UnknownAction(target.to_string()))
            }
        };

        let work_id = self.queue.enqueue_payload(host_id, &payload).await?;
        info!("🎮 {} requested for server {} as work {}", target, server_id, work_id);
        Ok(work_id)
    }

    /// Dispatches an action by its API name
    pub async fn dispatch_named(
        &self,
        server_id: ServerId,
        action: &str,
        validate: bool,
    ) -> Result<WorkId, ActionError> {
        let target = TargetType::from_action(action)
            .ok_or_else(|| ActionError::UnknownAction(action.to_string()))?;
        self.dispatch(server_id, target, validate).await
    }

    /// Queues a self-update of the host's installer tool
    pub async fn installer_maintenance(&self, host_id: HostId) -> Result<WorkId, ActionError> {
        let host = self
            .hosts
            .get_host(host_id)
            .await?
            .filter(|h| !h.deleted)
            .ok_or(ActionError::HostNotFound(host_id))?;
        Ok(self
            .queue
            .enqueue_payload(host.id, &WorkPayload::InstallerMaintenance)
            .await?)
    }

    /// Applies detector states reported by a host to the servers it owns
    pub async fn record_server_states(
        &self,
        host_id: HostId,
        reports: &[ServerStateReport],
    ) -> Result<(), ActionError> {
        for report in reports {
            match self.catalog.get_server(report.server_id).await? {
                Some(mut server) if server.host_id == host_id && !server.deleted => {
                    if server.state != report.state {
                        info!(
                            "Server {} is now {} (was {})",
                            server.id, report.state, server.state
                        );
                        server.state = report.state;
                        self.catalog.upsert_server(server).await?;
                    }
                }
                _ => warn!(
                    "Host {} reported state for unknown server {}",
                    host_id, report.server_id
                ),
            }
        }
        Ok(())
    }

    /// Manual-install artifact with its SHA-256
    pub async fn client_download(&self, game_id: GameId) -> Result<ManualDownload, ActionError> {
        let artifact = self
            .catalog
            .get_artifact(game_id)
            .await?
            .ok_or(ActionError::ArtifactNotFound(game_id))?;
        let sha256 = hex::encode(Sha256::digest(&artifact.content));
        Ok(ManualDownload {
            file_name: artifact.file_name,
            content: artifact.content,
            sha256,
            format: artifact.format,
        })
    }

    /// Soft-deletes a server once its host has uninstalled it
    pub async fn delete_server(&self, host_id: HostId, server_id: ServerId) -> Result<(), ActionError> {
        let mut server = self
            .catalog
            .get_server(server_id)
            .await?
            .filter(|s| s.host_id == host_id)
            .ok_or(ActionError::ServerNotFound(server_id))?;
        server.deleted = true;
        self.catalog.upsert_server(server).await?;
        info!("Server {} removed by host {}", server_id, host_id);
        Ok(())
    }
}

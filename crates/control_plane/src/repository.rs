//! Storage contract of the control plane.
//!
//! Lookups return `Option` for missing records; only storage failures are
//! errors. Every write touches a single record.

use crate::error::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use weaver_types::wire::{ArtifactFormat, ResourceUsage};
use weaver_types::{
    Game, GameId, GameProfile, GameServer, Host, HostId, HostRegistration, ProfileId, ServerId,
    TargetType, WeaverWork, WorkId, WorkStatus,
};

/// Result of an atomic status update on one work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkTransition {
    Applied,
    /// The stored status does not allow the requested move
    Rejected { current: WorkStatus },
}

pub type WorkFilter = dyn Fn(&WeaverWork) -> bool + Send + Sync;

pub type RegistrationCheck<'a> = dyn Fn(&HostRegistration) -> bool + Send + Sync + 'a;

#[async_trait]
pub trait WorkRepository: Send + Sync {
    /// Stores a new `Waiting` item and assigns the next id
    async fn insert_work(
        &self,
        host_id: HostId,
        target_type: TargetType,
        payload: Vec<u8>,
    ) -> Result<WeaverWork, RepositoryError>;

    async fn get_work(&self, id: WorkId) -> Result<Option<WeaverWork>, RepositoryError>;

    /// `Waiting` items of one host, oldest first
    async fn waiting_for_host(
        &self,
        host_id: HostId,
        limit: usize,
    ) -> Result<Vec<WeaverWork>, RepositoryError>;

    async fn list_work(&self, filter: &WorkFilter) -> Result<Vec<WeaverWork>, RepositoryError>;

    /// Moves an item to `status` if its current status allows it; `None`
    /// when the id is unknown
    async fn transition_work(
        &self,
        id: WorkId,
        status: WorkStatus,
        message: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<WorkTransition>, RepositoryError>;

    /// Deletes matching items and returns how many were removed
    async fn remove_work(&self, filter: &WorkFilter) -> Result<usize, RepositoryError>;
}

/// A bearer token handed to a host, stored by the hash of its value
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token_hash: String,
    pub host_id: HostId,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait HostRepository: Send + Sync {
    async fn insert_host(&self, host: Host) -> Result<(), RepositoryError>;
    async fn get_host(&self, id: HostId) -> Result<Option<Host>, RepositoryError>;
    async fn update_host(&self, host: Host) -> Result<(), RepositoryError>;
    async fn list_hosts(&self) -> Result<Vec<Host>, RepositoryError>;

    /// Stores a registration; `Conflict` when an active one already uses
    /// the same description
    async fn insert_registration(&self, registration: HostRegistration)
        -> Result<(), RepositoryError>;
    /// Flips an active registration accepted by `accept` to consumed in one
    /// step. `None` when it is missing, already consumed or not accepted.
    async fn consume_registration(
        &self,
        host_id: HostId,
        accept: &RegistrationCheck<'_>,
        remote_ip: Option<String>,
    ) -> Result<Option<HostRegistration>, RepositoryError>;
    /// Deactivates a pending registration and frees its description
    async fn cancel_registration(&self, host_id: HostId) -> Result<bool, RepositoryError>;

    async fn insert_token(&self, token: AccessToken) -> Result<(), RepositoryError>;
    async fn get_token(&self, token_hash: &str) -> Result<Option<AccessToken>, RepositoryError>;
    /// Drops tokens expired before `now`, returning how many were removed
    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError>;
    async fn revoke_host_tokens(&self, host_id: HostId) -> Result<usize, RepositoryError>;

    async fn record_usage(&self, host_id: HostId, usage: ResourceUsage)
        -> Result<(), RepositoryError>;
    async fn latest_usage(&self, host_id: HostId) -> Result<Option<ResourceUsage>, RepositoryError>;
}

/// An uploaded game client served to hosts for manual installs
#[derive(Debug, Clone)]
pub struct ClientArtifact {
    pub game_id: GameId,
    pub file_name: String,
    pub content: Vec<u8>,
    pub format: ArtifactFormat,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_game(&self, id: GameId) -> Result<Option<Game>, RepositoryError>;
    async fn upsert_game(&self, game: Game) -> Result<(), RepositoryError>;

    async fn get_profile(&self, id: ProfileId) -> Result<Option<GameProfile>, RepositoryError>;
    async fn upsert_profile(&self, profile: GameProfile) -> Result<(), RepositoryError>;

    async fn get_server(&self, id: ServerId) -> Result<Option<GameServer>, RepositoryError>;
    async fn upsert_server(&self, server: GameServer) -> Result<(), RepositoryError>;
    async fn servers_on_host(&self, host_id: HostId) -> Result<Vec<GameServer>, RepositoryError>;

    async fn get_artifact(&self, game_id: GameId)
        -> Result<Option<ClientArtifact>, RepositoryError>;
    async fn put_artifact(&self, artifact: ClientArtifact) -> Result<(), RepositoryError>;
}

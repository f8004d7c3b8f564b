//! In-memory repository backed by `DashMap`.
//!
//! Each record sits behind its own map entry, so single-record updates are
//! serialized without a global lock.

use crate::error::RepositoryError;
use crate::repository::{
    AccessToken, CatalogRepository, ClientArtifact, HostRepository, RegistrationCheck,
    WorkFilter, WorkRepository, WorkTransition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use weaver_types::wire::ResourceUsage;
use weaver_types::{
    Game, GameId, GameProfile, GameServer, Host, HostId, HostRegistration, ProfileId, ServerId,
    TargetType, WeaverWork, WorkId, WorkStatus,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    work: DashMap<WorkId, WeaverWork>,
    next_work_id: AtomicU64,
    hosts: DashMap<HostId, Host>,
    registrations: DashMap<HostId, HostRegistration>,
    /// Description of every active registration, owned by its host
    active_descriptions: DashMap<String, HostId>,
    tokens: DashMap<String, AccessToken>,
    usage: DashMap<HostId, ResourceUsage>,
    games: DashMap<GameId, Game>,
    profiles: DashMap<ProfileId, GameProfile>,
    servers: DashMap<ServerId, GameServer>,
    artifacts: DashMap<GameId, ClientArtifact>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkRepository for MemoryStore {
    async fn insert_work(
        &self,
        host_id: HostId,
        target_type: TargetType,
        payload: Vec<u8>,
    ) -> Result<WeaverWork, RepositoryError> {
        let id = WorkId(self.next_work_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = Utc::now();
        let work = WeaverWork {
            id,
            host_id,
            target_type,
            status: WorkStatus::Waiting,
            payload,
            message: None,
            created_at: now,
            updated_at: now,
        };
        self.work.insert(id, work.clone());
        Ok(work)
    }

    async fn get_work(&self, id: WorkId) -> Result<Option<WeaverWork>, RepositoryError> {
        Ok(self.work.get(&id).map(|w| w.clone()))
    }

    async fn waiting_for_host(
        &self,
        host_id: HostId,
        limit: usize,
    ) -> Result<Vec<WeaverWork>, RepositoryError> {
        let mut waiting: Vec<WeaverWork> = self
            .work
            .iter()
            .filter(|w| w.host_id == host_id && w.status == WorkStatus::Waiting)
            .map(|w| w.clone())
            .collect();
        waiting.sort_by_key(|w| w.id);
        waiting.truncate(limit);
        Ok(waiting)
    }

    async fn list_work(&self, filter: &WorkFilter) -> Result<Vec<WeaverWork>, RepositoryError> {
        let mut matching: Vec<WeaverWork> = self
            .work
            .iter()
            .filter(|w| filter(w.value()))
            .map(|w| w.clone())
            .collect();
        matching.sort_by_key(|w| w.id);
        Ok(matching)
    }

    async fn transition_work(
        &self,
        id: WorkId,
        status: WorkStatus,
        message: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<WorkTransition>, RepositoryError> {
        let Some(mut work) = self.work.get_mut(&id) else {
            return Ok(None);
        };

        if !work.status.can_transition_to(status) {
            return Ok(Some(WorkTransition::Rejected {
                current: work.status,
            }));
        }

        work.status = status;
        if message.is_some() {
            work.message = message;
        }
        work.updated_at = at;
        Ok(Some(WorkTransition::Applied))
    }

    async fn remove_work(&self, filter: &WorkFilter) -> Result<usize, RepositoryError> {
        let before = self.work.len();
        self.work.retain(|_, w| !filter(&*w));
        Ok(before.saturating_sub(self.work.len()))
    }
}

#[async_trait]
impl HostRepository for MemoryStore {
    async fn insert_host(&self, host: Host) -> Result<(), RepositoryError> {
        if self.hosts.contains_key(&host.id) {
            return Err(RepositoryError::Conflict(format!("host {}", host.id)));
        }
        self.hosts.insert(host.id, host);
        Ok(())
    }

    async fn get_host(&self, id: HostId) -> Result<Option<Host>, RepositoryError> {
        Ok(self.hosts.get(&id).map(|h| h.clone()))
    }

    async fn update_host(&self, host: Host) -> Result<(), RepositoryError> {
        self.hosts.insert(host.id, host);
        Ok(())
    }

    async fn list_hosts(&self) -> Result<Vec<Host>, RepositoryError> {
        Ok(self.hosts.iter().map(|h| h.clone()).collect())
    }

    async fn insert_registration(
        &self,
        registration: HostRegistration,
    ) -> Result<(), RepositoryError> {
        if registration.active {
            match self.active_descriptions.entry(registration.description.clone()) {
                Entry::Occupied(_) => {
                    return Err(RepositoryError::Conflict(format!(
                        "active registration '{}'",
                        registration.description
                    )))
                }
                Entry::Vacant(slot) => {
                    slot.insert(registration.host_id);
                }
            }
        }
        self.registrations
            .insert(registration.host_id, registration);
        Ok(())
    }

    async fn consume_registration(
        &self,
        host_id: HostId,
        accept: &RegistrationCheck<'_>,
        remote_ip: Option<String>,
    ) -> Result<Option<HostRegistration>, RepositoryError> {
        let consumed = match self.registrations.get_mut(&host_id) {
            Some(mut registration) if registration.active && accept(registration.value()) => {
                registration.consume(remote_ip);
                Some(registration.value().clone())
            }
            _ => None,
        };
        if let Some(registration) = &consumed {
            self.active_descriptions
                .remove_if(&registration.description, |_, owner| *owner == host_id);
        }
        Ok(consumed)
    }

    async fn cancel_registration(&self, host_id: HostId) -> Result<bool, RepositoryError> {
        let description = match self.registrations.get_mut(&host_id) {
            Some(mut registration) if registration.active => {
                registration.active = false;
                Some(registration.description.clone())
            }
            _ => None,
        };
        match description {
            Some(description) => {
                self.active_descriptions
                    .remove_if(&description, |_, owner| *owner == host_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_token(&self, token: AccessToken) -> Result<(), RepositoryError> {
        self.tokens.insert(token.token_hash.clone(), token);
        Ok(())
    }

    async fn get_token(&self, token_hash: &str) -> Result<Option<AccessToken>, RepositoryError> {
        Ok(self.tokens.get(token_hash).map(|t| t.clone()))
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let before = self.tokens.len();
        self.tokens.retain(|_, t| t.expires_at > now);
        Ok(before.saturating_sub(self.tokens.len()))
    }

    async fn revoke_host_tokens(&self, host_id: HostId) -> Result<usize, RepositoryError> {
        let before = self.tokens.len();
        self.tokens.retain(|_, t| t.host_id != host_id);
        Ok(before.saturating_sub(self.tokens.len()))
    }

    async fn record_usage(
        &self,
        host_id: HostId,
        usage: ResourceUsage,
    ) -> Result<(), RepositoryError> {
        self.usage.insert(host_id, usage);
        Ok(())
    }

    async fn latest_usage(&self, host_id: HostId) -> Result<Option<ResourceUsage>, RepositoryError> {
        Ok(self.usage.get(&host_id).map(|u| u.clone()))
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn get_game(&self, id: GameId) -> Result<Option<Game>, RepositoryError> {
        Ok(self.games.get(&id).map(|g| g.clone()))
    }

    async fn upsert_game(&self, game: Game) -> Result<(), RepositoryError> {
        self.games.insert(game.id, game);
        Ok(())
    }

    async fn get_profile(&self, id: ProfileId) -> Result<Option<GameProfile>, RepositoryError> {
        Ok(self.profiles.get(&id).map(|p| p.clone()))
    }

    async fn upsert_profile(&self, profile: GameProfile) -> Result<(), RepositoryError> {
        self.profiles.insert(profile.id, profile);
        Ok(())
    }

    async fn get_server(&self, id: ServerId) -> Result<Option<GameServer>, RepositoryError> {
        Ok(self.servers.get(&id).map(|s| s.clone()))
    }

    async fn upsert_server(&self, server: GameServer) -> Result<(), RepositoryError> {
        self.servers.insert(server.id, server);
        Ok(())
    }

    async fn servers_on_host(&self, host_id: HostId) -> Result<Vec<GameServer>, RepositoryError> {
        Ok(self
            .servers
            .iter()
            .filter(|s| s.host_id == host_id && !s.deleted)
            .map(|s| s.clone())
            .collect())
    }

    async fn get_artifact(
        &self,
        game_id: GameId,
    ) -> Result<Option<ClientArtifact>, RepositoryError> {
        Ok(self.artifacts.get(&game_id).map(|a| a.clone()))
    }

    async fn put_artifact(&self, artifact: ClientArtifact) -> Result<(), RepositoryError> {
        self.artifacts.insert(artifact.game_id, artifact);
        Ok(())
    }
}

//! Queued work and its typed payload.
//!
//! The queue only ever sees [`WeaverWork`] with opaque payload bytes. The
//! host decodes the bytes exactly once, at dispatch time, into a
//! [`WorkPayload`] whose variant is chosen by the stored [`TargetType`].

use crate::catalog::{ConfigurationItem, ContentType, GameSource, OsPaths, ResourceType};
use crate::error::PayloadError;
use crate::ids::{GameId, HostId, ServerId, WorkId};
use crate::profile::ResolvedResource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a work item asks the host to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Install,
    Update,
    Start,
    Stop,
    Restart,
    Uninstall,
    Backup,
    Configure,
    InstallerMaintenance,
}

impl TargetType {
    /// Parses the lowercase action names used by the admin API
    pub fn from_action(action: &str) -> Option<Self> {
        let target = match action.to_ascii_lowercase().as_str() {
            "install" => Self::Install,
            "update" => Self::Update,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "restart" => Self::Restart,
            "uninstall" => Self::Uninstall,
            "backup" => Self::Backup,
            "configure" => Self::Configure,
            _ => return None,
        };
        Some(target)
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Uninstall => "uninstall",
            Self::Backup => "backup",
            Self::Configure => "configure",
            Self::InstallerMaintenance => "installer-maintenance",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum WorkStatus {
    #[default]
    Waiting,
    InProgress,
    Completed,
    Failed,
}

impl WorkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward-only transitions; repeating the current status is not a transition
    pub fn can_transition_to(&self, next: WorkStatus) -> bool {
        match self {
            Self::Waiting => matches!(next, Self::InProgress | Self::Completed | Self::Failed),
            Self::InProgress => matches!(next, Self::Completed | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A job as stored by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaverWork {
    pub id: WorkId,
    pub host_id: HostId,
    pub target_type: TargetType,
    pub status: WorkStatus,
    #[serde(with = "crate::wire::base64_bytes")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WeaverWork {
    pub fn decode(&self) -> Result<WorkItem, PayloadError> {
        Ok(WorkItem {
            id: self.id,
            payload: WorkPayload::decode(self.target_type, &self.payload)?,
        })
    }
}

/// A decoded work item ready for dispatch
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: WorkId,
    pub payload: WorkPayload,
}

/// Body of an install or update job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallJob {
    pub server: ServerSpec,
    /// Ask the installer to verify every file
    #[serde(default)]
    pub validate: bool,
}

/// Typed body of a work item, one variant per [`TargetType`]
#[derive(Debug, Clone, PartialEq)]
pub enum WorkPayload {
    Install(InstallJob),
    Update(InstallJob),
    Start(ServerSpec),
    Stop(ServerSpec),
    Restart(ServerSpec),
    Uninstall(ServerSpec),
    Backup(ServerSpec),
    Configure(ServerSpec),
    InstallerMaintenance,
}

impl WorkPayload {
    pub fn target_type(&self) -> TargetType {
        match self {
            Self::Install(_) => TargetType::Install,
            Self::Update(_) => TargetType::Update,
            Self::Start(_) => TargetType::Start,
            Self::Stop(_) => TargetType::Stop,
            Self::Restart(_) => TargetType::Restart,
            Self::Uninstall(_) => TargetType::Uninstall,
            Self::Backup(_) => TargetType::Backup,
            Self::Configure(_) => TargetType::Configure,
            Self::InstallerMaintenance => TargetType::InstallerMaintenance,
        }
    }

    /// The server this payload is about, if any
    pub fn server(&self) -> Option<&ServerSpec> {
        match self {
            Self::Install(job) | Self::Update(job) => Some(&job.server),
            Self::Start(spec)
            | Self::Stop(spec)
            | Self::Restart(spec)
            | Self::Uninstall(spec)
            | Self::Backup(spec)
            | Self::Configure(spec) => Some(spec),
            Self::InstallerMaintenance => None,
        }
    }

    pub fn encode(&self) -> Result<(TargetType, Vec<u8>), PayloadError> {
        let target = self.target_type();
        let encoded = match self {
            Self::Install(job) | Self::Update(job) => serde_json::to_vec(job),
            Self::Start(spec)
            | Self::Stop(spec)
            | Self::Restart(spec)
            | Self::Uninstall(spec)
            | Self::Backup(spec)
            | Self::Configure(spec) => serde_json::to_vec(spec),
            Self::InstallerMaintenance => Ok(Vec::new()),
        };
        encoded
            .map(|bytes| (target, bytes))
            .map_err(|source| PayloadError::Encode { target, source })
    }

    pub fn decode(target: TargetType, bytes: &[u8]) -> Result<Self, PayloadError> {
        let malformed = |source| PayloadError::Malformed { target, source };
        let payload = match target {
            TargetType::Install => Self::Install(serde_json::from_slice(bytes).map_err(malformed)?),
            TargetType::Update => Self::Update(serde_json::from_slice(bytes).map_err(malformed)?),
            TargetType::Start => Self::Start(serde_json::from_slice(bytes).map_err(malformed)?),
            TargetType::Stop => Self::Stop(serde_json::from_slice(bytes).map_err(malformed)?),
            TargetType::Restart => Self::Restart(serde_json::from_slice(bytes).map_err(malformed)?),
            TargetType::Uninstall => {
                Self::Uninstall(serde_json::from_slice(bytes).map_err(malformed)?)
            }
            TargetType::Backup => Self::Backup(serde_json::from_slice(bytes).map_err(malformed)?),
            TargetType::Configure => {
                Self::Configure(serde_json::from_slice(bytes).map_err(malformed)?)
            }
            TargetType::InstallerMaintenance => Self::InstallerMaintenance,
        };
        Ok(payload)
    }
}

/// Snapshot of a server and its resolved resources at dispatch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub server_id: ServerId,
    pub game_id: GameId,
    pub install_dir: PathBuf,
    pub source: GameSource,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

impl ServerSpec {
    /// Startup resources, lowest priority value first
    pub fn startup_resources(&self) -> Vec<&ResourceSpec> {
        let mut startup: Vec<&ResourceSpec> = self.resources.iter().filter(|r| r.startup).collect();
        startup.sort_by_key(|r| r.startup_priority);
        startup
    }

    pub fn resources_of(&self, resource_type: ResourceType) -> impl Iterator<Item = &ResourceSpec> {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }
}

/// A resolved resource with its flattened effective items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub paths: OsPaths,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub startup: bool,
    #[serde(default)]
    pub startup_priority: i32,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub load_existing: bool,
    #[serde(default)]
    pub items: Vec<ConfigurationItem>,
}

impl ResourceSpec {
    /// OS-specific path, joined to `install_dir` when relative.
    ///
    /// `None` when no path is declared for this OS.
    pub fn resolve_path(&self, install_dir: &Path) -> Option<PathBuf> {
        let raw = self.paths.current().trim();
        if raw.is_empty() {
            return None;
        }
        let path = Path::new(raw);
        if path.is_absolute() {
            Some(path.to_path_buf())
        } else {
            Some(install_dir.join(path))
        }
    }
}

impl From<&ResolvedResource> for ResourceSpec {
    fn from(resolved: &ResolvedResource) -> Self {
        let resource = &resolved.resource;
        Self {
            name: resource.name.clone(),
            paths: resource.paths.clone(),
            resource_type: resource.resource_type,
            content_type: resource.content_type,
            startup: resource.startup,
            startup_priority: resource.startup_priority,
            arguments: resource.arguments.clone(),
            load_existing: resource.load_existing,
            items: resolved.effective_items(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ServerSpec {
        let exe = |name: &str, priority: i32| ResourceSpec {
            name: name.to_string(),
            paths: OsPaths::same(format!("bin/{}", name)),
            resource_type: ResourceType::Executable,
            content_type: ContentType::Raw,
            startup: true,
            startup_priority: priority,
            arguments: String::new(),
            load_existing: false,
            items: Vec::new(),
        };

        ServerSpec {
            server_id: ServerId::new(),
            game_id: GameId::new(),
            install_dir: PathBuf::from("/srv/games/valheim"),
            source: GameSource::Steam { app_id: 896660 },
            ports: vec![2456],
            resources: vec![exe("late", 10), exe("early", -1), exe("middle", 3)],
        }
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use WorkStatus::*;
        assert!(Waiting.can_transition_to(InProgress));
        assert!(Waiting.can_transition_to(Completed));
        assert!(Waiting.can_transition_to(Failed));
        assert!(InProgress.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Waiting));
        assert!(!InProgress.can_transition_to(InProgress));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(InProgress));
        assert!(Completed.is_terminal() && Failed.is_terminal());
    }

    #[test]
    fn test_payload_decodes_by_target_type() {
        let payload = WorkPayload::Install(InstallJob {
            server: spec(),
            validate: true,
        });
        let (target, bytes) = payload.encode().unwrap();
        assert_eq!(target, TargetType::Install);
        assert_eq!(WorkPayload::decode(target, &bytes).unwrap(), payload);

        let (target, bytes) = WorkPayload::InstallerMaintenance.encode().unwrap();
        assert!(bytes.is_empty());
        assert_eq!(
            WorkPayload::decode(target, &bytes).unwrap(),
            WorkPayload::InstallerMaintenance
        );
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let err = WorkPayload::decode(TargetType::Start, b"{\"nope\":1}").unwrap_err();
        assert!(err.to_string().contains("start"));
    }

    #[test]
    fn test_startup_resources_sorted_by_priority() {
        let spec = spec();
        let names: Vec<&str> = spec
            .startup_resources()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(names, vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_resolve_path_joins_relative() {
        let spec = spec();
        let install_dir = spec.install_dir.clone();
        let resolved = spec.resources[0].resolve_path(&install_dir).unwrap();
        assert_eq!(resolved, install_dir.join("bin/late"));

        let mut empty = spec.resources[0].clone();
        empty.paths = OsPaths::default();
        assert!(empty.resolve_path(&install_dir).is_none());
    }

    #[test]
    fn test_action_names() {
        assert_eq!(TargetType::from_action("Restart"), Some(TargetType::Restart));
        assert_eq!(TargetType::from_action("installer-maintenance"), None);
        assert_eq!(TargetType::from_action("explode"), None);
    }
}

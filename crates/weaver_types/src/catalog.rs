//! Games, servers, profiles and the local resources they manage.

use crate::host::ConnectivityState;
use crate::ids::{AccountId, GameId, HostId, ItemId, ProfileId, ResourceId, ServerId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the game binaries come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GameSource {
    /// Installed and updated through the external installer tool
    Steam { app_id: u32 },
    /// Uploaded to the control plane and downloaded by the host
    Manual,
}

/// A game the fleet knows how to host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub source: GameSource,
    /// Root of every profile inheritance chain for this game
    pub default_profile_id: ProfileId,
}

/// A running or installable instance of a game on one host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameServer {
    pub id: ServerId,
    pub owner: AccountId,
    pub host_id: HostId,
    pub game_id: GameId,
    /// This server's own override set
    pub game_profile_id: ProfileId,
    /// Optional inheritable template between the game default and the own profile
    #[serde(default)]
    pub parent_game_profile_id: Option<ProfileId>,
    pub name: String,
    pub install_dir: PathBuf,
    /// Ports the server is expected to listen on once healthy
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub state: ConnectivityState,
    #[serde(default)]
    pub deleted: bool,
}

/// Named, ownable collection of local resources for one game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameProfile {
    pub id: ProfileId,
    pub game_id: GameId,
    #[serde(default)]
    pub owner: Option<AccountId>,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<LocalResource>,
}

impl GameProfile {
    pub fn new(game_id: GameId, name: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(),
            game_id,
            owner: None,
            name: name.into(),
            resources: Vec::new(),
        }
    }

    pub fn resource(&self, name: &str) -> Option<&LocalResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut LocalResource> {
        self.resources.iter_mut().find(|r| r.name == name)
    }
}

/// Per-OS path variants of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OsPaths {
    #[serde(default)]
    pub windows: String,
    #[serde(default)]
    pub linux: String,
}

impl OsPaths {
    pub fn same(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            windows: path.clone(),
            linux: path,
        }
    }

    /// The variant matching the operating system this code runs on
    pub fn current(&self) -> &str {
        if cfg!(windows) {
            &self.windows
        } else {
            &self.linux
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Executable,
    Script,
    Config,
    BackupPath,
}

/// On-disk format of a config resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContentType {
    #[default]
    Raw,
    Ini,
    Json,
    Xml,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::Ini => "ini",
            Self::Json => "json",
            Self::Xml => "xml",
        };
        f.write_str(name)
    }
}

/// One managed file belonging to a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalResource {
    pub id: ResourceId,
    /// Matches the same resource across profile layers
    pub name: String,
    pub paths: OsPaths,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub startup: bool,
    #[serde(default)]
    pub startup_priority: i32,
    /// Launch arguments for startup resources
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub load_existing: bool,
    #[serde(default)]
    pub items: Vec<ConfigurationItem>,
}

impl LocalResource {
    pub fn new(name: impl Into<String>, resource_type: ResourceType, paths: OsPaths) -> Self {
        Self {
            id: ResourceId::new(),
            name: name.into(),
            paths,
            resource_type,
            content_type: ContentType::Raw,
            startup: false,
            startup_priority: 0,
            arguments: String::new(),
            load_existing: false,
            items: Vec::new(),
        }
    }

    /// Copy of this resource's metadata with a fresh id and no items.
    ///
    /// Used to materialize an inherited resource onto another profile; the
    /// inherited items keep flowing in from the ancestor layers.
    pub fn materialized_copy(&self) -> Self {
        Self {
            id: ResourceId::new(),
            items: Vec::new(),
            ..self.clone()
        }
    }
}

/// One key/value setting inside a resource's config set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationItem {
    pub id: ItemId,
    pub key: String,
    #[serde(default)]
    pub value: String,
    /// Section (Ini) or attribute list (Xml)
    #[serde(default)]
    pub category: String,
    /// Structural grouping, meaning depends on the content type
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default)]
    pub duplicate_key: bool,
    /// Suppresses an inherited item with the same identity
    #[serde(default)]
    pub ignore: bool,
}

impl ConfigurationItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            key: key.into(),
            value: value.into(),
            category: String::new(),
            path: String::new(),
            friendly_name: String::new(),
            duplicate_key: false,
            ignore: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn duplicated(mut self) -> Self {
        self.duplicate_key = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }
}

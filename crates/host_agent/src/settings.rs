//! The host's local settings file.
//!
//! Besides the control plane URL it doubles as the credential store: the
//! one-time registration link and the permanent `(host_id, host_key)` pair
//! live in the `[auth]` table. Every update is written through a temp file
//! and a rename so a crash never leaves a half-written credential behind.

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// `scheme://authority` of the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// One-time registration link, cleared once consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key: Option<String>,
}

/// Settings file plus its in-memory copy
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<HostSettings>,
}

impl SettingsStore {
    /// Loads the file at `path`; a missing file yields empty settings
    #[instrument]
    pub async fn load(path: &Path) -> Result<Self, SettingsError> {
        let settings = match tokio::fs::read_to_string(path).await {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| SettingsError::Parse(path.to_path_buf(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, starting empty", path.display());
                HostSettings::default()
            }
            Err(e) => return Err(SettingsError::Read(path.to_path_buf(), e)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            current: RwLock::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> HostSettings {
        self.current.read().await.clone()
    }

    /// Applies `change` and persists the result before making it visible
    pub async fn update<F>(&self, change: F) -> Result<HostSettings, SettingsError>
    where
        F: FnOnce(&mut HostSettings),
    {
        let mut current = self.current.write().await;
        let mut next = current.clone();
        change(&mut next);
        write_settings(&self.path, &next).await?;
        *current = next.clone();
        Ok(next)
    }
}

async fn write_settings(path: &Path, settings: &HostSettings) -> Result<(), SettingsError> {
    let content = toml::to_string_pretty(settings)?;
    let write_err = |e| SettingsError::Write(path.to_path_buf(), e);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "settings".to_string());
    let temp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&temp, content).await.map_err(write_err)?;
    tokio::fs::rename(&temp, path).await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(&dir.path().join("host.toml")).await.unwrap();
        assert_eq!(store.snapshot().await, HostSettings::default());
    }

    #[tokio::test]
    async fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("host.toml");
        let store = SettingsStore::load(&path).await.unwrap();

        store
            .update(|s| {
                s.general.server_url = Some("https://fleet.example.com".to_string());
                s.auth.host_key = Some("secret".to_string());
            })
            .await
            .unwrap();

        let reloaded = SettingsStore::load(&path).await.unwrap().snapshot().await;
        assert_eq!(
            reloaded.general.server_url.as_deref(),
            Some("https://fleet.example.com")
        );
        assert_eq!(reloaded.auth.host_key.as_deref(), Some("secret"));
        assert!(reloaded.auth.register_url.is_none());

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_parses_hand_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.toml");
        std::fs::write(
            &path,
            "[auth]\nregister_url = \"http://cp:8090/api/host/register?hostId=x&registerKey=y\"\n",
        )
        .unwrap();

        let settings = SettingsStore::load(&path).await.unwrap().snapshot().await;
        assert!(settings.general.server_url.is_none());
        assert!(settings.auth.register_url.unwrap().contains("registerKey=y"));
    }
}

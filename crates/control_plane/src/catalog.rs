//! Seeds games, profiles, servers and client artifacts from a JSON file.

use crate::error::CatalogError;
use crate::repository::{CatalogRepository, ClientArtifact};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use weaver_types::wire::ArtifactFormat;
use weaver_types::{Game, GameId, GameProfile, GameServer};

#[derive(Debug, Deserialize)]
struct ArtifactSeed {
    game_id: GameId,
    /// Relative paths are resolved against the catalog file's directory
    path: PathBuf,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    format: ArtifactFormat,
}

#[derive(Debug, Deserialize, Default)]
struct CatalogSeed {
    #[serde(default)]
    games: Vec<Game>,
    #[serde(default)]
    profiles: Vec<GameProfile>,
    #[serde(default)]
    servers: Vec<GameServer>,
    #[serde(default)]
    artifacts: Vec<ArtifactSeed>,
}

/// Counts of what a catalog file contributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub games: usize,
    pub profiles: usize,
    pub servers: usize,
    pub artifacts: usize,
}

#[instrument(skip(catalog))]
pub async fn load_catalog(
    path: &Path,
    catalog: &dyn CatalogRepository,
) -> Result<CatalogSummary, CatalogError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CatalogError::FileRead(path.to_path_buf(), e))?;
    let seed: CatalogSeed =
        serde_json::from_str(&content).map_err(|e| CatalogError::Parse(path.to_path_buf(), e))?;

    let summary = CatalogSummary {
        games: seed.games.len(),
        profiles: seed.profiles.len(),
        servers: seed.servers.len(),
        artifacts: seed.artifacts.len(),
    };

    for game in seed.games {
        catalog.upsert_game(game).await?;
    }
    for profile in seed.profiles {
        catalog.upsert_profile(profile).await?;
    }
    for server in seed.servers {
        catalog.upsert_server(server).await?;
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for artifact in seed.artifacts {
        let file = if artifact.path.is_absolute() {
            artifact.path.clone()
        } else {
            base.join(&artifact.path)
        };
        let content = tokio::fs::read(&file)
            .await
            .map_err(|e| CatalogError::ArtifactRead(file.clone(), e))?;
        let file_name = artifact.file_name.unwrap_or_else(|| {
            file.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "client".to_string())
        });
        catalog
            .put_artifact(ClientArtifact {
                game_id: artifact.game_id,
                file_name,
                content,
                format: artifact.format,
            })
            .await?;
    }

    info!(
        "📚 Catalog loaded: {} games, {} profiles, {} servers, {} artifacts",
        summary.games, summary.profiles, summary.servers, summary.artifacts
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use weaver_types::{GameSource, ProfileId, ServerId};

    #[tokio::test]
    async fn test_load_catalog_with_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("client.bin"), b"payload").unwrap();

        let game_id = GameId::new();
        let profile_id = ProfileId::new();
        let server_id = ServerId::new();
        let catalog = serde_json::json!({
            "games": [{
                "id": game_id,
                "name": "Manual Game",
                "source": { "kind": "manual" },
                "default_profile_id": profile_id
            }],
            "profiles": [{
                "id": profile_id,
                "game_id": game_id,
                "name": "default",
                "resources": [{
                    "id": weaver_types::ResourceId::new(),
                    "name": "server",
                    "paths": { "windows": "server.exe", "linux": "server" },
                    "resource_type": "Executable",
                    "startup": true
                }]
            }],
            "servers": [{
                "id": server_id,
                "owner": weaver_types::AccountId::new(),
                "host_id": weaver_types::HostId::new(),
                "game_id": game_id,
                "game_profile_id": profile_id,
                "name": "manual-1",
                "install_dir": "/srv/manual-1"
            }],
            "artifacts": [{ "game_id": game_id, "path": "client.bin" }]
        });
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, catalog.to_string()).unwrap();

        let store = MemoryStore::new();
        let summary = load_catalog(&path, &store).await.unwrap();
        assert_eq!(
            summary,
            CatalogSummary {
                games: 1,
                profiles: 1,
                servers: 1,
                artifacts: 1
            }
        );

        let game = store.get_game(game_id).await.unwrap().unwrap();
        assert_eq!(game.source, GameSource::Manual);
        let artifact = store.get_artifact(game_id).await.unwrap().unwrap();
        assert_eq!(artifact.file_name, "client.bin");
        assert_eq!(artifact.content, b"payload");
        assert!(store.get_server(server_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_catalog_file() {
        let store = MemoryStore::new();
        let err = load_catalog(Path::new("/definitely/not/here.json"), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::FileRead(_, _)));
    }
}

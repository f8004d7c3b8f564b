//! Installs manually uploaded game clients.
//!
//! The artifact is fetched from the control plane, written into the install
//! directory and verified against its declared SHA-256. A mismatch triggers
//! exactly one full re-download; a second mismatch is permanent.

use crate::error::ManualInstallError;
use crate::session::ArtifactSource;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use weaver_types::wire::{ArtifactFormat, ManualDownload};
use weaver_types::GameId;

const ATTEMPTS: usize = 2;

#[instrument(skip(source))]
pub async fn install(
    source: &dyn ArtifactSource,
    game_id: GameId,
    install_dir: &Path,
) -> Result<PathBuf, ManualInstallError> {
    tokio::fs::create_dir_all(install_dir)
        .await
        .map_err(|e| ManualInstallError::Io(install_dir.to_path_buf(), e))?;

    let mut attempt = 1;
    loop {
        let download = source.fetch_client(game_id).await?;
        let target = target_path(install_dir, &download.file_name)?;

        match write_and_verify(&download, &target).await {
            Ok(()) => {
                if download.format == ArtifactFormat::Zip {
                    extract_and_remove(&target, install_dir).await?;
                }
                info!("📦 Client for game {} installed into {}", game_id, install_dir.display());
                return Ok(target);
            }
            Err(ManualInstallError::HashMismatch { expected, actual }) if attempt < ATTEMPTS => {
                warn!(
                    "Hash mismatch on {} (expected {}, got {}), downloading again",
                    download.file_name, expected, actual
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn target_path(install_dir: &Path, file_name: &str) -> Result<PathBuf, ManualInstallError> {
    let name = Path::new(file_name);
    match name.file_name() {
        Some(plain) if plain == name.as_os_str() => Ok(install_dir.join(plain)),
        _ => Err(ManualInstallError::InvalidFileName(file_name.to_string())),
    }
}

async fn write_and_verify(download: &ManualDownload, target: &Path) -> Result<(), ManualInstallError> {
    let io_err = |e| ManualInstallError::Io(target.to_path_buf(), e);
    tokio::fs::write(target, &download.content).await.map_err(io_err)?;

    let written = tokio::fs::read(target).await.map_err(io_err)?;
    let actual = hex::encode(Sha256::digest(&written));
    if actual.eq_ignore_ascii_case(download.sha256.trim()) {
        Ok(())
    } else {
        Err(ManualInstallError::HashMismatch {
            expected: download.sha256.clone(),
            actual,
        })
    }
}

async fn extract_and_remove(archive: &Path, into: &Path) -> Result<(), ManualInstallError> {
    let archive_path = archive.to_path_buf();
    let target = into.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive_path)
            .map_err(|e| ManualInstallError::Io(archive_path.clone(), e))?;
        zip::ZipArchive::new(file)
            .and_then(|mut zip| zip.extract(&target))
            .map_err(|e| ManualInstallError::Extract(archive_path.clone(), e))
    })
    .await
    .map_err(|e| {
        ManualInstallError::Io(
            archive.to_path_buf(),
            std::io::Error::new(std::io::ErrorKind::Other, e),
        )
    })??;

    tokio::fs::remove_file(archive)
        .await
        .map_err(|e| ManualInstallError::Io(archive.to_path_buf(), e))
}

use super::Handlers;
use crate::error::WorkFailure;
use crate::manual;
use weaver_types::{GameSource, ServerSpec};

/// Installs or updates a server from its game's source
pub(super) async fn install(
    handlers: &Handlers,
    server: &ServerSpec,
    validate: bool,
) -> Result<(), WorkFailure> {
    match server.source {
        GameSource::Steam { app_id } => handlers
            .installer
            .install_app(&server.install_dir, app_id, validate)
            .await
            .map_err(|e| WorkFailure::single(e.to_string())),
        GameSource::Manual => {
            manual::install(handlers.artifacts.as_ref(), server.game_id, &server.install_dir)
                .await
                .map(|_| ())
                .map_err(|e| WorkFailure::single(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::handlers::tests::{handlers, spec};
    use sha2::{Digest, Sha256};
    use weaver_types::wire::{ArtifactFormat, ManualDownload};
    use weaver_types::{GameSource, InstallJob, WorkPayload};

    #[tokio::test]
    async fn test_steam_install_uses_template() {
        let scratch = tempfile::tempdir().unwrap();
        let (handlers, recorder) = handlers(scratch.path());
        let install_dir = scratch.path().join("game");
        let server = spec(install_dir.clone(), GameSource::Steam { app_id: 740 });

        handlers
            .handle(&WorkPayload::Update(InstallJob {
                server,
                validate: true,
            }))
            .await
            .unwrap();

        let args = recorder.installer_args.lock().unwrap();
        assert_eq!(
            args[0],
            vec![
                "+force_install_dir".to_string(),
                install_dir.display().to_string(),
                "+login".to_string(),
                "anonymous".to_string(),
                "+app_update".to_string(),
                "740".to_string(),
                "validate".to_string(),
                "+quit".to_string(),
            ]
        );
        assert!(install_dir.is_dir());
    }

    #[tokio::test]
    async fn test_manual_install_downloads_artifact() {
        let scratch = tempfile::tempdir().unwrap();
        let (handlers, recorder) = handlers(scratch.path());
        recorder.downloads.lock().unwrap().push(ManualDownload {
            file_name: "server.bin".to_string(),
            content: b"binary".to_vec(),
            sha256: hex::encode(Sha256::digest(b"binary")),
            format: ArtifactFormat::File,
        });
        let install_dir = scratch.path().join("manual");
        let server = spec(install_dir.clone(), GameSource::Manual);

        handlers
            .handle(&WorkPayload::Install(InstallJob {
                server,
                validate: false,
            }))
            .await
            .unwrap();
        assert_eq!(std::fs::read(install_dir.join("server.bin")).unwrap(), b"binary");
        assert!(recorder.installer_args.lock().unwrap().is_empty());
    }
}

//! Zip backups of a server's backup-path resources with age-based retention.

use crate::error::BackupError;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;
use weaver_types::{ResourceType, ServerSpec};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Directory name format of one backup run
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";

#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
    retention: usize,
}

#[derive(Debug, Default)]
pub struct BackupReport {
    pub archives: Vec<PathBuf>,
    /// One message per source that could not be archived
    pub failures: Vec<String>,
    pub pruned: usize,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            root: root.into(),
            retention,
        }
    }

    pub async fn backup(&self, spec: &ServerSpec) -> BackupReport {
        self.backup_at(spec, Utc::now()).await
    }

    /// Archives every backup resource into `root/{server}/{timestamp}/{index}.zip`
    #[instrument(skip(self, spec), fields(server = %spec.server_id))]
    pub async fn backup_at(&self, spec: &ServerSpec, now: DateTime<Utc>) -> BackupReport {
        let mut sources = Vec::new();
        let mut unresolved = Vec::new();
        for resource in spec.resources_of(ResourceType::BackupPath) {
            match resource.resolve_path(&spec.install_dir) {
                Some(path) => sources.push(path),
                None => unresolved.push(format!(
                    "Backup resource '{}' has no path for this OS",
                    resource.name
                )),
            }
        }
        if sources.is_empty() {
            return BackupReport {
                failures: unresolved,
                ..BackupReport::default()
            };
        }

        let server_dir = self.root.join(spec.server_id.to_string());
        let run_dir = server_dir.join(now.format(TIMESTAMP_FORMAT).to_string());
        let retention = self.retention;

        let result = tokio::task::spawn_blocking(move || {
            let mut report = BackupReport {
                failures: unresolved,
                ..BackupReport::default()
            };
            if let Err(e) = std::fs::create_dir_all(&run_dir) {
                report
                    .failures
                    .push(BackupError::Io(run_dir.clone(), e).to_string());
                return report;
            }

            for (index, source) in sources.iter().enumerate() {
                let archive = run_dir.join(format!("{}.zip", index));
                match archive_path(source, &archive) {
                    Ok(()) => report.archives.push(archive),
                    Err(e) => {
                        warn!("Backup of {} failed: {}", source.display(), e);
                        report.failures.push(e.to_string());
                    }
                }
            }

            match prune(&server_dir, retention, &run_dir) {
                Ok(pruned) => report.pruned = pruned,
                Err(e) => report.failures.push(e.to_string()),
            }
            report
        })
        .await;

        match result {
            Ok(report) => {
                info!(
                    "💾 Backup finished: {} archives, {} failures, {} old runs pruned",
                    report.archives.len(),
                    report.failures.len(),
                    report.pruned
                );
                report
            }
            Err(e) => BackupReport {
                failures: vec![format!("Backup task failed: {}", e)],
                ..BackupReport::default()
            },
        }
    }
}

/// Zips a directory (without a base-directory entry) or a single file
pub fn archive_path(source: &Path, archive: &Path) -> Result<(), BackupError> {
    if !source.exists() {
        return Err(BackupError::MissingSource(source.to_path_buf()));
    }

    let file = File::create(archive).map_err(|e| BackupError::Io(archive.to_path_buf(), e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));
    let zip_err = |e| BackupError::Archive(archive.to_path_buf(), e);

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backup".to_string());
        zip.start_file(name, options).map_err(zip_err)?;
        copy_into(source, &mut zip)?;
    } else {
        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| BackupError::Walk(source.to_path_buf(), e))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();

            if entry.file_type().is_dir() {
                zip.add_directory(relative, options).map_err(zip_err)?;
            } else {
                zip.start_file(relative, options).map_err(zip_err)?;
                copy_into(entry.path(), &mut zip)?;
            }
        }
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}

fn copy_into(path: &Path, zip: &mut ZipWriter<File>) -> Result<(), BackupError> {
    let mut input = File::open(path).map_err(|e| BackupError::Io(path.to_path_buf(), e))?;
    io::copy(&mut input, zip).map_err(|e| BackupError::Io(path.to_path_buf(), e))?;
    Ok(())
}

/// Deletes the oldest timestamp directories beyond `retention`.
///
/// `current` is never deleted and counts towards the runs kept, so at
/// least one run survives even with a retention of zero.
pub fn prune(server_dir: &Path, retention: usize, current: &Path) -> Result<usize, BackupError> {
    let io_err = |e| BackupError::Io(server_dir.to_path_buf(), e);
    let mut runs: Vec<PathBuf> = std::fs::read_dir(server_dir)
        .map_err(io_err)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    runs.sort();

    let before = runs.len();
    runs.retain(|run| run != current);
    let keep = if runs.len() < before {
        retention.saturating_sub(1)
    } else {
        retention
    };

    let excess = runs.len().saturating_sub(keep);
    for old in &runs[..excess] {
        std::fs::remove_dir_all(old).map_err(|e| BackupError::Io(old.clone(), e))?;
    }
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;
    use weaver_types::{ContentType, GameId, GameSource, OsPaths, ResourceSpec, ServerId};

    fn backup_resource(path: &str) -> ResourceSpec {
        ResourceSpec {
            name: path.to_string(),
            paths: OsPaths::same(path),
            resource_type: ResourceType::BackupPath,
            content_type: ContentType::Raw,
            startup: false,
            startup_priority: 0,
            arguments: String::new(),
            load_existing: false,
            items: Vec::new(),
        }
    }

    fn spec(install_dir: &Path, resources: Vec<ResourceSpec>) -> ServerSpec {
        ServerSpec {
            server_id: ServerId::new(),
            game_id: GameId::new(),
            install_dir: install_dir.to_path_buf(),
            source: GameSource::Manual,
            ports: Vec::new(),
            resources,
        }
    }

    #[tokio::test]
    async fn test_backup_directory_and_file() {
        let install = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(install.path().join("saves/world")).unwrap();
        std::fs::write(install.path().join("saves/world/level.dat"), b"level").unwrap();
        std::fs::write(install.path().join("server.cfg"), b"cfg").unwrap();

        let spec = spec(
            install.path(),
            vec![backup_resource("saves"), backup_resource("server.cfg")],
        );
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let report = BackupManager::new(backups.path(), 5).backup_at(&spec, now).await;

        assert!(report.failures.is_empty(), "{:?}", report.failures);
        let run_dir = backups
            .path()
            .join(spec.server_id.to_string())
            .join("20240309_1405");
        assert_eq!(report.archives, vec![run_dir.join("0.zip"), run_dir.join("1.zip")]);

        let mut saves = zip::ZipArchive::new(File::open(run_dir.join("0.zip")).unwrap()).unwrap();
        let names: Vec<String> = saves.file_names().map(str::to_string).collect();
        assert!(names.iter().any(|n| n == "world/level.dat"));
        assert!(!names.iter().any(|n| n == "saves/" || n.is_empty()));
        let mut content = String::new();
        saves
            .by_name("world/level.dat")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "level");

        let single = zip::ZipArchive::new(File::open(run_dir.join("1.zip")).unwrap()).unwrap();
        assert_eq!(single.file_names().collect::<Vec<_>>(), vec!["server.cfg"]);
    }

    #[tokio::test]
    async fn test_missing_source_is_reported() {
        let install = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let spec = spec(install.path(), vec![backup_resource("nope")]);

        let report = BackupManager::new(backups.path(), 5).backup(&spec).await;
        assert!(report.archives.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("nope"));
    }

    #[tokio::test]
    async fn test_no_backup_resources_is_noop() {
        let install = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let report = BackupManager::new(backups.path(), 5)
            .backup(&spec(install.path(), Vec::new()))
            .await;
        assert!(report.archives.is_empty() && report.failures.is_empty());
        assert_eq!(std::fs::read_dir(backups.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["20240101_0000", "20240102_0000", "20240103_0000", "20240104_0000", "20240105_0000"] {
            std::fs::create_dir_all(dir.path().join(stamp)).unwrap();
        }

        let current = dir.path().join("20240105_0000");
        assert_eq!(prune(dir.path(), 2, &current).unwrap(), 3);
        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["20240104_0000", "20240105_0000"]);

        assert_eq!(prune(dir.path(), 2, &current).unwrap(), 0);
    }

    #[test]
    fn test_prune_never_removes_current_run() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["20240101_0000", "20240102_0000", "20240103_0000"] {
            std::fs::create_dir_all(dir.path().join(stamp)).unwrap();
        }

        // A clock set back makes the current run sort first
        let current = dir.path().join("20240101_0000");
        assert_eq!(prune(dir.path(), 0, &current).unwrap(), 2);
        assert!(current.is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_zero_retention_keeps_fresh_archives() {
        let install = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        std::fs::write(install.path().join("server.cfg"), b"cfg").unwrap();
        let spec = spec(install.path(), vec![backup_resource("server.cfg")]);

        let earlier = Utc.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap();
        let manager = BackupManager::new(backups.path(), 0);
        manager.backup_at(&spec, earlier).await;
        let report = manager.backup_at(&spec, now).await;

        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.pruned, 1);
        assert!(report.archives.iter().all(|a| a.is_file()));
    }

    #[tokio::test]
    async fn test_resource_without_os_path_is_reported() {
        let install = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        std::fs::write(install.path().join("server.cfg"), b"cfg").unwrap();
        let mut unmapped = backup_resource("");
        unmapped.name = "saves".to_string();

        let report = BackupManager::new(backups.path(), 5)
            .backup(&spec(install.path(), vec![unmapped.clone(), backup_resource("server.cfg")]))
            .await;
        assert_eq!(report.archives.len(), 1);
        assert_eq!(
            report.failures,
            vec!["Backup resource 'saves' has no path for this OS".to_string()]
        );

        let report = BackupManager::new(backups.path(), 5)
            .backup(&spec(install.path(), vec![unmapped]))
            .await;
        assert!(report.archives.is_empty());
        assert_eq!(report.failures.len(), 1);
    }
}

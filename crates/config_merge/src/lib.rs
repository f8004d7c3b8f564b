//! # Config Merge
//!
//! Reconciles a resource's resolved configuration items into the file the
//! game actually reads. Four on-disk formats are supported, selected by
//! [`ContentType`]:
//!
//! * **Raw** - the item key is a zero-based line number
//! * **Json** - a flat object, existing key order and scalar types kept
//! * **Ini** - sections and `key=value` lines, with `(k=v,...)` groups
//! * **Xml** - an element chain under the document root
//!
//! Every write goes through a temp file and a rename. A broken file is
//! reported and skipped; it never stops the rest of a batch.

mod atomic;
pub mod error;
mod ini;
mod json;
mod raw;
mod xml;

pub use error::MergeError;

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use weaver_types::{ConfigurationItem, ContentType, ResourceSpec, ResourceType};

/// One file to merge and the items to merge into it
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub content_type: ContentType,
    pub path: PathBuf,
    /// Start from the file on disk instead of an empty document
    pub load_existing: bool,
    pub items: Vec<ConfigurationItem>,
}

impl ConfigFile {
    /// Builds the merge target for a config resource, `None` for other
    /// resource types or when no path is declared for this OS.
    pub fn from_resource(resource: &ResourceSpec, install_dir: &Path) -> Option<Self> {
        if resource.resource_type != ResourceType::Config {
            return None;
        }
        Some(Self {
            content_type: resource.content_type,
            path: resource.resolve_path(install_dir)?,
            load_existing: resource.load_existing,
            items: resource.items.clone(),
        })
    }
}

/// Outcome of merging one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub path: PathBuf,
    /// False when the merged content matched the file already on disk
    pub written: bool,
    /// Items that could not be applied; the rest of the file was still written
    pub item_errors: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct Merged {
    pub contents: String,
    pub item_errors: Vec<String>,
}

/// Merge one file and write it if anything changed.
///
/// The file is read (when it exists), merged with `file.items` in its
/// format, and replaced through a temp file and rename only when the
/// merged text differs from what is on disk.
///
/// # Arguments
///
/// * `file` - the target path, its format and the items to merge
///
/// # Returns
///
/// A [`MergeReport`] listing the items that could not be applied, or a
/// [`MergeError`] when the file could not be read, parsed or written.
///
/// # Example
///
/// ```no_run
/// use config_merge::{apply, ConfigFile};
/// use weaver_types::{ConfigurationItem, ContentType};
///
/// let file = ConfigFile {
///     content_type: ContentType::Ini,
///     path: "server/Game.ini".into(),
///     load_existing: true,
///     items: vec![ConfigurationItem::new("MaxPlayers", "32").with_category("Server")],
/// };
/// let report = apply(&file)?;
/// assert!(report.item_errors.is_empty());
/// # Ok::<(), config_merge::MergeError>(())
/// ```
#[instrument(skip(file), fields(path = %file.path.display(), format = %file.content_type))]
pub fn apply(file: &ConfigFile) -> Result<MergeReport, MergeError> {
    let existing = atomic::read_existing(&file.path)?;
    let existing = existing.as_deref();

    let merged = match file.content_type {
        ContentType::Raw => raw::merge(existing, &file.items, file.load_existing),
        ContentType::Json => json::merge(&file.path, existing, &file.items, file.load_existing)?,
        ContentType::Ini => ini::merge(existing, &file.items, file.load_existing),
        ContentType::Xml => xml::merge(&file.path, existing, &file.items, file.load_existing)?,
    };

    let written = existing != Some(merged.contents.as_str());
    if written {
        atomic::write_atomic(&file.path, merged.contents.as_bytes())?;
        info!("📝 Wrote {} items to {}", file.items.len(), file.path.display());
    } else {
        debug!("{} already up to date", file.path.display());
    }

    for message in &merged.item_errors {
        warn!("{}", message);
    }

    Ok(MergeReport {
        path: file.path.clone(),
        written,
        item_errors: merged.item_errors,
    })
}

/// Merge every file, collecting one message per failed item or file.
///
/// An empty result means everything was applied.
pub fn apply_all(files: &[ConfigFile]) -> Vec<String> {
    let mut failures = Vec::new();
    for file in files {
        match apply(file) {
            Ok(report) => failures.extend(
                report
                    .item_errors
                    .into_iter()
                    .map(|e| format!("{}: {}", report.path.display(), e)),
            ),
            Err(e) => {
                warn!("Config merge failed: {}", e);
                failures.push(e.to_string());
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use weaver_types::OsPaths;

    fn file(path: PathBuf, content_type: ContentType, items: Vec<ConfigurationItem>) -> ConfigFile {
        ConfigFile {
            content_type,
            path,
            load_existing: true,
            items,
        }
    }

    #[test]
    fn test_raw_write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.cfg");
        let items = vec![
            ConfigurationItem::new("0", "hostname \"Weaver\""),
            ConfigurationItem::new("4", "sv_maxplayers 12"),
        ];

        let report = apply(&file(path.clone(), ContentType::Raw, items)).unwrap();
        assert!(report.written);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "hostname \"Weaver\"");
        assert_eq!(lines[1..4], ["", "", ""]);
        assert_eq!(lines[4], "sv_maxplayers 12");
    }

    #[test]
    fn test_json_unchanged_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{\"port\": 2456}").unwrap();

        let report = apply(&file(
            path.clone(),
            ContentType::Json,
            vec![ConfigurationItem::new("port", "2456")],
        ))
        .unwrap();

        assert!(!report.written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"port\": 2456}");
    }

    #[test]
    fn test_apply_all_continues_past_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{ not json").unwrap();
        let good = dir.path().join("good.ini");

        let failures = apply_all(&[
            file(broken, ContentType::Json, vec![ConfigurationItem::new("a", "b")]),
            file(
                good.clone(),
                ContentType::Ini,
                vec![ConfigurationItem::new("Port", "1").with_category("Server")],
            ),
        ]);

        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("broken.json"));
        assert_eq!(fs::read_to_string(&good).unwrap(), "[Server]\nPort=1\n");
    }

    #[test]
    fn test_from_resource_only_for_config() {
        let install_dir = Path::new("/srv/game");
        let mut resource = ResourceSpec {
            name: "cfg".to_string(),
            paths: OsPaths::same("cfg/server.cfg"),
            resource_type: ResourceType::Config,
            content_type: ContentType::Ini,
            startup: false,
            startup_priority: 0,
            arguments: String::new(),
            load_existing: true,
            items: vec![ConfigurationItem::new("a", "b")],
        };

        let target = ConfigFile::from_resource(&resource, install_dir).unwrap();
        assert_eq!(target.path, install_dir.join("cfg/server.cfg"));
        assert_eq!(target.content_type, ContentType::Ini);

        resource.resource_type = ResourceType::Executable;
        assert!(ConfigFile::from_resource(&resource, install_dir).is_none());
    }
}

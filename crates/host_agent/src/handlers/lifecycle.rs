use crate::error::WorkFailure;
use crate::installer::split_command_line;
use crate::process::spawn_detached;
use std::path::Path;
use tracing::{info, warn};
use weaver_types::ServerSpec;

/// Launches every startup resource, lowest priority first.
///
/// A resource that cannot be launched does not stop the others; all
/// failures are reported together.
pub fn start(spec: &ServerSpec) -> Result<(), WorkFailure> {
    let startup = spec.startup_resources();
    if startup.is_empty() {
        return Err(WorkFailure::single(format!(
            "Server {} has no startup resources",
            spec.server_id
        )));
    }

    let mut failures = Vec::new();
    for resource in startup {
        let Some(path) = resource.resolve_path(&spec.install_dir) else {
            failures.push(format!(
                "Startup resource '{}' has no path for this OS",
                resource.name
            ));
            continue;
        };
        if !path.is_file() {
            failures.push(format!(
                "Startup resource '{}' not found at {}",
                resource.name,
                path.display()
            ));
            continue;
        }

        let working_dir = path.parent().unwrap_or(&spec.install_dir);
        match spawn_detached(&path, &split_command_line(&resource.arguments), working_dir) {
            Ok(pid) => info!("▶️ Started '{}' as pid {}", resource.name, pid),
            Err(e) => {
                warn!("{}", e);
                failures.push(e.to_string());
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(WorkFailure(failures))
    }
}

/// Removes the install directory; one that is already gone is fine
pub async fn uninstall_files(install_dir: &Path) -> Result<(), WorkFailure> {
    match tokio::fs::remove_dir_all(install_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkFailure::single(format!(
            "Failed to remove {}: {}",
            install_dir.display(),
            e
        ))),
    }
}

use crate::error::WorkFailure;
use config_merge::ConfigFile;
use weaver_types::{ResourceType, ServerSpec};

/// Merges every config resource of the server into its file
pub async fn configure(spec: &ServerSpec) -> Result<(), WorkFailure> {
    let mut files = Vec::new();
    let mut failures = Vec::new();
    for resource in spec.resources_of(ResourceType::Config) {
        match ConfigFile::from_resource(resource, &spec.install_dir) {
            Some(file) => files.push(file),
            None => failures.push(format!(
                "Config resource '{}' has no path for this OS",
                resource.name
            )),
        }
    }

    if !files.is_empty() {
        let merged = tokio::task::spawn_blocking(move || config_merge::apply_all(&files))
            .await
            .map_err(|e| WorkFailure::single(format!("Config merge task failed: {}", e)))?;
        failures.extend(merged);
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(WorkFailure(failures))
    }
}

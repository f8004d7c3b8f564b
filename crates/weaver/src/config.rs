//! Configuration file of the `weaver` binary.
//!
//! One TOML file carries a section for each mode plus logging. A missing
//! file is created with defaults on first start, and every section falls
//! back to its defaults when left out.

use crate::cli::{CliArgs, Mode};
use anyhow::{bail, Context};
use control_plane::ControlPlaneConfig;
use host_agent::dispatcher::DispatchSettings;
use host_agent::installer::InstallerConfig;
use host_agent::HostAgentConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub control: ControlSettings,
    pub host: HostSettings,
    pub logging: LoggingSettings,
}

/// Control plane settings. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub bind_address: String,
    /// Base URL embedded in registration links
    pub public_url: String,
    pub operator_key: String,
    pub token_lifetime_secs: u64,
    pub max_batch_size: usize,
    pub work_retention_secs: u64,
    pub stale_work_alert_secs: u64,
    pub host_stale_after_secs: u64,
    pub housekeeping_interval_secs: u64,
    pub catalog_path: Option<String>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        let defaults = ControlPlaneConfig::default();
        Self {
            bind_address: defaults.bind_address.to_string(),
            public_url: defaults.public_url,
            operator_key: String::new(),
            token_lifetime_secs: defaults.token_lifetime.as_secs(),
            max_batch_size: defaults.max_batch_size,
            work_retention_secs: defaults.work_retention.as_secs(),
            stale_work_alert_secs: defaults.stale_work_alert.as_secs(),
            host_stale_after_secs: defaults.host_stale_after.as_secs(),
            housekeeping_interval_secs: defaults.housekeeping_interval.as_secs(),
            catalog_path: None,
        }
    }
}

/// Host agent settings. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub settings_path: String,
    pub poll_interval_secs: u64,
    pub telemetry_interval_secs: u64,
    pub renew_threshold_secs: u64,
    pub request_timeout_secs: u64,
    pub max_batch_size: usize,
    /// Work items of one batch run concurrently up to this many
    pub max_simultaneous: usize,
    pub backup_root: String,
    pub backup_retention: usize,
    pub installer_path: String,
    pub installer_download_url: String,
}

impl Default for HostSettings {
    fn default() -> Self {
        let defaults = HostAgentConfig::default();
        Self {
            settings_path: defaults.settings_path.display().to_string(),
            poll_interval_secs: defaults.poll_interval.as_secs(),
            telemetry_interval_secs: defaults.telemetry_interval.as_secs(),
            renew_threshold_secs: defaults.renew_threshold.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            max_batch_size: defaults.dispatch.max_batch_size,
            max_simultaneous: defaults.dispatch.max_simultaneous,
            backup_root: defaults.backup_root.display().to_string(),
            backup_retention: defaults.backup_retention,
            installer_path: defaults.installer.executable.display().to_string(),
            installer_download_url: defaults.installer.download_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads `path`, writing the defaults there first if it does not exist
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file values
    pub fn apply_overrides(&mut self, args: &CliArgs) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        match &args.mode {
            Mode::Control {
                bind_address,
                public_url,
            } => {
                if let Some(bind_address) = bind_address {
                    self.control.bind_address = bind_address.clone();
                }
                if let Some(public_url) = public_url {
                    self.control.public_url = public_url.clone();
                }
            }
            Mode::Host { settings_path } => {
                if let Some(path) = settings_path {
                    self.host.settings_path = path.display().to_string();
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.control.bind_address.parse::<SocketAddr>().is_err() {
            bail!("Invalid bind address: {}", self.control.bind_address);
        }
        if !(self.control.public_url.starts_with("http://")
            || self.control.public_url.starts_with("https://"))
        {
            bail!(
                "Public URL must start with http:// or https://: {}",
                self.control.public_url
            );
        }
        if self.control.max_batch_size == 0 || self.host.max_batch_size == 0 {
            bail!("Batch sizes must be at least 1");
        }
        if self.host.max_simultaneous == 0 {
            bail!("max_simultaneous must be at least 1");
        }
        if self.host.poll_interval_secs == 0 || self.host.telemetry_interval_secs == 0 {
            bail!("Host intervals must be at least one second");
        }
        if self.control.housekeeping_interval_secs == 0 {
            bail!("Housekeeping interval must be at least one second");
        }
        if self.host.settings_path.is_empty() {
            bail!("Host settings path cannot be empty");
        }
        if self.host.backup_retention == 0 {
            bail!("backup_retention must keep at least one backup run");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            );
        }
        Ok(())
    }

    pub fn to_control_plane_config(&self) -> anyhow::Result<ControlPlaneConfig> {
        Ok(ControlPlaneConfig {
            bind_address: self
                .control
                .bind_address
                .parse()
                .with_context(|| format!("Invalid bind address: {}", self.control.bind_address))?,
            public_url: self.control.public_url.clone(),
            operator_key: self.control.operator_key.clone(),
            token_lifetime: Duration::from_secs(self.control.token_lifetime_secs),
            max_batch_size: self.control.max_batch_size,
            work_retention: Duration::from_secs(self.control.work_retention_secs),
            stale_work_alert: Duration::from_secs(self.control.stale_work_alert_secs),
            host_stale_after: Duration::from_secs(self.control.host_stale_after_secs),
            housekeeping_interval: Duration::from_secs(self.control.housekeeping_interval_secs),
            catalog_path: self.control.catalog_path.as_ref().map(PathBuf::from),
        })
    }

    pub fn to_host_agent_config(&self) -> HostAgentConfig {
        HostAgentConfig {
            settings_path: PathBuf::from(&self.host.settings_path),
            poll_interval: Duration::from_secs(self.host.poll_interval_secs),
            telemetry_interval: Duration::from_secs(self.host.telemetry_interval_secs),
            renew_threshold: Duration::from_secs(self.host.renew_threshold_secs),
            request_timeout: Duration::from_secs(self.host.request_timeout_secs),
            dispatch: DispatchSettings {
                max_batch_size: self.host.max_batch_size,
                max_simultaneous: self.host.max_simultaneous,
            },
            backup_root: PathBuf::from(&self.host.backup_root),
            backup_retention: self.host.backup_retention,
            installer: InstallerConfig {
                executable: PathBuf::from(&self.host.installer_path),
                download_url: self.host.installer_download_url.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let control = config.to_control_plane_config().unwrap();
        assert_eq!(control.bind_address.port(), 8090);
        assert_eq!(control.max_batch_size, 10);

        let host = config.to_host_agent_config();
        assert_eq!(host.dispatch.max_simultaneous, 1);
        assert_eq!(host.poll_interval, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weaver.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weaver.toml");
        tokio::fs::write(
            &path,
            "[control]\noperator_key = \"s3cret\"\nmax_batch_size = 25\n\n[host]\nmax_simultaneous = 4\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config.control.operator_key, "s3cret");
        assert_eq!(config.control.max_batch_size, 25);
        assert_eq!(config.control.bind_address, "127.0.0.1:8090");
        assert_eq!(config.host.max_simultaneous, 4);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.control.bind_address = "nowhere".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.control.public_url = "ftp://fleet".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.host.max_simultaneous = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.host.backup_retention = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("backup_retention"));
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(&CliArgs {
            config_path: PathBuf::from("weaver.toml"),
            log_level: Some("debug".to_string()),
            json_logs: true,
            mode: Mode::Host {
                settings_path: Some(PathBuf::from("/var/lib/weaver/host.toml")),
            },
        });
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.host.settings_path, "/var/lib/weaver/host.toml");
        assert_eq!(config.control, ControlSettings::default());
    }
}

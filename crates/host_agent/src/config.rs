//! Runtime configuration of the host agent.

use crate::dispatcher::DispatchSettings;
use crate::installer::InstallerConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HostAgentConfig {
    /// TOML file holding the control plane URL and host credentials
    pub settings_path: PathBuf,
    pub poll_interval: Duration,
    pub telemetry_interval: Duration,
    /// Renew the access token when less than this remains
    pub renew_threshold: Duration,
    pub request_timeout: Duration,
    pub dispatch: DispatchSettings,
    pub backup_root: PathBuf,
    /// Backup runs kept per server
    pub backup_retention: usize,
    pub installer: InstallerConfig,
}

impl Default for HostAgentConfig {
    fn default() -> Self {
        let installer_name = if cfg!(windows) {
            "steamcmd.exe"
        } else {
            "steamcmd.sh"
        };
        let installer_url = if cfg!(windows) {
            "https://steamcdn-a.akamaihd.net/client/installer/steamcmd.zip"
        } else {
            "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz"
        };

        Self {
            settings_path: PathBuf::from("weaver-host.toml"),
            poll_interval: Duration::from_secs(10),
            telemetry_interval: Duration::from_secs(15),
            renew_threshold: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            dispatch: DispatchSettings::default(),
            backup_root: PathBuf::from("backups"),
            backup_retention: 5,
            installer: InstallerConfig {
                executable: PathBuf::from("steamcmd").join(installer_name),
                download_url: installer_url.to_string(),
            },
        }
    }
}

//! Runtime configuration of the control plane.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Address the HTTP API listens on
    pub bind_address: SocketAddr,
    /// Externally reachable base URL, used to build registration links
    pub public_url: String,
    /// Value of the `x-operator-key` header admin routes require
    pub operator_key: String,
    /// Lifetime of host bearer tokens
    pub token_lifetime: Duration,
    /// Upper bound on work items handed out per check-in
    pub max_batch_size: usize,
    /// Terminal work older than this is purged
    pub work_retention: Duration,
    /// `InProgress` work older than this raises an operator warning
    pub stale_work_alert: Duration,
    /// Hosts silent for longer than this are marked `Unknown`
    pub host_stale_after: Duration,
    pub housekeeping_interval: Duration,
    /// Optional JSON file of games, profiles, servers and client artifacts
    pub catalog_path: Option<PathBuf>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8090)),
            public_url: "http://127.0.0.1:8090".to_string(),
            operator_key: String::new(),
            token_lifetime: Duration::from_secs(3600),
            max_batch_size: 10,
            work_retention: Duration::from_secs(7 * 24 * 3600),
            stale_work_alert: Duration::from_secs(3600),
            host_stale_after: Duration::from_secs(300),
            housekeeping_interval: Duration::from_secs(60),
            catalog_path: None,
        }
    }
}

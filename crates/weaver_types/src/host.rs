//! Hosts, their one-time registrations and connectivity states.

use crate::ids::{AccountId, HostId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime classification shared by hosts and game servers.
///
/// Hosts only ever use `Unregistered`, `Unknown` and
/// `InternallyConnectable`; servers use the full range produced by the
/// host-side state detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectivityState {
    Unregistered,
    #[default]
    Unknown,
    Uninstalled,
    Shutdown,
    Stalled,
    InternallyConnectable,
}

impl ConnectivityState {
    /// Whether at least one process of the server is alive
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Stalled | Self::InternallyConnectable)
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unregistered => "unregistered",
            Self::Unknown => "unknown",
            Self::Uninstalled => "uninstalled",
            Self::Shutdown => "shutdown",
            Self::Stalled => "stalled",
            Self::InternallyConnectable => "internally-connectable",
        };
        f.write_str(name)
    }
}

/// Server-side record of a host's shared secret.
///
/// Only the salted hash is kept; the plain token lives on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCredential {
    /// Random salt, hex encoded
    pub salt: String,
    /// SHA-256 of `salt || token`, hex encoded
    pub hash: String,
    /// When this credential was issued
    pub issued_at: DateTime<Utc>,
}

/// A machine running the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub account_id: AccountId,
    /// Addresses the host was last seen from
    pub addresses: Vec<String>,
    /// `None` until the registration has been confirmed
    pub credential: Option<HostCredential>,
    pub state: ConnectivityState,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker; deleted hosts can no longer authenticate
    pub deleted: bool,
}

impl Host {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            id: HostId::new(),
            account_id,
            addresses: Vec::new(),
            credential: None,
            state: ConnectivityState::Unregistered,
            last_seen: None,
            created_at: Utc::now(),
            deleted: false,
        }
    }
}

/// Single-use activation record handed to an operator as a URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRegistration {
    pub host_id: HostId,
    /// Unique among active registrations
    pub description: String,
    pub activation_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub activated_from: Option<String>,
}

impl HostRegistration {
    /// Flips the record to consumed and stamps the activation metadata
    pub fn consume(&mut self, remote_ip: Option<String>) {
        self.active = false;
        self.activated_at = Some(Utc::now());
        self.activated_from = remote_ip;
    }
}

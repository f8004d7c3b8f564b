//! Request and response bodies exchanged between host agents and the
//! control plane. All bodies are camelCase JSON; binary fields travel as
//! standard base64.

use crate::host::ConnectivityState;
use crate::ids::{AccountId, HostId, ServerId, WorkId};
use crate::work::{WeaverWork, WorkStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serde adapter storing `Vec<u8>` as a base64 string
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Operator request for a new one-time registration link
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub account_id: AccountId,
    pub description: String,
}

/// One-time URL handed to an operator for a new host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationTicket {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRegistrationRequest {
    pub host_id: HostId,
    pub register_key: String,
}

/// The permanent credential pair a host keeps after registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostCredentials {
    pub host_id: HostId,
    pub host_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
    pub refresh_token_expiry_time_utc: DateTime<Utc>,
}

/// Latest host resource sample
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub cpu_percent: f32,
    pub cpu_count: usize,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    #[serde(default)]
    pub sampled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStateReport {
    pub server_id: ServerId,
    pub state: ConnectivityState,
}

/// Heartbeat body sent before every work pull
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    #[serde(default)]
    pub usage: ResourceUsage,
    #[serde(default)]
    pub servers: Vec<ServerStateReport>,
    /// Upper bound the host is willing to take in this batch
    #[serde(default)]
    pub max_items: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub work: Vec<WeaverWork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkStatusUpdate {
    pub work_id: WorkId,
    pub status: WorkStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ArtifactFormat {
    #[default]
    File,
    Zip,
}

/// A manually uploaded game client, as served to hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualDownload {
    pub file_name: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Expected SHA-256 of `content`, hex encoded
    pub sha256: String,
    #[serde(default)]
    pub format: ArtifactFormat,
}

/// Admin request body for server actions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub validate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueuedWork {
    pub work_id: WorkId,
}

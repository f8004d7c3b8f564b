//! Error types of the host agent.

use std::io::Error as IoError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the control plane
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request to control plane failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Control plane answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("No control plane URL configured")]
    NoServerUrl,
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401, .. })
    }
}

/// Failures reading or persisting the host settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {0}: {1}")]
    Read(PathBuf, IoError),
    #[error("Failed to parse settings file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to write settings file {0}: {1}")]
    Write(PathBuf, IoError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// No stored credentials and no registration link: the normal waiting state
    #[error("Host is not registered yet")]
    NotRegistered,
    #[error("Stored host credentials are malformed: {0}")]
    MalformedCredentials(String),
    #[error("Invalid registration URL '{0}'")]
    InvalidRegisterUrl(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to enumerate processes: {0}")]
    Enumeration(String),
    #[error("Failed to start {0}: {1}")]
    Spawn(PathBuf, IoError),
}

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("Failed to download installer from {0}: {1}")]
    Download(String, String),
    #[error("Unsupported installer archive '{0}', expected .zip or .tar.gz")]
    UnsupportedArchive(String),
    #[error("Failed to extract {0}: {1}")]
    Extract(PathBuf, String),
    #[error("Installer binary {0} is missing after bootstrap")]
    MissingBinary(PathBuf),
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, IoError),
    #[error("Failed to start installer {0}: {1}")]
    Spawn(PathBuf, IoError),
    #[error("Failed to read installer output: {0}")]
    Read(IoError),
    #[error("Installer reported errors: {0}")]
    Stderr(String),
}

#[derive(Debug, Error)]
pub enum ManualInstallError {
    #[error("Failed to fetch client artifact: {0}")]
    Fetch(#[from] AuthError),
    #[error("Artifact file name '{0}' is not a plain file name")]
    InvalidFileName(String),
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, IoError),
    #[error("Artifact hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("Failed to extract {0}: {1}")]
    Extract(PathBuf, zip::result::ZipError),
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Backup source {0} does not exist")]
    MissingSource(PathBuf),
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, IoError),
    #[error("Failed to archive {0}: {1}")]
    Archive(PathBuf, zip::result::ZipError),
    #[error("Failed to walk {0}: {1}")]
    Walk(PathBuf, walkdir::Error),
}

/// A failed work item: every message collected while running it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .0.join("\n"))]
pub struct WorkFailure(pub Vec<String>);

impl WorkFailure {
    pub fn single(message: impl Into<String>) -> Self {
        Self(vec![message.into()])
    }
}

impl From<String> for WorkFailure {
    fn from(message: String) -> Self {
        Self::single(message)
    }
}

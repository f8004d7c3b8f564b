//! Error types for the control plane

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use weaver_types::{GameId, HostId, PayloadError, ProfileId, ServerId, WorkId};

/// Storage failures surfaced by a repository implementation
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Work item {0} not found")]
    NotFound(WorkId),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Host registration and credential failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid registration request: {0}")]
    Validation(String),

    #[error("An active registration named '{0}' already exists")]
    DuplicateDescription(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Host {0} not found")]
    HostNotFound(HostId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Server {0} not found")]
    ServerNotFound(ServerId),

    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("Profile {0} not found")]
    ProfileNotFound(ProfileId),

    #[error("Resource '{0}' is not declared on any profile layer")]
    ResourceNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Failures while turning an operator action into queued work
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Server {0} not found")]
    ServerNotFound(ServerId),

    #[error("Host {0} not found")]
    HostNotFound(HostId),

    #[error("Game {0} not found")]
    GameNotFound(GameId),

    #[error("No client artifact uploaded for game {0}")]
    ArtifactNotFound(GameId),

    #[error("Unknown server action '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors produced by HTTP handlers, rendered as `{"error": message}`
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, axum::Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(m) => AppError::Conflict(m),
            RepositoryError::Backend(m) => AppError::Internal(m),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotFound(_) => AppError::NotFound(e.to_string()),
            QueueError::Payload(_) => AppError::Internal(e.to_string()),
            QueueError::Repository(e) => e.into(),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(_) => AppError::BadRequest(e.to_string()),
            AuthError::DuplicateDescription(_) => AppError::Conflict(e.to_string()),
            AuthError::Unauthorized(_) => AppError::Unauthorized(e.to_string()),
            AuthError::HostNotFound(_) => AppError::NotFound(e.to_string()),
            AuthError::Repository(e) => e.into(),
        }
    }
}

impl From<ProfileError> for AppError {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::Repository(e) => e.into(),
            _ => AppError::NotFound(e.to_string()),
        }
    }
}

impl From<ActionError> for AppError {
    fn from(e: ActionError) -> Self {
        match e {
            ActionError::UnknownAction(_) => AppError::BadRequest(e.to_string()),
            ActionError::Profile(e) => e.into(),
            ActionError::Queue(e) => e.into(),
            ActionError::Repository(e) => e.into(),
            _ => AppError::NotFound(e.to_string()),
        }
    }
}

/// Failures while seeding the catalog from disk
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {0}: {1}")]
    FileRead(std::path::PathBuf, std::io::Error),

    #[error("Failed to parse catalog {0}: {1}")]
    Parse(std::path::PathBuf, serde_json::Error),

    #[error("Failed to read client artifact {0}: {1}")]
    ArtifactRead(std::path::PathBuf, std::io::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to bind {0}: {1}")]
    Bind(std::net::SocketAddr, std::io::Error),

    #[error("HTTP server failed: {0}")]
    Server(std::io::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

//! Authenticated calls: every request is preceded by a token freshness check.

use crate::api::ControlPlaneApi;
use crate::auth::AuthClient;
use crate::error::{ApiError, AuthError};
use async_trait::async_trait;
use std::sync::Arc;
use weaver_types::wire::{CheckInRequest, CheckInResponse, ManualDownload, WorkStatusUpdate};
use weaver_types::{GameId, ServerId};

/// Where manual installs fetch their client artifact from
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch_client(&self, game_id: GameId) -> Result<ManualDownload, AuthError>;
}

/// Control-plane records a handler may change
#[async_trait]
pub trait ServerRecords: Send + Sync {
    /// Asks the control plane to drop an uninstalled server
    async fn delete_server(&self, server_id: ServerId) -> Result<(), AuthError>;
}

pub struct HostSession {
    auth: Arc<AuthClient>,
    api: Arc<dyn ControlPlaneApi>,
}

impl HostSession {
    pub fn new(auth: Arc<AuthClient>, api: Arc<dyn ControlPlaneApi>) -> Self {
        Self { auth, api }
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    /// Forgets a token the control plane no longer accepts
    async fn observe<T>(&self, result: Result<T, ApiError>) -> Result<T, AuthError> {
        if let Err(e) = &result {
            if e.is_unauthorized() {
                self.auth.invalidate().await;
            }
        }
        Ok(result?)
    }

    pub async fn check_in(&self, request: &CheckInRequest) -> Result<CheckInResponse, AuthError> {
        let token = self.auth.ensure_token_fresh().await?;
        let result = self.api.check_in(&token, request).await;
        self.observe(result).await
    }

    pub async fn report_status(&self, update: &WorkStatusUpdate) -> Result<(), AuthError> {
        let token = self.auth.ensure_token_fresh().await?;
        let result = self.api.report_status(&token, update).await;
        self.observe(result).await
    }
}

#[async_trait]
impl ArtifactSource for HostSession {
    async fn fetch_client(&self, game_id: GameId) -> Result<ManualDownload, AuthError> {
        let token = self.auth.ensure_token_fresh().await?;
        let result = self.api.client_download(&token, game_id).await;
        self.observe(result).await
    }
}

#[async_trait]
impl ServerRecords for HostSession {
    async fn delete_server(&self, server_id: ServerId) -> Result<(), AuthError> {
        let token = self.auth.ensure_token_fresh().await?;
        let result = self.api.delete_server(&token, server_id).await;
        self.observe(result).await
    }
}

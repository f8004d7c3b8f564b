//! HTTP client for the control plane's host routes.

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;
use weaver_types::wire::{
    CheckInRequest, CheckInResponse, ConfirmRegistrationRequest, HostCredentials,
    ManualDownload, TokenResponse, WorkStatusUpdate,
};
use weaver_types::{GameId, ServerId};

/// The control plane as seen from a host.
///
/// Registration and token calls take no bearer token; everything else is
/// authenticated with one.
#[async_trait]
pub trait ControlPlaneApi: Send + Sync {
    /// Points subsequent calls at a new control plane
    fn set_server_url(&self, server_url: &str);

    async fn confirm_registration(
        &self,
        server_url: &str,
        request: &ConfirmRegistrationRequest,
    ) -> Result<HostCredentials, ApiError>;

    async fn request_token(&self, credentials: &HostCredentials) -> Result<TokenResponse, ApiError>;

    async fn check_in(
        &self,
        token: &str,
        request: &CheckInRequest,
    ) -> Result<CheckInResponse, ApiError>;

    async fn report_status(&self, token: &str, update: &WorkStatusUpdate) -> Result<(), ApiError>;

    async fn client_download(&self, token: &str, game_id: GameId)
        -> Result<ManualDownload, ApiError>;

    async fn delete_server(&self, token: &str, server_id: ServerId) -> Result<(), ApiError>;
}

/// reqwest-backed [`ControlPlaneApi`].
///
/// Holds two clients: `anonymous` never carries credentials, so fetching a
/// token can never loop back into a token refresh.
pub struct HttpControlPlane {
    anonymous: Client,
    authenticated: Client,
    server_url: RwLock<Option<String>>,
}

impl HttpControlPlane {
    pub fn new(server_url: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let build = || Client::builder().timeout(timeout).build();
        Ok(Self {
            anonymous: build()?,
            authenticated: build()?,
            server_url: RwLock::new(server_url.map(|u| u.trim_end_matches('/').to_string())),
        })
    }

    fn url(&self, path: &str) -> Result<String, ApiError> {
        let base = self
            .server_url
            .read()
            .map_err(|_| ApiError::NoServerUrl)?
            .clone()
            .ok_or(ApiError::NoServerUrl)?;
        Ok(format!("{}{}", base, path))
    }

    async fn post_json<B, T>(&self, builder: RequestBuilder, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = checked(builder.json(body).send().await?).await?;
        Ok(response.json().await?)
    }
}

/// Turns non-2xx responses into [`ApiError::Status`] carrying the body's `error`
async fn checked(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ControlPlaneApi for HttpControlPlane {
    fn set_server_url(&self, server_url: &str) {
        if let Ok(mut current) = self.server_url.write() {
            *current = Some(server_url.trim_end_matches('/').to_string());
        }
    }

    async fn confirm_registration(
        &self,
        server_url: &str,
        request: &ConfirmRegistrationRequest,
    ) -> Result<HostCredentials, ApiError> {
        let url = format!(
            "{}/api/host/register/confirm",
            server_url.trim_end_matches('/')
        );
        debug!("Confirming registration at {}", url);
        self.post_json(self.anonymous.post(url), request).await
    }

    async fn request_token(&self, credentials: &HostCredentials) -> Result<TokenResponse, ApiError> {
        let url = self.url("/api/host/token")?;
        self.post_json(self.anonymous.post(url), credentials).await
    }

    async fn check_in(
        &self,
        token: &str,
        request: &CheckInRequest,
    ) -> Result<CheckInResponse, ApiError> {
        let url = self.url("/api/host/checkin")?;
        self.post_json(self.authenticated.post(url).bearer_auth(token), request)
            .await
    }

    async fn report_status(&self, token: &str, update: &WorkStatusUpdate) -> Result<(), ApiError> {
        let url = self.url("/api/host/work/status")?;
        let request = self.authenticated.post(url).bearer_auth(token).json(update);
        checked(request.send().await?).await?;
        Ok(())
    }

    async fn client_download(
        &self,
        token: &str,
        game_id: GameId,
    ) -> Result<ManualDownload, ApiError> {
        let url = self.url(&format!("/api/host/games/{}/client", game_id))?;
        let response = checked(self.authenticated.get(url).bearer_auth(token).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn delete_server(&self, token: &str, server_id: ServerId) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/host/servers/{}", server_id))?;
        checked(self.authenticated.delete(url).bearer_auth(token).send().await?).await?;
        Ok(())
    }
}

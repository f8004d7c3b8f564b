//! Host-side registration and token handling.
//!
//! A host moves through `Unregistered -> PendingActivation -> Registered`
//! once, driven by the settings file, and then cycles between holding a
//! valid token and renewing one that is about to expire.

use crate::api::ControlPlaneApi;
use crate::error::AuthError;
use crate::settings::{HostSettings, SettingsStore};
use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use weaver_types::wire::{ConfirmRegistrationRequest, HostCredentials};
use weaver_types::HostId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Neither credentials nor a registration link
    Unregistered,
    /// A registration link is waiting to be confirmed
    PendingActivation,
    /// Credentials stored, no token held
    Registered,
    TokenValid,
    /// Token held but inside the renewal window
    TokenExpiring,
}

#[derive(Debug, Clone)]
struct HeldToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Parsed form of a one-time registration link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLink {
    /// `scheme://authority` the link points at
    pub server_url: String,
    pub host_id: HostId,
    pub register_key: String,
}

impl RegisterLink {
    pub fn parse(link: &str) -> Result<Self, AuthError> {
        let invalid = || AuthError::InvalidRegisterUrl(link.to_string());
        let url = Url::parse(link.trim()).map_err(|_| invalid())?;

        let host = url.host_str().ok_or_else(invalid)?;
        let server_url = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        let mut host_id = None;
        let mut register_key = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "hostId" => host_id = value.parse::<HostId>().ok(),
                "registerKey" => register_key = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            server_url,
            host_id: host_id.ok_or_else(invalid)?,
            register_key: register_key.filter(|k| !k.is_empty()).ok_or_else(invalid)?,
        })
    }
}

/// Reads the stored `(host_id, host_key)` pair.
///
/// `Ok(None)` when nothing is stored; a half-filled or unparseable pair is
/// [`AuthError::MalformedCredentials`].
pub fn stored_credentials(settings: &HostSettings) -> Result<Option<HostCredentials>, AuthError> {
    let host_id = settings.auth.host_id.as_deref().map(str::trim);
    let host_key = settings.auth.host_key.as_deref().map(str::trim);

    match (host_id, host_key) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(AuthError::MalformedCredentials(
            "host_id is set but host_key is missing".to_string(),
        )),
        (None, Some(_)) => Err(AuthError::MalformedCredentials(
            "host_key is set but host_id is missing".to_string(),
        )),
        (Some(id), Some(key)) => {
            let host_id = id.parse::<HostId>().map_err(|_| {
                AuthError::MalformedCredentials(format!("host_id '{}' is not a valid id", id))
            })?;
            if key.is_empty() {
                return Err(AuthError::MalformedCredentials(
                    "host_key is empty".to_string(),
                ));
            }
            Ok(Some(HostCredentials {
                host_id,
                host_token: key.to_string(),
            }))
        }
    }
}

pub struct AuthClient {
    settings: Arc<SettingsStore>,
    api: Arc<dyn ControlPlaneApi>,
    token: RwLock<Option<HeldToken>>,
    /// Held while confirming a link or renewing the token
    refresh: Mutex<()>,
    renew_threshold: Duration,
}

impl AuthClient {
    pub fn new(
        settings: Arc<SettingsStore>,
        api: Arc<dyn ControlPlaneApi>,
        renew_threshold: Duration,
    ) -> Self {
        Self {
            settings,
            api,
            token: RwLock::new(None),
            refresh: Mutex::new(()),
            renew_threshold,
        }
    }

    pub async fn state(&self) -> AuthState {
        if let Some(held) = self.token.read().await.as_ref() {
            return if held.expires_at - Utc::now() < self.renew_threshold {
                AuthState::TokenExpiring
            } else {
                AuthState::TokenValid
            };
        }

        let settings = self.settings.snapshot().await;
        if settings.auth.host_id.is_some() || settings.auth.host_key.is_some() {
            AuthState::Registered
        } else if settings.auth.register_url.is_some() {
            AuthState::PendingActivation
        } else {
            AuthState::Unregistered
        }
    }

    /// Consumes a one-time registration link and stores the permanent pair
    #[instrument(skip(self, link))]
    pub async fn confirm_registration(&self, link: &str) -> Result<HostCredentials, AuthError> {
        let link = RegisterLink::parse(link)?;
        let request = ConfirmRegistrationRequest {
            host_id: link.host_id,
            register_key: link.register_key.clone(),
        };

        let credentials = self
            .api
            .confirm_registration(&link.server_url, &request)
            .await?;

        self.settings
            .update(|s| {
                s.general.server_url = Some(link.server_url.clone());
                s.auth.host_id = Some(credentials.host_id.to_string());
                s.auth.host_key = Some(credentials.host_token.clone());
                s.auth.register_url = None;
            })
            .await?;
        self.api.set_server_url(&link.server_url);

        info!(
            "✅ Registered as host {} with {}",
            credentials.host_id, link.server_url
        );
        Ok(credentials)
    }

    /// Stored credentials, confirming a pending registration link first.
    ///
    /// With credentials already stored the link is never used, so a retry
    /// after a crash falls through to plain token acquisition.
    pub async fn credentials(&self) -> Result<HostCredentials, AuthError> {
        let settings = self.settings.snapshot().await;
        if let Some(credentials) = stored_credentials(&settings)? {
            return Ok(credentials);
        }
        match settings.auth.register_url {
            Some(link) => self.confirm_registration(&link).await,
            None => Err(AuthError::NotRegistered),
        }
    }

    /// Exchanges the permanent pair for a bearer token
    pub async fn get_token(&self, credentials: &HostCredentials) -> Result<String, AuthError> {
        let response = self.api.request_token(credentials).await?;
        debug!(
            "Token acquired, valid until {}",
            response.refresh_token_expiry_time_utc
        );
        *self.token.write().await = Some(HeldToken {
            token: response.token.clone(),
            expires_at: response.refresh_token_expiry_time_utc,
        });
        Ok(response.token)
    }

    /// A token good for at least `renew_threshold`, renewing when needed
    ///
    /// Concurrent callers share one renewal: whoever waited on another
    /// caller's renewal picks up its token instead of requesting again.
    pub async fn ensure_token_fresh(&self) -> Result<String, AuthError> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _refresh = self.refresh.lock().await;
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }
        let credentials = self.credentials().await?;
        self.get_token(&credentials).await
    }

    async fn fresh_token(&self) -> Option<String> {
        self.token
            .read()
            .await
            .as_ref()
            .filter(|held| held.expires_at - Utc::now() >= self.renew_threshold)
            .map(|held| held.token.clone())
    }

    /// Drops the held token after the control plane rejected it
    pub async fn invalidate(&self) {
        if self.token.write().await.take().is_some() {
            warn!("Access token rejected, a new one will be requested");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ApiError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use weaver_types::wire::{
        CheckInRequest, CheckInResponse, ManualDownload, TokenResponse, WorkStatusUpdate,
    };
    use weaver_types::{GameId, ServerId};

    /// In-process stand-in for the control plane
    #[derive(Default)]
    pub(crate) struct FakeControlPlane {
        pub confirms: AtomicUsize,
        pub tokens: AtomicUsize,
        pub server_url: Mutex<Option<String>>,
        pub issued_host: Mutex<Option<HostId>>,
        pub token_lifetime_secs: i64,
        pub statuses: Mutex<Vec<WorkStatusUpdate>>,
        pub downloads: Mutex<Vec<ManualDownload>>,
        pub deleted: Mutex<Vec<ServerId>>,
    }

    impl FakeControlPlane {
        pub fn with_lifetime(secs: i64) -> Self {
            Self {
                token_lifetime_secs: secs,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ControlPlaneApi for FakeControlPlane {
        fn set_server_url(&self, server_url: &str) {
            *self.server_url.lock().unwrap() = Some(server_url.to_string());
        }

        async fn confirm_registration(
            &self,
            _server_url: &str,
            request: &ConfirmRegistrationRequest,
        ) -> Result<HostCredentials, ApiError> {
            self.confirms.fetch_add(1, Ordering::SeqCst);
            *self.issued_host.lock().unwrap() = Some(request.host_id);
            Ok(HostCredentials {
                host_id: request.host_id,
                host_token: "permanent-key".to_string(),
            })
        }

        async fn request_token(
            &self,
            credentials: &HostCredentials,
        ) -> Result<TokenResponse, ApiError> {
            let n = self.tokens.fetch_add(1, Ordering::SeqCst);
            Ok(TokenResponse {
                token: format!("token-{}-{}", credentials.host_token, n),
                refresh_token: "refresh".to_string(),
                refresh_token_expiry_time_utc: Utc::now()
                    + Duration::seconds(self.token_lifetime_secs),
            })
        }

        async fn check_in(
            &self,
            _token: &str,
            _request: &CheckInRequest,
        ) -> Result<CheckInResponse, ApiError> {
            Ok(CheckInResponse::default())
        }

        async fn report_status(
            &self,
            _token: &str,
            update: &WorkStatusUpdate,
        ) -> Result<(), ApiError> {
            self.statuses.lock().unwrap().push(update.clone());
            Ok(())
        }

        async fn client_download(
            &self,
            _token: &str,
            _game_id: GameId,
        ) -> Result<ManualDownload, ApiError> {
            let mut queue = self.downloads.lock().unwrap();
            if queue.is_empty() {
                return Err(ApiError::Status {
                    status: 404,
                    message: "no artifact".to_string(),
                });
            }
            Ok(queue.remove(0))
        }

        async fn delete_server(&self, _token: &str, server_id: ServerId) -> Result<(), ApiError> {
            self.deleted.lock().unwrap().push(server_id);
            Ok(())
        }
    }

    async fn client(
        settings: HostSettings,
        api: Arc<FakeControlPlane>,
    ) -> (AuthClient, Arc<SettingsStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.toml");
        std::fs::write(&path, toml::to_string(&settings).unwrap()).unwrap();
        let store = Arc::new(SettingsStore::load(&path).await.unwrap());
        let auth = AuthClient::new(store.clone(), api, Duration::seconds(60));
        (auth, store, dir)
    }

    fn link(host_id: HostId) -> String {
        format!(
            "https://fleet.example.com:8443/api/host/register?hostId={}&registerKey=abc123",
            host_id
        )
    }

    #[test]
    fn test_parse_register_link() {
        let host_id = HostId::new();
        let parsed = RegisterLink::parse(&link(host_id)).unwrap();
        assert_eq!(parsed.server_url, "https://fleet.example.com:8443");
        assert_eq!(parsed.host_id, host_id);
        assert_eq!(parsed.register_key, "abc123");

        assert!(matches!(
            RegisterLink::parse("https://fleet.example.com/api/host/register?hostId=nope"),
            Err(AuthError::InvalidRegisterUrl(_))
        ));
    }

    #[test]
    fn test_stored_credentials_validation() {
        let mut settings = HostSettings::default();
        assert!(stored_credentials(&settings).unwrap().is_none());

        settings.auth.host_id = Some(HostId::new().to_string());
        assert!(matches!(
            stored_credentials(&settings),
            Err(AuthError::MalformedCredentials(_))
        ));

        settings.auth.host_key = Some("  ".to_string());
        assert!(matches!(
            stored_credentials(&settings),
            Err(AuthError::MalformedCredentials(_))
        ));

        settings.auth.host_id = Some("not-a-uuid".to_string());
        settings.auth.host_key = Some("key".to_string());
        assert!(matches!(
            stored_credentials(&settings),
            Err(AuthError::MalformedCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_unregistered_host_never_confirms() {
        let api = Arc::new(FakeControlPlane::with_lifetime(3600));
        let (auth, _store, _dir) = client(HostSettings::default(), api.clone()).await;

        assert_eq!(auth.state().await, AuthState::Unregistered);
        assert!(matches!(
            auth.ensure_token_fresh().await,
            Err(AuthError::NotRegistered)
        ));
        assert_eq!(api.confirms.load(Ordering::SeqCst), 0);
        assert_eq!(api.tokens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_registration_link_is_consumed() {
        let api = Arc::new(FakeControlPlane::with_lifetime(3600));
        let host_id = HostId::new();
        let mut settings = HostSettings::default();
        settings.auth.register_url = Some(link(host_id));
        let (auth, store, _dir) = client(settings, api.clone()).await;

        assert_eq!(auth.state().await, AuthState::PendingActivation);
        let token = auth.ensure_token_fresh().await.unwrap();
        assert_eq!(token, "token-permanent-key-0");
        assert_eq!(auth.state().await, AuthState::TokenValid);

        let saved = store.snapshot().await;
        assert!(saved.auth.register_url.is_none());
        assert_eq!(saved.auth.host_id, Some(host_id.to_string()));
        assert_eq!(saved.auth.host_key.as_deref(), Some("permanent-key"));
        assert_eq!(
            saved.general.server_url.as_deref(),
            Some("https://fleet.example.com:8443")
        );
        assert_eq!(
            api.server_url.lock().unwrap().as_deref(),
            Some("https://fleet.example.com:8443")
        );
        assert_eq!(api.confirms.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stored_credentials_skip_registration() {
        let api = Arc::new(FakeControlPlane::with_lifetime(3600));
        let mut settings = HostSettings::default();
        settings.auth.register_url = Some(link(HostId::new()));
        settings.auth.host_id = Some(HostId::new().to_string());
        settings.auth.host_key = Some("stored".to_string());
        let (auth, _store, _dir) = client(settings, api.clone()).await;

        assert_eq!(auth.state().await, AuthState::Registered);
        auth.ensure_token_fresh().await.unwrap();
        assert_eq!(api.confirms.load(Ordering::SeqCst), 0);
        assert_eq!(api.tokens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_reused_until_renewal_window() {
        let api = Arc::new(FakeControlPlane::with_lifetime(3600));
        let mut settings = HostSettings::default();
        settings.auth.host_id = Some(HostId::new().to_string());
        settings.auth.host_key = Some("stored".to_string());
        let (auth, _store, _dir) = client(settings, api.clone()).await;

        let first = auth.ensure_token_fresh().await.unwrap();
        let second = auth.ensure_token_fresh().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.tokens.load(Ordering::SeqCst), 1);

        auth.invalidate().await;
        auth.ensure_token_fresh().await.unwrap();
        assert_eq!(api.tokens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_lived_token_is_renewed() {
        // Lifetime below the 60s threshold: every call renews
        let api = Arc::new(FakeControlPlane::with_lifetime(30));
        let mut settings = HostSettings::default();
        settings.auth.host_id = Some(HostId::new().to_string());
        settings.auth.host_key = Some("stored".to_string());
        let (auth, _store, _dir) = client(settings, api.clone()).await;

        auth.ensure_token_fresh().await.unwrap();
        assert_eq!(auth.state().await, AuthState::TokenExpiring);
        auth.ensure_token_fresh().await.unwrap();
        assert_eq!(api.tokens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_renewal() {
        let api = Arc::new(FakeControlPlane::with_lifetime(3600));
        let mut settings = HostSettings::default();
        settings.auth.register_url = Some(link(HostId::new()));
        let (auth, _store, _dir) = client(settings, api.clone()).await;

        let (a, b, c) = tokio::join!(
            auth.ensure_token_fresh(),
            auth.ensure_token_fresh(),
            auth.ensure_token_fresh(),
        );
        let token = a.unwrap();
        assert_eq!(b.unwrap(), token);
        assert_eq!(c.unwrap(), token);
        assert_eq!(api.confirms.load(Ordering::SeqCst), 1);
        assert_eq!(api.tokens.load(Ordering::SeqCst), 1);
    }
}

//! Host registration, credential rotation and bearer tokens.
//!
//! A host is created by an operator together with a one-time activation
//! key. Confirming that key hands the host its permanent shared secret;
//! the control plane keeps only a salted SHA-256 of it. The secret is then
//! exchanged for short-lived bearer tokens.

use crate::error::{AuthError, RepositoryError};
use crate::repository::{AccessToken, HostRepository};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};
use weaver_types::wire::{HostCredentials, RegistrationTicket, ResourceUsage, TokenResponse};
use weaver_types::{
    AccountId, ConnectivityState, Host, HostCredential, HostId, HostRegistration,
};

/// Random url-safe secret built from 32 bytes of key material
pub fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn random_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 over `salt || secret`, hex encoded
pub fn salted_hash(salt: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub struct HostAuthService {
    hosts: Arc<dyn HostRepository>,
    public_url: String,
    token_lifetime: Duration,
}

impl HostAuthService {
    pub fn new(hosts: Arc<dyn HostRepository>, public_url: &str, token_lifetime: Duration) -> Self {
        Self {
            hosts,
            public_url: public_url.trim_end_matches('/').to_string(),
            token_lifetime,
        }
    }

    /// Creates an unregistered host and its one-time activation URL
    #[instrument(skip(self))]
    pub async fn request_registration(
        &self,
        account_id: AccountId,
        description: &str,
    ) -> Result<RegistrationTicket, AuthError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AuthError::Validation("description is required".to_string()));
        }
        let host = Host::new(account_id);
        let registration = HostRegistration {
            host_id: host.id,
            description: description.to_string(),
            activation_key: random_secret(),
            active: true,
            created_at: Utc::now(),
            activated_at: None,
            activated_from: None,
        };

        let url = format!(
            "{}/api/host/register?hostId={}&registerKey={}",
            self.public_url, host.id, registration.activation_key
        );

        // The registration claims the description; the host is stored only once that succeeds
        let host_id = host.id;
        match self.hosts.insert_registration(registration).await {
            Ok(()) => {}
            Err(RepositoryError::Conflict(_)) => {
                return Err(AuthError::DuplicateDescription(description.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = self.hosts.insert_host(host).await {
            self.hosts.cancel_registration(host_id).await?;
            return Err(e.into());
        }
        info!("🔑 Issued registration link for '{}'", description);

        Ok(RegistrationTicket { url })
    }

    /// Consumes the activation key and issues the host's permanent secret
    #[instrument(skip(self, register_key))]
    pub async fn confirm_registration(
        &self,
        host_id: HostId,
        register_key: &str,
        remote_ip: Option<String>,
    ) -> Result<HostCredentials, AuthError> {
        let rejected = || AuthError::Unauthorized("invalid or consumed registration".to_string());

        let mut host = self.hosts.get_host(host_id).await?.ok_or_else(rejected)?;
        if host.deleted {
            return Err(rejected());
        }

        let accept = |registration: &HostRegistration| {
            constant_time_eq(&registration.activation_key, register_key)
        };
        if self
            .hosts
            .consume_registration(host_id, &accept, remote_ip.clone())
            .await?
            .is_none()
        {
            warn!("Rejected registration attempt for host {}", host_id);
            return Err(rejected());
        }

        let host_token = random_secret();
        let salt = random_salt();
        host.credential = Some(HostCredential {
            hash: salted_hash(&salt, &host_token),
            salt,
            issued_at: Utc::now(),
        });
        host.state = ConnectivityState::Unknown;
        if let Some(ip) = remote_ip {
            if !host.addresses.contains(&ip) {
                host.addresses.push(ip);
            }
        }
        self.hosts.update_host(host).await?;
        self.hosts.revoke_host_tokens(host_id).await?;

        info!("✅ Host {} confirmed its registration", host_id);
        Ok(HostCredentials {
            host_id,
            host_token,
        })
    }

    /// Exchanges the permanent secret for a bearer token
    #[instrument(skip(self, host_token))]
    pub async fn issue_token(
        &self,
        host_id: HostId,
        host_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        let rejected = || AuthError::Unauthorized("invalid host credentials".to_string());

        let host = self.hosts.get_host(host_id).await?.ok_or_else(rejected)?;
        if host.deleted {
            return Err(rejected());
        }
        let credential = host.credential.as_ref().ok_or_else(rejected)?;
        if !constant_time_eq(&credential.hash, &salted_hash(&credential.salt, host_token)) {
            warn!("Rejected token request for host {}", host_id);
            return Err(rejected());
        }

        let token = random_secret();
        let refresh_token = random_secret();
        let expires_at = Utc::now() + self.token_lifetime;
        self.hosts
            .insert_token(AccessToken {
                token_hash: token_hash(&token),
                host_id,
                expires_at,
            })
            .await?;

        Ok(TokenResponse {
            token,
            refresh_token,
            refresh_token_expiry_time_utc: expires_at,
        })
    }

    /// Resolves a bearer token to its host
    pub async fn authenticate(&self, access_token: &str) -> Result<HostId, AuthError> {
        let rejected = || AuthError::Unauthorized("invalid or expired token".to_string());

        let token = self
            .hosts
            .get_token(&token_hash(access_token))
            .await?
            .ok_or_else(rejected)?;
        if token.expires_at <= Utc::now() {
            return Err(rejected());
        }

        let host = self
            .hosts
            .get_host(token.host_id)
            .await?
            .ok_or_else(rejected)?;
        if host.deleted {
            return Err(rejected());
        }
        Ok(host.id)
    }

    /// Stamps a successful check-in
    pub async fn touch(&self, host_id: HostId, address: Option<String>) -> Result<(), AuthError> {
        let mut host = self
            .hosts
            .get_host(host_id)
            .await?
            .ok_or(AuthError::HostNotFound(host_id))?;
        host.last_seen = Some(Utc::now());
        host.state = ConnectivityState::InternallyConnectable;
        if let Some(address) = address {
            if !host.addresses.contains(&address) {
                host.addresses.push(address);
            }
        }
        self.hosts.update_host(host).await?;
        Ok(())
    }

    pub async fn host(&self, host_id: HostId) -> Result<Host, AuthError> {
        self.hosts
            .get_host(host_id)
            .await?
            .ok_or(AuthError::HostNotFound(host_id))
    }

    pub async fn record_usage(&self, host_id: HostId, usage: ResourceUsage) -> Result<(), AuthError> {
        Ok(self.hosts.record_usage(host_id, usage).await?)
    }

    pub async fn latest_usage(&self, host_id: HostId) -> Result<Option<ResourceUsage>, AuthError> {
        Ok(self.hosts.latest_usage(host_id).await?)
    }

    /// Soft-deletes a host and revokes its pending registration and tokens
    #[instrument(skip(self))]
    pub async fn decommission(&self, host_id: HostId) -> Result<(), AuthError> {
        let mut host = self.host(host_id).await?;
        host.deleted = true;
        host.credential = None;
        self.hosts.update_host(host).await?;
        self.hosts.cancel_registration(host_id).await?;
        self.hosts.revoke_host_tokens(host_id).await?;
        info!("Host {} decommissioned", host_id);
        Ok(())
    }

    /// Marks hosts not seen since `cutoff` as `Unknown`, returning how many changed
    pub async fn mark_stale_hosts(&self, cutoff: chrono::DateTime<Utc>) -> Result<usize, AuthError> {
        let mut changed = 0;
        for mut host in self.hosts.list_hosts().await? {
            let stale = host.last_seen.map(|seen| seen < cutoff).unwrap_or(false);
            if stale && host.state == ConnectivityState::InternallyConnectable {
                host.state = ConnectivityState::Unknown;
                self.hosts.update_host(host).await?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub async fn purge_expired_tokens(&self) -> Result<usize, AuthError> {
        Ok(self.hosts.purge_expired_tokens(Utc::now()).await?)
    }
}

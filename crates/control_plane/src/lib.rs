//! # Weaver Control Plane
//!
//! Central side of the fleet: issues host registrations, keeps the per-host
//! work queue, resolves layered game profiles into dispatch snapshots and
//! serves the HTTP API hosts poll.
//!
//! ## Architecture
//!
//! * [`queue::WorkQueue`] - pull-based, at-least-once delivery with
//!   monotonic status
//! * [`registration::HostAuthService`] - one-time links, salted host
//!   secrets, bearer tokens
//! * [`profiles::ProfileService`] - default -> parent -> own resolution
//!   and edits
//! * [`actions::ServerActions`] - turns operator actions into work
//! * [`housekeeping::Housekeeper`] - purges, stale work alerts, host aging
//! * [`api`] - axum router over all of the above
//!
//! Storage is behind the traits in [`repository`]; [`memory::MemoryStore`]
//! is the bundled implementation.

pub mod actions;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod memory;
pub mod profiles;
pub mod queue;
pub mod registration;
pub mod repository;

pub use config::ControlPlaneConfig;
pub use error::ServeError;

use actions::ServerActions;
use api::AppState;
use axum::Router;
use housekeeping::{Housekeeper, HousekeepingSettings};
use memory::MemoryStore;
use profiles::ProfileService;
use queue::WorkQueue;
use registration::HostAuthService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// A fully wired control plane, ready to serve
pub struct ControlPlane {
    state: AppState,
    store: Arc<MemoryStore>,
    housekeeping: HousekeepingSettings,
}

impl ControlPlane {
    /// Wires services over a fresh in-memory store and seeds the catalog
    pub async fn build(config: &ControlPlaneConfig) -> Result<Self, ServeError> {
        let store = Arc::new(MemoryStore::new());

        if let Some(path) = &config.catalog_path {
            catalog::load_catalog(path, store.as_ref()).await?;
        }

        let token_lifetime = chrono::Duration::from_std(config.token_lifetime)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let queue = Arc::new(WorkQueue::new(store.clone(), config.max_batch_size));
        let auth = Arc::new(HostAuthService::new(
            store.clone(),
            &config.public_url,
            token_lifetime,
        ));
        let profiles = Arc::new(ProfileService::new(store.clone()));
        let actions = Arc::new(ServerActions::new(
            store.clone(),
            store.clone(),
            profiles.clone(),
            queue.clone(),
        ));

        if config.operator_key.is_empty() {
            warn!("No operator key configured, admin routes will reject every request");
        }

        Ok(Self {
            state: AppState {
                queue,
                auth,
                profiles,
                actions,
                operator_key: Arc::from(config.operator_key.as_str()),
            },
            store,
            housekeeping: HousekeepingSettings {
                interval: config.housekeeping_interval,
                work_retention: config.work_retention,
                stale_work_alert: config.stale_work_alert,
                host_stale_after: config.host_stale_after,
            },
        })
    }

    /// Backing store, for seeding records directly
    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        api::build_router(self.state.clone())
    }

    /// Serves the API and runs housekeeping until `shutdown` flips to true
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServeError> {
        let housekeeper = Housekeeper::new(
            self.state.queue.clone(),
            self.state.auth.clone(),
            self.housekeeping,
        );
        let housekeeping = tokio::spawn(housekeeper.run(shutdown.clone()));

        let app = self.router();
        let mut server_shutdown = shutdown;
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*server_shutdown.borrow() {
                if server_shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(ServeError::Server);

        housekeeping.abort();
        info!("Control plane stopped");
        result
    }
}

/// Binds the configured address and serves until shutdown
pub async fn run(
    config: ControlPlaneConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    let control_plane = ControlPlane::build(&config).await?;
    let listener = TcpListener::bind(config.bind_address)
        .await
        .map_err(|e| ServeError::Bind(config.bind_address, e))?;

    info!("🚀 Control plane listening on {}", config.bind_address);
    info!("Registration links will point at {}", config.public_url);
    control_plane.serve(listener, shutdown).await
}

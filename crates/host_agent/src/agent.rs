//! Wires the agent together and runs its timer loops.

use crate::api::{ControlPlaneApi, HttpControlPlane};
use crate::auth::AuthClient;
use crate::backup::BackupManager;
use crate::config::HostAgentConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{AuthError, SettingsError};
use crate::handlers::Handlers;
use crate::installer::{InstallerDriver, MarkerRunner};
use crate::process::{ProcessTable, SysinfoProcessTable};
use crate::session::HostSession;
use crate::settings::SettingsStore;
use crate::state::{BindProbe, StateDetector};
use crate::telemetry::{LatestUsage, UsageSampler};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] crate::error::ApiError),
}

pub struct HostAgent {
    auth: Arc<AuthClient>,
    dispatcher: Arc<Dispatcher>,
    usage: LatestUsage,
    poll_interval: Duration,
    telemetry_interval: Duration,
}

impl HostAgent {
    pub async fn new(config: HostAgentConfig) -> Result<Self, AgentError> {
        let settings = Arc::new(SettingsStore::load(&config.settings_path).await?);
        let server_url = settings.snapshot().await.general.server_url;
        let api: Arc<dyn ControlPlaneApi> =
            Arc::new(HttpControlPlane::new(server_url, config.request_timeout)?);
        let renew_threshold = chrono::Duration::from_std(config.renew_threshold)
            .unwrap_or_else(|_| chrono::Duration::minutes(2));
        let auth = Arc::new(AuthClient::new(settings, api.clone(), renew_threshold));
        let session = Arc::new(HostSession::new(auth.clone(), api));

        let processes: Arc<dyn ProcessTable> = Arc::new(SysinfoProcessTable);
        let handlers = Handlers {
            installer: Arc::new(InstallerDriver::new(
                config.installer.clone(),
                Arc::new(MarkerRunner),
            )),
            artifacts: session.clone(),
            records: session.clone(),
            processes: processes.clone(),
            backups: BackupManager::new(config.backup_root.clone(), config.backup_retention),
        };
        let detector = StateDetector::new(processes, Arc::new(BindProbe));
        let usage: LatestUsage = Arc::new(RwLock::new(Default::default()));

        let dispatcher = Arc::new(Dispatcher::new(
            session,
            Arc::new(handlers),
            detector,
            usage.clone(),
            config.dispatch,
        ));

        Ok(Self {
            auth,
            dispatcher,
            usage,
            poll_interval: config.poll_interval,
            telemetry_interval: config.telemetry_interval,
        })
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Runs the telemetry and check-in loops until `shutdown` flips to true
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            "🚀 Host agent started ({:?}), polling every {:?}",
            self.auth.state().await,
            self.poll_interval
        );

        let telemetry = tokio::spawn(telemetry_loop(
            self.usage.clone(),
            self.telemetry_interval,
            shutdown.clone(),
        ));
        let check_in = tokio::spawn(check_in_loop(
            self.dispatcher.clone(),
            self.poll_interval,
            shutdown,
        ));

        if let Err(e) = check_in.await {
            error!("Check-in loop panicked: {}", e);
        }
        if let Err(e) = telemetry.await {
            error!("Telemetry loop panicked: {}", e);
        }
        info!("Host agent stopped");
    }
}

async fn telemetry_loop(usage: LatestUsage, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut sampler = UsageSampler::new();
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = sampler.sample();
                debug!("CPU {:.1}%, memory {}/{}", sample.cpu_percent, sample.memory_used_bytes, sample.memory_total_bytes);
                *usage.write().await = sample;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn check_in_loop(
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut waiting_logged = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                // A running batch is never interrupted; shutdown is seen on the next tick
                match dispatcher.run_cycle().await {
                    Ok(report) => {
                        waiting_logged = false;
                        if report.received > 0 {
                            info!(
                                "Batch done: {} completed, {} failed",
                                report.completed, report.failed
                            );
                        }
                    }
                    Err(AuthError::NotRegistered) => {
                        if !waiting_logged {
                            info!("Waiting for a registration link in the settings file");
                            waiting_logged = true;
                        }
                    }
                    Err(e @ AuthError::MalformedCredentials(_)) => {
                        error!("{}; fix the [auth] section of the settings file", e);
                    }
                    Err(e @ AuthError::InvalidRegisterUrl(_)) => error!("{}", e),
                    Err(e) => warn!("Check-in failed: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}


//! # Weaver Host Agent
//!
//! Runs on every machine that hosts game servers. It enrolls with the
//! control plane through a one-time link, keeps a bearer token fresh,
//! reports resource usage and server states on each check-in and executes
//! the work it receives.
//!
//! Work handlers cover installs (Steam installer or manual artifacts),
//! start/stop/restart, uninstall, backups and config merging. Everything
//! that touches the outside world sits behind a trait so the handlers can
//! be driven in tests without real processes or a real control plane.

pub mod agent;
pub mod api;
pub mod auth;
pub mod backup;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod installer;
pub mod manual;
pub mod process;
pub mod session;
pub mod settings;
pub mod state;
pub mod telemetry;

pub use agent::{AgentError, HostAgent};
pub use config::HostAgentConfig;

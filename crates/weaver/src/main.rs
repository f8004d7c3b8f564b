//! Entry point of the Weaver fleet manager.
//!
//! `weaver control` runs the control plane API; `weaver host` runs the
//! agent on a machine that hosts game servers.

mod cli;
mod config;
mod logging;
mod signals;

use cli::{CliArgs, Mode};
use config::AppConfig;
use host_agent::HostAgent;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = AppConfig::load_from_file(&args.config_path).await?;
    config.apply_overrides(&args);
    config.validate()?;
    logging::setup_logging(&config.logging)?;

    let version = env!("CARGO_PKG_VERSION");
    let shutdown = signals::shutdown_flag();

    match args.mode {
        Mode::Control { .. } => {
            info!("🌟 Weaver control plane v{}", version);
            info!("📂 Config: {}", args.config_path.display());
            control_plane::run(config.to_control_plane_config()?, shutdown).await?;
        }
        Mode::Host { .. } => {
            info!("🌟 Weaver host agent v{}", version);
            info!(
                "📂 Config: {} | Settings: {}",
                args.config_path.display(),
                config.host.settings_path
            );
            let agent = HostAgent::new(config.to_host_agent_config()).await?;
            agent.run(shutdown).await;
        }
    }

    info!("👋 Weaver stopped");
    Ok(())
}

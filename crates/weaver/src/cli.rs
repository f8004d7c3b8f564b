//! Command-line interface of the `weaver` binary.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Which side of the fleet this process runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Control {
        bind_address: Option<String>,
        public_url: Option<String>,
    },
    Host {
        settings_path: Option<PathBuf>,
    },
}

/// Parsed command line; `None` fields leave the config file value alone
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub log_level: Option<String>,
    pub json_logs: bool,
    pub mode: Mode,
}

pub fn command() -> Command {
    Command::new("weaver")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Game server fleet manager")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("weaver.toml")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .global(true),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("control")
                .about("Run the control plane API")
                .arg(
                    Arg::new("bind")
                        .short('b')
                        .long("bind")
                        .value_name("ADDRESS")
                        .help("Bind address (e.g., 0.0.0.0:8090)"),
                )
                .arg(
                    Arg::new("public-url")
                        .long("public-url")
                        .value_name("URL")
                        .help("Base URL hosts use to reach this control plane"),
                ),
        )
        .subcommand(
            Command::new("host")
                .about("Run the host agent")
                .arg(
                    Arg::new("settings")
                        .short('s')
                        .long("settings")
                        .value_name("FILE")
                        .help("Host settings file holding the registration link and credentials"),
                ),
        )
}

impl CliArgs {
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    pub fn from_matches(matches: &ArgMatches) -> Self {
        let (mode, sub) = match matches.subcommand() {
            Some(("host", sub)) => (
                Mode::Host {
                    settings_path: sub.get_one::<String>("settings").map(PathBuf::from),
                },
                sub,
            ),
            Some((_, sub)) => (
                Mode::Control {
                    bind_address: sub.get_one::<String>("bind").cloned(),
                    public_url: sub.get_one::<String>("public-url").cloned(),
                },
                sub,
            ),
            None => (
                Mode::Control {
                    bind_address: None,
                    public_url: None,
                },
                matches,
            ),
        };

        Self {
            config_path: sub
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("weaver.toml")),
            log_level: sub.get_one::<String>("log-level").cloned(),
            json_logs: sub.get_flag("json-logs"),
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(&command().try_get_matches_from(args).unwrap())
    }

    #[test]
    fn test_control_overrides() {
        let args = parse(&[
            "weaver",
            "--log-level",
            "debug",
            "control",
            "--bind",
            "0.0.0.0:9000",
        ]);
        assert_eq!(args.config_path, PathBuf::from("weaver.toml"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(!args.json_logs);
        assert_eq!(
            args.mode,
            Mode::Control {
                bind_address: Some("0.0.0.0:9000".to_string()),
                public_url: None,
            }
        );
    }

    #[test]
    fn test_host_with_global_flags_after_subcommand() {
        let args = parse(&[
            "weaver",
            "host",
            "--settings",
            "/etc/weaver/host.toml",
            "-c",
            "fleet.toml",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("fleet.toml"));
        assert!(args.json_logs);
        assert_eq!(
            args.mode,
            Mode::Host {
                settings_path: Some(PathBuf::from("/etc/weaver/host.toml")),
            }
        );
    }

    #[test]
    fn test_subcommand_required() {
        assert!(command().try_get_matches_from(["weaver"]).is_err());
    }
}

//! CLI argument parsing and validation module
//!
//! Handles the command-line interface using clap, including:
//! - One-shot scans of a log directory
//! - Manual checks, status and reset against the running daemon
//! - Runtime configuration updates
//! - Daemon lifecycle commands

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::constants::{APP_NAME, DAEMON_RUN_SUBCOMMAND, DAEMON_SUBCOMMAND};
use crate::daemon::config::{parse_update, UPDATABLE_KEYS};

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    /// Explicit configuration file (`--config`)
    pub config_path: Option<PathBuf>,
    pub command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Resolve the latest entry in a directory without touching any state
    Scan {
        directory: Option<PathBuf>,
        pattern: Option<String>,
        json: bool,
    },
    Check { json: bool },
    Status { json: bool },
    Reset,
    Set { updates: Vec<(String, String)> },
    DaemonRun,
    DaemonStart,
    DaemonStop,
}

/// Build the clap command tree
pub fn build_cli() -> Command {
    let json_flag = Arg::new("json")
        .short('j')
        .long("json")
        .help("Output in JSON format")
        .action(ArgAction::SetTrue);

    Command::new(APP_NAME)
        .version(env!("TIDEWATCH_VERSION"))
        .about("Watch game logs for departure markers and act before the next event")
        .long_about(
            "Scans a directory of append-only chat logs for \"Next boat is in N minutes\" markers, \
             runs a configured action once per new marker and counts down to the predicted event.",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (default: platform config dir)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("scan")
                .about("Find the latest marker line in a log directory (read-only)")
                .arg(
                    Arg::new("dir")
                        .short('d')
                        .long("dir")
                        .value_name("DIR")
                        .help("Directory to scan (default: source.directory from config)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("pattern")
                        .short('p')
                        .long("pattern")
                        .value_name("GLOB")
                        .help("File name pattern (default: source.file_pattern from config)"),
                )
                .arg(json_flag.clone()),
        )
        .subcommand(
            Command::new("check")
                .about("Ask the daemon to poll now, even if disabled")
                .arg(json_flag.clone()),
        )
        .subcommand(
            Command::new("status")
                .about("Show daemon status and the next event countdown")
                .arg(json_flag),
        )
        .subcommand(Command::new("reset").about("Forget the last processed entry"))
        .subcommand(
            Command::new("set")
                .about("Update configuration on the running daemon")
                .after_help(format!("Keys: {}", UPDATABLE_KEYS.join(", ")))
                .arg(
                    Arg::new("updates")
                        .value_name("KEY=VALUE")
                        .help("One or more key=value pairs")
                        .required(true)
                        .num_args(1..)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new(DAEMON_SUBCOMMAND)
                .about("Manage the background daemon")
                .subcommand_required(true)
                .subcommand(Command::new(DAEMON_RUN_SUBCOMMAND).about("Run the daemon in the foreground"))
                .subcommand(Command::new("start").about("Start the daemon in the background"))
                .subcommand(Command::new("stop").about("Stop the running daemon")),
        )
}

/// Parse command line arguments and return configuration
pub fn parse_args() -> Result<CliArgs> {
    parse_from(std::env::args_os())
}

pub fn parse_from<I, T>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = match build_cli().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) => e.exit(),
    };
    from_matches(&matches)
}

fn from_matches(matches: &ArgMatches) -> Result<CliArgs> {
    let config_path = matches.get_one::<PathBuf>("config").cloned();

    let command = match matches.subcommand() {
        Some(("scan", sub)) => CliCommand::Scan {
            directory: sub.get_one::<PathBuf>("dir").cloned(),
            pattern: sub.get_one::<String>("pattern").cloned(),
            json: sub.get_flag("json"),
        },
        Some(("check", sub)) => CliCommand::Check {
            json: sub.get_flag("json"),
        },
        Some(("status", sub)) => CliCommand::Status {
            json: sub.get_flag("json"),
        },
        Some(("reset", _)) => CliCommand::Reset,
        Some(("set", sub)) => {
            let updates = sub
                .get_many::<String>("updates")
                .map(|values| values.map(|v| parse_update(v)).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            CliCommand::Set { updates }
        }
        Some((DAEMON_SUBCOMMAND, sub)) => match sub.subcommand() {
            Some((DAEMON_RUN_SUBCOMMAND, _)) => CliCommand::DaemonRun,
            Some(("start", _)) => CliCommand::DaemonStart,
            Some(("stop", _)) => CliCommand::DaemonStop,
            _ => anyhow::bail!("Missing daemon subcommand"),
        },
        _ => anyhow::bail!("Missing subcommand"),
    };

    Ok(CliArgs { config_path, command })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_scan_args() {
        let args = parse_from(["tidewatch", "scan", "--dir", "/logs", "-p", "chat_*.log", "--json"]).unwrap();
        assert_eq!(
            args.command,
            CliCommand::Scan {
                directory: Some(PathBuf::from("/logs")),
                pattern: Some("chat_*.log".to_string()),
                json: true,
            }
        );
        assert_eq!(args.config_path, None);
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let args = parse_from(["tidewatch", "daemon", "run", "--config", "/etc/tw.toml"]).unwrap();
        assert_eq!(args.command, CliCommand::DaemonRun);
        assert_eq!(args.config_path, Some(PathBuf::from("/etc/tw.toml")));
    }

    #[test]
    fn test_set_parses_pairs() {
        let args = parse_from(["tidewatch", "set", "schedule.enabled=false", "schedule.interval_minutes=3"]).unwrap();
        assert_eq!(
            args.command,
            CliCommand::Set {
                updates: vec![
                    ("schedule.enabled".to_string(), "false".to_string()),
                    ("schedule.interval_minutes".to_string(), "3".to_string()),
                ]
            }
        );
    }

    #[test]
    fn test_set_rejects_malformed_pair() {
        let err = parse_from(["tidewatch", "set", "schedule.enabled"]).unwrap_err();
        assert!(err.to_string().contains("expected key=value"));
    }
}

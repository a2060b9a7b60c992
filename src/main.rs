#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tidewatch::cli::{self, CliArgs, CliCommand};
use tidewatch::daemon::config::DaemonConfiguration;
use tidewatch::daemon::ipc::{ConfigUpdate, IpcClient, IpcMessage, IpcResponse, IpcServer};
use tidewatch::daemon;
use tidewatch::models::{CheckReport, ScanOutput, ScanSummary, StatusReport};
use tidewatch::monitor::resolve_latest;
use tidewatch::{output, scan};

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config_path;

    match args.command {
        CliCommand::Scan {
            directory,
            pattern,
            json,
        } => run_scan(config_path, directory, pattern, json),
        CliCommand::Check { json } => {
            let message = IpcMessage::ForceCheck {
                request_id: IpcServer::generate_request_id(),
            };
            let report: CheckReport = request_data(config_path.as_deref(), message).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", output::format_check_human(&report));
            }
            Ok(())
        }
        CliCommand::Status { json } => {
            let message = IpcMessage::GetStatus {
                request_id: IpcServer::generate_request_id(),
            };
            let status: StatusReport = request_data(config_path.as_deref(), message).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", output::format_status_human(&status));
            }
            Ok(())
        }
        CliCommand::Reset => {
            let message = IpcMessage::Reset {
                request_id: IpcServer::generate_request_id(),
            };
            let (_, text) = request(config_path.as_deref(), message).await?.into_result()?;
            println!("{}", text.unwrap_or_else(|| "Done".to_string()));
            Ok(())
        }
        CliCommand::Set { updates } => {
            let message = IpcMessage::UpdateConfig {
                updates: updates
                    .into_iter()
                    .map(|(key, value)| ConfigUpdate { key, value })
                    .collect(),
                request_id: IpcServer::generate_request_id(),
            };
            let (_, text) = request(config_path.as_deref(), message).await?.into_result()?;
            println!("{}", text.unwrap_or_else(|| "Done".to_string()));
            Ok(())
        }
        CliCommand::DaemonRun => daemon::run_daemon_process(config_path).await,
        CliCommand::DaemonStart => daemon::start_daemon(config_path).await,
        CliCommand::DaemonStop => {
            let stopped = daemon::stop_daemon()?;
            if stopped == 0 {
                println!("No running daemon found");
            } else {
                println!("Sent stop signal to {} daemon process(es)", stopped);
            }
            Ok(())
        }
    }
}

/// One-shot, read-only resolution of the latest entry
fn run_scan(
    config_path: Option<PathBuf>,
    directory: Option<PathBuf>,
    pattern: Option<String>,
    json: bool,
) -> Result<()> {
    let config = DaemonConfiguration::load_or_default(config_path.as_deref())?;
    let directory = directory.unwrap_or(config.source.directory);
    let pattern = pattern.unwrap_or(config.source.file_pattern);

    let start_time = Instant::now();
    let files = scan::discover_log_files(&directory, &pattern)?;
    let latest = resolve_latest(&files, Local::now().naive_local(), "")
        .map(|entry| output::create_detection_event(&entry))
        .transpose()?;

    let scan_output = ScanOutput {
        latest,
        summary: ScanSummary {
            directory,
            pattern,
            scanned: files.len(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&scan_output)?);
    } else {
        println!("{}", output::format_scan_human(&scan_output));
    }

    Ok(())
}

async fn request(config_path: Option<&Path>, message: IpcMessage) -> Result<IpcResponse> {
    let config = DaemonConfiguration::load_or_default(config_path)?;
    IpcClient::new(config.daemon.socket_path).send(&message).await
}

async fn request_data<T: serde::de::DeserializeOwned>(
    config_path: Option<&Path>,
    message: IpcMessage,
) -> Result<T> {
    let (data, _) = request(config_path, message).await?.into_result()?;
    let data = data.context("Daemon returned an empty response")?;
    serde_json::from_value(data).context("Unexpected response from daemon")
}

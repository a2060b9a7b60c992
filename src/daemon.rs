//! Daemon module for background log monitoring
//!
//! This module provides functionality to run tidewatch as a daemon:
//! - Configuration management with atomic updates
//! - Inter-process communication for manual checks and runtime changes
//! - Structured logging to the platform log backend

pub mod config;
pub mod ipc;
pub mod logging;

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::action::ShellInvoker;
use crate::constants::{
    APP_NAME, APP_SUBSYSTEM, DAEMON_CHILD_ENV, DAEMON_READY_LINE, DAEMON_RUN_SUBCOMMAND,
    DAEMON_START_TIMEOUT, DAEMON_SUBCOMMAND,
};
use crate::daemon::config::DaemonConfiguration;
use crate::daemon::ipc::{IpcServer, IpcServerHandler};
use crate::daemon::logging::{init_backend, DaemonLogger};
use crate::monitor::MonitorEngine;
use crate::state::TomlStateStore;

/// Check if a tidewatch daemon process is already running
pub fn is_daemon_running() -> bool {
    !find_daemon_pids().is_empty()
}

/// Find PIDs of running `tidewatch daemon run` processes,
/// excluding the current process and sudo wrappers
pub fn find_daemon_pids() -> Vec<u32> {
    use sysinfo::{ProcessesToUpdate, System};

    let mut system = System::new_all();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let current_pid = std::process::id();

    system
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            let pid_u32 = pid.as_u32();

            if pid_u32 == current_pid {
                return None;
            }

            let cmd = process.cmd();
            let has_app = cmd.iter().any(|arg| arg.to_string_lossy().contains(APP_NAME));
            let has_daemon = cmd.iter().any(|arg| arg == DAEMON_SUBCOMMAND);
            let has_run = cmd.iter().any(|arg| arg == DAEMON_RUN_SUBCOMMAND);
            let is_sudo = process.name() == "sudo";

            if has_app && has_daemon && has_run && !is_sudo {
                Some(pid_u32)
            } else {
                None
            }
        })
        .collect()
}

/// Send SIGTERM to every running daemon. Returns how many were signalled.
pub fn stop_daemon() -> Result<usize> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pids = find_daemon_pids();
    let mut stopped = 0;
    for pid in pids {
        let raw = i32::try_from(pid).with_context(|| format!("Invalid PID {}", pid))?;
        match kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) => stopped += 1,
            Err(e) => log::warn!("Failed to signal daemon {}: {}", pid, e),
        }
    }
    Ok(stopped)
}

/// Start the daemon as a detached child and wait until it reports ready
pub async fn start_daemon(config_path: Option<PathBuf>) -> Result<()> {
    // Surface configuration errors in the foreground
    let config = DaemonConfiguration::load_or_default(config_path.as_deref())?;

    if is_daemon_running() {
        bail!("Daemon already running, please stop it first.");
    }

    let current_exe = std::env::current_exe().context("Failed to get current executable path")?;

    let mut cmd = std::process::Command::new(current_exe);
    cmd.env(DAEMON_CHILD_ENV, "1");
    cmd.args([DAEMON_SUBCOMMAND, DAEMON_RUN_SUBCOMMAND]);

    if let Some(config) = config_path {
        cmd.arg("--config").arg(config);
    }

    // Child signals readiness on its stdout
    cmd.stdout(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());

    let mut child = cmd.spawn().context("Failed to spawn daemon child process")?;

    println!("Starting {} daemon...", APP_NAME);

    // EOF on the pipe means the child exited before becoming ready
    let stdout = child.stdout.take().context("Failed to capture child stdout")?;
    let mut reader = std::io::BufReader::new(stdout);
    let mut line = String::new();

    let ready_result = tokio::time::timeout(
        DAEMON_START_TIMEOUT,
        tokio::task::spawn_blocking(move || reader.read_line(&mut line).map(|n| (n, line))),
    )
    .await;

    match ready_result {
        Ok(Ok(Ok((0, _)))) => {
            let status = child.try_wait().ok().flatten();
            let exit_info = status.map_or("unknown".to_string(), |s| format!("{}", s));
            bail!("Daemon process exited before becoming ready (exit: {})", exit_info)
        }
        Ok(Ok(Ok((_n, ref msg)))) if msg.trim() == DAEMON_READY_LINE => {
            println!("Daemon started (pid {})", child.id());
            println!("  Watching: {}", config.source.directory.display());
            println!("  Poll interval: {} min", config.schedule.interval_minutes);
            println!("  Check status: {} status", APP_NAME);
            println!("  Stop daemon: {} daemon stop", APP_NAME);
            Ok(())
        }
        Ok(Ok(Ok((_n, msg)))) => bail!("Unexpected daemon output: {}", msg.trim()),
        Ok(Ok(Err(e))) => bail!("Failed reading from daemon process: {}", e),
        Ok(Err(e)) => bail!("Internal error waiting for daemon: {}", e),
        Err(_) => {
            let _ = child.kill();
            bail!(
                "Daemon did not become ready within {} seconds",
                DAEMON_START_TIMEOUT.as_secs()
            )
        }
    }
}

/// Run the daemon in the foreground until SIGINT, SIGTERM or an IPC
/// shutdown request
pub async fn run_daemon_process(config_path: Option<PathBuf>) -> Result<()> {
    let config = DaemonConfiguration::load_or_default(config_path.as_deref())?;
    let level = config.log_level()?;
    init_backend(APP_SUBSYSTEM, level)?;
    let logger = DaemonLogger::new(level);

    config
        .ensure_directories()
        .context("Failed to create required directories")?;

    let config_file = match config_path {
        Some(path) => path,
        None => DaemonConfiguration::default_config_path()?,
    };

    let store = Arc::new(TomlStateStore::new(config.daemon.state_path.clone()));
    let engine = MonitorEngine::new(config.engine_config(), store, Arc::new(ShellInvoker), logger.clone())?;

    let mut ipc_server = IpcServer::new(config.daemon.socket_path.clone())?;
    ipc_server.bind()?;

    let shutdown = CancellationToken::new();
    let handler = IpcServerHandler::new(
        Arc::clone(&engine),
        Arc::new(Mutex::new(config)),
        Some(config_file.clone()),
        logger.clone(),
        shutdown.clone(),
    );

    logger.log_startup(&config_file, std::process::id());

    // Signal the parent that initialization is complete. Without a
    // parent waiting the write goes nowhere.
    {
        let mut stdout = std::io::stdout();
        let _ = writeln!(stdout, "{}", DAEMON_READY_LINE);
        let _ = stdout.flush();
    }

    let poll_task = tokio::spawn(Arc::clone(&engine).run_poll_loop());
    let countdown_task = tokio::spawn(Arc::clone(&engine).run_countdown_loop());
    let ipc_task = {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_server.serve(handler, token).await {
                log::error!("IPC server error: {:#}", e);
            }
            if let Err(e) = ipc_server.stop() {
                log::warn!("{:#}", e);
            }
        })
    };

    let reason = tokio::select! {
        reason = wait_for_signal() => reason,
        _ = shutdown.cancelled() => "shutdown requested over IPC",
    };
    logger.log_shutdown(reason);

    shutdown.cancel();
    engine.shutdown().await;
    let _ = poll_task.await;
    let _ = countdown_task.await;
    let _ = ipc_task.await;

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            log::warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

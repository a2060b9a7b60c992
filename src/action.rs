//! Action invocation boundary
//!
//! Configured actions are plain strings. They are classified once into an
//! [`Action`] so the scheduling code never inspects command text itself.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::constants::ECHO_ACTION_PREFIX;

/// A classified action string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Empty command; nothing to run
    Nothing,
    /// `/echo <text>`: a diagnostic message, logged only
    Echo(String),
    /// Anything else: run through the shell
    Shell(String),
}

impl Action {
    pub fn parse(command: &str) -> Self {
        let command = command.trim();
        if command.is_empty() {
            return Action::Nothing;
        }

        if let Some(rest) = command.strip_prefix(ECHO_ACTION_PREFIX) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                return Action::Echo(rest.trim().to_string());
            }
        }

        Action::Shell(command.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{command}' exited with {status}: {stderr}")]
    ExitStatus {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Executes configured action strings
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(&self, command: &str) -> Result<(), ActionError>;
}

/// Default invoker: logs echoes, runs everything else with `sh -c`
#[derive(Debug, Clone, Default)]
pub struct ShellInvoker;

#[async_trait]
impl ActionInvoker for ShellInvoker {
    async fn invoke(&self, command: &str) -> Result<(), ActionError> {
        match Action::parse(command) {
            Action::Nothing => Ok(()),
            Action::Echo(text) => {
                log::info!("{}", text);
                Ok(())
            }
            Action::Shell(command) => run_shell(&command).await,
        }
    }
}

async fn run_shell(command: &str) -> Result<(), ActionError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ActionError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ActionError::ExitStatus {
            command: command.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

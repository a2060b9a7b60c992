//! Inter-process communication for daemon control
//!
//! Provides a Unix domain socket server for manual checks, status queries
//! and runtime configuration updates. One newline-terminated JSON request
//! per connection, answered by one newline-terminated JSON response.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::IPC_TIMEOUT;
use crate::daemon::config::DaemonConfiguration;
use crate::daemon::logging::DaemonLogger;
use crate::monitor::MonitorEngine;

/// IPC message types for daemon communication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    /// Run a poll now, bypassing the disabled and pending gates
    ForceCheck { request_id: String },
    /// Get current daemon status
    GetStatus { request_id: String },
    /// Forget the processed-entry baseline
    Reset { request_id: String },
    /// Update daemon configuration with key-value pairs
    UpdateConfig {
        updates: Vec<ConfigUpdate>,
        /// Unique request ID for tracking
        request_id: String,
    },
    /// Shutdown daemon gracefully
    Shutdown { request_id: String },
}

impl IpcMessage {
    pub fn request_id(&self) -> &str {
        match self {
            IpcMessage::ForceCheck { request_id }
            | IpcMessage::GetStatus { request_id }
            | IpcMessage::Reset { request_id }
            | IpcMessage::UpdateConfig { request_id, .. }
            | IpcMessage::Shutdown { request_id } => request_id,
        }
    }
}

/// Configuration update operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// Configuration key in dot notation (e.g., "schedule.interval_minutes")
    pub key: String,
    /// New value as string (will be parsed based on key type)
    pub value: String,
}

/// IPC response types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum IpcResponse {
    /// Successful operation
    Success {
        request_id: String,
        data: Option<serde_json::Value>,
        message: Option<String>,
    },
    /// Operation failed
    Error {
        request_id: String,
        code: u32,
        message: String,
        details: Option<String>,
    },
}

impl IpcResponse {
    fn success(request_id: String, data: Option<serde_json::Value>, message: Option<&str>) -> Self {
        IpcResponse::Success {
            request_id,
            data,
            message: message.map(str::to_string),
        }
    }

    fn error(request_id: String, code: u32, message: impl Into<String>, details: Option<String>) -> Self {
        IpcResponse::Error {
            request_id,
            code,
            message: message.into(),
            details,
        }
    }

    /// Turn an error response into an `Err`, returning the payload otherwise
    pub fn into_result(self) -> Result<(Option<serde_json::Value>, Option<String>)> {
        match self {
            IpcResponse::Success { data, message, .. } => Ok((data, message)),
            IpcResponse::Error {
                code,
                message,
                details,
                ..
            } => match details {
                Some(details) => anyhow::bail!("{} ({}): {}", message, code, details),
                None => anyhow::bail!("{} ({})", message, code),
            },
        }
    }
}

/// IPC server for handling client connections
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        // Clean up socket file when server is dropped
        if self.listener.is_some() && self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// Handler for individual IPC connections
#[derive(Clone)]
pub struct IpcServerHandler {
    engine: Arc<MonitorEngine>,
    config: Arc<Mutex<DaemonConfiguration>>,
    config_path: Option<PathBuf>,
    logger: DaemonLogger,
    shutdown: CancellationToken,
}

impl IpcServer {
    /// Create new IPC server
    pub fn new(socket_path: PathBuf) -> Result<Self> {
        Ok(Self {
            socket_path,
            listener: None,
        })
    }

    /// Bind the socket, replacing a stale socket file
    pub fn bind(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .with_context(|| format!("Failed to remove existing socket: {}", self.socket_path.display()))?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind to socket: {}", self.socket_path.display()))?;

        self.listener = Some(listener);
        log::info!("IPC server listening on {}", self.socket_path.display());
        Ok(())
    }

    /// Accept connections until `token` is cancelled
    pub async fn serve(&mut self, handler: IpcServerHandler, token: CancellationToken) -> Result<()> {
        let listener = self.listener.as_ref().context("IPC server is not bound")?;

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, _)) => {
                    // Handle connection in a separate task
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handler.handle_connection(stream).await {
                            log::warn!("Error handling IPC connection: {:#}", e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Error accepting IPC connection: {}", e);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Generate unique request ID
    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Stop the server and clean up socket file
    pub fn stop(&mut self) -> Result<()> {
        if self.listener.take().is_some() && self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .with_context(|| format!("Failed to remove socket file: {}", self.socket_path.display()))?;
        }
        Ok(())
    }
}

impl IpcServerHandler {
    pub fn new(
        engine: Arc<MonitorEngine>,
        config: Arc<Mutex<DaemonConfiguration>>,
        config_path: Option<PathBuf>,
        logger: DaemonLogger,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            config,
            config_path,
            logger,
            shutdown,
        }
    }

    /// Accept and handle a client connection
    pub async fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        // Read JSON message from client
        reader.read_line(&mut line).await.context("Failed to read from client")?;

        let response = match serde_json::from_str::<IpcMessage>(line.trim()) {
            Ok(message) => self.process_message(message).await,
            Err(e) => IpcResponse::error(String::new(), 400, "Malformed request", Some(e.to_string())),
        };

        // Send response back to client
        let response_json = serde_json::to_string(&response).context("Failed to serialize response")?;

        writer
            .write_all(response_json.as_bytes())
            .await
            .context("Failed to write response")?;
        writer.write_all(b"\n").await.context("Failed to write newline")?;

        Ok(())
    }

    /// Process an IPC message and generate appropriate response
    pub async fn process_message(&self, message: IpcMessage) -> IpcResponse {
        match message {
            IpcMessage::ForceCheck { request_id } => {
                match self.engine.force_check(Local::now().naive_local()).await {
                    Ok(report) => IpcResponse::success(request_id, to_value(&report), None),
                    Err(e) => IpcResponse::error(request_id, 500, "Check failed", Some(e.to_string())),
                }
            }
            IpcMessage::GetStatus { request_id } => {
                let status = self.engine.status(Utc::now()).await;
                IpcResponse::success(request_id, to_value(&status), None)
            }
            IpcMessage::Reset { request_id } => match self.engine.reset().await {
                Ok(()) => IpcResponse::success(request_id, None, Some("Processed-entry baseline cleared")),
                Err(e) => IpcResponse::error(request_id, 500, "Reset failed", Some(format!("{:#}", e))),
            },
            IpcMessage::UpdateConfig { updates, request_id } => self.update_config(request_id, updates).await,
            IpcMessage::Shutdown { request_id } => {
                self.shutdown.cancel();
                IpcResponse::success(request_id, None, Some("Shutting down"))
            }
        }
    }

    /// Apply all updates or none of them
    async fn update_config(&self, request_id: String, updates: Vec<ConfigUpdate>) -> IpcResponse {
        let mut config = self.config.lock().await;
        let mut updated = config.clone();
        let mut changes = Vec::with_capacity(updates.len());

        for update in &updates {
            match updated.apply_update(&update.key, &update.value) {
                Ok((old, new)) => changes.push((update.key.clone(), old, new)),
                Err(e) => return IpcResponse::error(request_id, 422, "Invalid configuration update", Some(e.to_string())),
            }
        }

        if let Some(path) = &self.config_path {
            if let Err(e) = updated.save_to_file(path) {
                return IpcResponse::error(request_id, 500, "Failed to save configuration", Some(format!("{:#}", e)));
            }
        }

        self.engine.set_config(updated.engine_config()).await;
        for (key, old, new) in &changes {
            self.logger.log_config_change(key, old, new);
        }
        *config = updated;

        let data = serde_json::json!({
            "schedule": config.schedule,
            "source": config.source,
        });
        IpcResponse::success(request_id, Some(data), Some("Configuration updated"))
    }
}

fn to_value<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Client side of the control socket
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Send one message and wait for its response
    pub async fn send(&self, message: &IpcMessage) -> Result<IpcResponse> {
        let stream = UnixStream::connect(&self.socket_path).await.with_context(|| {
            format!(
                "Failed to connect to {}. Is the daemon running?",
                self.socket_path.display()
            )
        })?;
        let (reader, mut writer) = stream.into_split();

        let request = serde_json::to_string(message).context("Failed to serialize request")?;
        writer.write_all(request.as_bytes()).await.context("Failed to send request")?;
        writer.write_all(b"\n").await.context("Failed to send request")?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        tokio::time::timeout(IPC_TIMEOUT, reader.read_line(&mut line))
            .await
            .context("Timed out waiting for the daemon")?
            .context("Failed to read response")?;

        serde_json::from_str(line.trim()).context("Failed to parse daemon response")
    }
}

//! SSH sessions for hardware probing
//!
//! [`SshConnector`] opens one authenticated [`SshSession`] per host. Probes go
//! through the [`RemoteShell`] trait so detection can run against any shell,
//! including scripted ones in tests.

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::model::Target;

/// Stderr fragments meaning "this command cannot run here"
pub const HARD_FAILURE_MARKERS: [&str; 5] = [
    "command not found",
    "permission denied",
    "a password is required",
    "não encontrado",
    "permissão negada",
];

/// Command execution result
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code
    pub exit_code: Option<u32>,
}

/// Whether stderr reports a missing tool or a refused privilege
#[must_use]
pub fn is_hard_failure(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    HARD_FAILURE_MARKERS
        .iter()
        .any(|marker| stderr.contains(marker))
}

/// Prefix a command with non-interactive sudo unless it already has one
#[must_use]
pub fn escalated(command: &str) -> String {
    let trimmed = command.trim_start();
    if trimmed.starts_with("sudo ") || trimmed == "sudo" {
        command.to_string()
    } else {
        format!("sudo -n {command}")
    }
}

/// Shell on one remote host
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Host this shell is attached to
    fn host(&self) -> &str;

    /// Run a command, optionally under sudo.
    ///
    /// Returns `None` when the command is unusable on this host: missing tool,
    /// refused privilege, transport hiccup or timeout.
    async fn run(&self, command: &str, escalate: bool) -> Option<CommandOutput>;

    /// Close the session. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens shells on targets
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Shell: RemoteShell + 'static;

    async fn connect(&self, target: &Target) -> Result<Self::Shell, SessionError>;
}

/// Login credentials; at least one of the two must be set
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
}

impl Credentials {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            private_key: None,
        }
    }

    pub fn private_key(path: impl Into<PathBuf>) -> Self {
        Self {
            password: None,
            private_key: Some(path.into()),
        }
    }

    /// Fails when neither a password nor a key path is present
    pub fn validate(&self) -> Result<(), SessionError> {
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        let has_key = self
            .private_key
            .as_deref()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if has_password || has_key {
            Ok(())
        } else {
            Err(SessionError::InvalidCredentials)
        }
    }
}

/// Timeouts and port used for every session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout: Duration::from_secs(8),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// SSH client handler for russh
struct SshHandler;

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // Host keys are not pinned
        Ok(true)
    }
}

/// Opens [`SshSession`]s with one set of credentials
#[derive(Debug, Clone)]
pub struct SshConnector {
    username: String,
    credentials: Credentials,
    options: SessionOptions,
}

impl SshConnector {
    /// Create a connector; credentials are validated before any network use
    pub fn new(username: impl Into<String>, credentials: Credentials) -> Result<Self, SessionError> {
        credentials.validate()?;
        Ok(Self {
            username: username.into(),
            credentials,
            options: SessionOptions::default(),
        })
    }

    /// Override port and timeouts
    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Connect and authenticate against `host`
    pub async fn open(&self, host: &str) -> Result<SshSession, SessionError> {
        self.credentials.validate()?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.options.command_timeout * 3),
            ..Default::default()
        });

        let connect_timeout = self.options.connect_timeout;
        let stream = tokio::time::timeout(
            connect_timeout,
            TcpStream::connect((host, self.options.port)),
        )
        .await
        .map_err(|_| connection_error(host, format!("timed out after {connect_timeout:?}")))?
        .map_err(|e| connection_error(host, e.to_string()))?;

        let mut handle = tokio::time::timeout(
            connect_timeout,
            client::connect_stream(config, stream, SshHandler),
        )
        .await
        .map_err(|_| connection_error(host, "handshake timed out".to_string()))?
        .map_err(|e| classify_transport_error(host, e))?;

        let authenticated = self.authenticate(host, &mut handle).await?;
        if !authenticated {
            return Err(SessionError::Auth {
                host: host.to_string(),
                user: self.username.clone(),
                reason: "credentials rejected".to_string(),
            });
        }

        debug!(host, user = %self.username, "SSH session established");
        Ok(SshSession {
            handle: Some(handle),
            host: host.to_string(),
            command_timeout: self.options.command_timeout,
        })
    }

    async fn authenticate(
        &self,
        host: &str,
        handle: &mut client::Handle<SshHandler>,
    ) -> Result<bool, SessionError> {
        if let Some(key_path) = &self.credentials.private_key {
            let key = load_private_key(key_path).await.map_err(|reason| SessionError::Auth {
                host: host.to_string(),
                user: self.username.clone(),
                reason,
            })?;
            let accepted = handle
                .authenticate_publickey(&self.username, Arc::new(key))
                .await
                .map_err(|e| classify_transport_error(host, e))?;
            if accepted {
                return Ok(true);
            }
            debug!(host, "Public key rejected");
        }

        match self.credentials.password.as_deref() {
            Some(password) if !password.is_empty() => handle
                .authenticate_password(&self.username, password)
                .await
                .map_err(|e| classify_transport_error(host, e)),
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Shell = SshSession;

    async fn connect(&self, target: &Target) -> Result<SshSession, SessionError> {
        self.open(&target.ip).await
    }
}

fn connection_error(host: &str, reason: String) -> SessionError {
    SessionError::Connection {
        host: host.to_string(),
        reason,
    }
}

/// Sort a russh failure into the session error taxonomy
fn classify_transport_error(host: &str, err: russh::Error) -> SessionError {
    match err {
        russh::Error::IO(_)
        | russh::Error::Disconnect
        | russh::Error::HUP
        | russh::Error::ConnectionTimeout => connection_error(host, err.to_string()),
        other => SessionError::Protocol {
            host: host.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Active SSH session
pub struct SshSession {
    handle: Option<client::Handle<SshHandler>>,
    host: String,
    command_timeout: Duration,
}

impl SshSession {
    /// Execute a command and collect its output
    async fn exec(
        handle: &client::Handle<SshHandler>,
        command: &str,
    ) -> Result<CommandOutput, russh::Error> {
        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        loop {
            match channel.wait().await {
                Some(russh::ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(russh::ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(russh::ChannelMsg::ExitStatus { exit_status: status }) => {
                    exit_status = Some(status);
                }
                Some(russh::ChannelMsg::Close) | None => break,
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code: exit_status,
        })
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn run(&self, command: &str, escalate: bool) -> Option<CommandOutput> {
        let handle = self.handle.as_ref()?;
        let command = if escalate {
            escalated(command)
        } else {
            command.to_string()
        };

        match tokio::time::timeout(self.command_timeout, Self::exec(handle, &command)).await {
            Ok(Ok(output)) if is_hard_failure(&output.stderr) => {
                debug!(host = %self.host, %command, stderr = %output.stderr.trim(), "Command unusable");
                None
            }
            Ok(Ok(output)) => Some(output),
            Ok(Err(e)) => {
                debug!(host = %self.host, %command, error = %e, "Command failed");
                None
            }
            Err(_) => {
                debug!(host = %self.host, %command, "Command timed out");
                None
            }
        }
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
            {
                warn!(host = %self.host, error = %e, "Error while closing SSH session");
            }
        }
    }
}

/// Load a private key from file
async fn load_private_key(path: &Path) -> Result<russh_keys::key::KeyPair, String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read key file {}: {e}", path.display()))?;

    russh_keys::decode_secret_key(&content, None)
        .map_err(|e| format!("Failed to decode private key {}: {e}", path.display()))
}

//! Core error types for ssh-deploy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration-related errors
///
/// These are fatal for the whole run and are always raised before any
/// archiving or network activity takes place.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither a password nor a private key was supplied
    #[error("Either a password or a private key must be supplied")]
    MissingCredentials,

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The host list contained no targets
    #[error("Host list is empty")]
    EmptyHostList,

    /// A host token was not of the form `host:port`
    #[error("Invalid host '{token}': {reason}")]
    InvalidHost { token: String, reason: String },

    /// The proxy descriptor was not of the form `user:pass@host:port`
    #[error("Invalid proxy descriptor: {0}")]
    InvalidProxy(String),

    /// The private key could not be imported
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// The target directory would wipe something it must not
    #[error("Refusing to deploy into '{0}'")]
    UnsafeTarget(String),

    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// SSH transport errors for a single host
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// TCP connection could not be established
    #[error("Failed to reach {address}: {message}")]
    Unreachable { address: String, message: String },

    /// Connection or handshake did not complete in time
    #[error("Connection to {address} timed out after {timeout:?}")]
    TimedOut { address: String, timeout: Duration },

    /// Every supplied authentication method was rejected
    #[error("Authentication rejected for user '{username}' on {address}")]
    AuthenticationFailed { username: String, address: String },

    /// Host key verification failed
    #[error("Host key verification failed for {address}: {message}")]
    HostKeyRejected { address: String, message: String },

    /// Any other SSH-level failure
    #[error("SSH error on {address}: {message}")]
    Protocol { address: String, message: String },
}

/// Classification of a per-host failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Packaging the source directory failed
    Archive,
    /// The SOCKS5 proxy refused or could not be reached
    Proxy,
    /// SSH connection, handshake or authentication failed
    Connection,
    /// A remote shell step exited non-zero
    RemoteCommand,
    /// Uploading the artifact failed
    Transfer,
    /// The per-attempt deadline elapsed
    Timeout,
    /// The attempt task panicked or was cancelled
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Archive => "archive",
            ErrorKind::Proxy => "proxy",
            ErrorKind::Connection => "connection",
            ErrorKind::RemoteCommand => "remote_command",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// Errors that end a single host's deployment attempt
///
/// None of these ever propagate past the attempt boundary; the orchestrator
/// turns them into a failed `DeployResult`.
#[derive(Error, Debug)]
pub enum DeployError {
    /// Packaging failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Tunnel through the SOCKS5 proxy failed
    #[error("Proxy {proxy} failed: {message}")]
    Proxy {
        proxy: String,
        message: String,
        auth_rejected: bool,
    },

    /// SSH connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A remote command returned a non-zero status (or none at all)
    #[error("`{command}` failed on {host} with {}: {stderr}", describe_status(.exit_status))]
    RemoteCommand {
        host: String,
        command: String,
        exit_status: Option<u32>,
        stderr: String,
    },

    /// File transfer failed
    #[error("Upload of {file} to {host} failed: {message}")]
    Transfer {
        host: String,
        file: String,
        message: String,
    },

    /// The whole attempt exceeded its deadline
    #[error("Deployment to {host} did not finish within {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    /// The attempt task died
    #[error("Deployment task for {host} aborted: {message}")]
    Aborted { host: String, message: String },
}

fn describe_status(status: &Option<u32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "no exit status".to_string(),
    }
}

impl DeployError {
    /// The failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Archive(_) => ErrorKind::Archive,
            DeployError::Proxy { .. } => ErrorKind::Proxy,
            DeployError::Connection(_) => ErrorKind::Connection,
            DeployError::RemoteCommand { .. } => ErrorKind::RemoteCommand,
            DeployError::Transfer { .. } => ErrorKind::Transfer,
            DeployError::Timeout { .. } => ErrorKind::Timeout,
            DeployError::Aborted { .. } => ErrorKind::Aborted,
        }
    }
}

//! Remote session traits
//!
//! The deploy pipeline only needs two things from a transport: run a shell
//! command and get its status back, and put a local file into a remote
//! directory. Keeping that behind a trait lets the sequencer and the
//! orchestrator run against the real SSH client or a scripted mock.

use async_trait::async_trait;
use std::path::Path;

use crate::error::DeployError;
use crate::types::HostTarget;

/// Result of a remote shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, `None` if the server never reported one
    pub exit_status: Option<u32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// stderr as text, falling back to stdout when stderr is empty
    pub fn diagnostic(&self) -> String {
        let stderr = String::from_utf8_lossy(&self.stderr);
        let text = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&self.stdout)
        } else {
            stderr
        };
        text.trim().to_string()
    }
}

/// An authenticated session to one host
#[async_trait]
pub trait RemoteSession: Send {
    /// Host this session is connected to
    fn target(&self) -> &HostTarget;

    /// Run a shell command and wait for it to exit
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, DeployError>;

    /// Copy a local file into `remote_dir`, keeping its name and permissions
    ///
    /// Returns the number of bytes written.
    async fn upload(&mut self, local: &Path, remote_dir: &str) -> Result<u64, DeployError>;

    /// Close the session and release the transport
    async fn close(&mut self) -> Result<(), DeployError>;
}

/// Opens sessions to hosts
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// The session type produced by this connector
    type Session: RemoteSession + 'static;

    /// Connect and authenticate to `target`
    async fn connect(&self, target: &HostTarget) -> Result<Self::Session, DeployError>;
}

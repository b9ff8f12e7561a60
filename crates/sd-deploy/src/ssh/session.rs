//! Authenticated SSH session used by the deploy sequencer

use std::path::Path;

use async_trait::async_trait;
use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::AsyncWriteExt;

use sd_core::traits::{CommandOutput, RemoteSession};
use sd_core::{ConnectionError, DeployError, HostTarget};

use super::handler::ClientHandler;

/// A live SSH connection to one host
pub struct SshSession {
    target: HostTarget,
    handle: Handle<ClientHandler>,
    closed: bool,
}

impl SshSession {
    pub(crate) fn new(target: HostTarget, handle: Handle<ClientHandler>) -> Self {
        Self {
            target,
            handle,
            closed: false,
        }
    }

    fn channel_error(&self, err: russh::Error) -> DeployError {
        ConnectionError::Protocol {
            address: self.target.address(),
            message: err.to_string(),
        }
        .into()
    }

    fn transfer_error(&self, local: &Path, message: impl std::fmt::Display) -> DeployError {
        DeployError::Transfer {
            host: self.target.address(),
            file: local.display().to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn target(&self) -> &HostTarget {
        &self.target
    }

    async fn exec(&mut self, command: &str) -> Result<CommandOutput, DeployError> {
        tracing::trace!("{} $ {}", self.target, command);

        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| self.channel_error(e))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| self.channel_error(e))?;

        let mut output = CommandOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
                // ext 1 is stderr
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    output.stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status } => output.exit_status = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    tracing::warn!("`{}` on {} killed by {:?}", command, self.target, signal_name);
                }
                _ => {}
            }
        }

        Ok(output)
    }

    async fn upload(&mut self, local: &Path, remote_dir: &str) -> Result<u64, DeployError> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| self.transfer_error(local, "local path has no file name"))?;
        let remote_path = format!("{}/{}", remote_dir.trim_end_matches('/'), file_name);

        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|e| self.transfer_error(local, e))?;

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| self.channel_error(e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| self.channel_error(e))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| self.transfer_error(local, format!("sftp unavailable: {}", e)))?;

        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| self.transfer_error(local, e))?;
        let mut remote = sftp
            .create(remote_path.clone())
            .await
            .map_err(|e| self.transfer_error(local, format!("create {}: {}", remote_path, e)))?;

        let written = tokio::io::copy(&mut source, &mut remote)
            .await
            .map_err(|e| self.transfer_error(local, e))?;
        remote
            .shutdown()
            .await
            .map_err(|e| self.transfer_error(local, e))?;

        sftp.set_metadata(remote_path.clone(), file_attributes(&metadata))
            .await
            .map_err(|e| {
                self.transfer_error(local, format!("set attributes on {}: {}", remote_path, e))
            })?;

        if let Err(e) = sftp.close().await {
            tracing::debug!("Closing sftp channel to {} failed: {}", self.target, e);
        }

        tracing::debug!("Uploaded {} bytes to {}:{}", written, self.target, remote_path);
        Ok(written)
    }

    async fn close(&mut self) -> Result<(), DeployError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.handle
            .disconnect(Disconnect::ByApplication, "deployment finished", "en")
            .await
            .map_err(|e| self.channel_error(e))
    }
}

/// Permission bits and modification time to mirror on the remote copy
fn file_attributes(metadata: &std::fs::Metadata) -> FileAttributes {
    #[cfg(unix)]
    let permissions = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o7777
    };
    #[cfg(not(unix))]
    let permissions = if metadata.permissions().readonly() { 0o444 } else { 0o644 };

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as u32);

    FileAttributes {
        permissions: Some(permissions),
        mtime,
        atime: mtime,
        ..Default::default()
    }
}

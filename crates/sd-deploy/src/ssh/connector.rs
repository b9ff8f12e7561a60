//! Outbound SSH connector
//!
//! Dials a host (directly or through the proxy tunnel), runs the SSH
//! handshake and authenticates with the job's credentials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::Disconnect;

use sd_core::config::DeployConfig;
use sd_core::traits::SessionConnector;
use sd_core::{
    ConnectionError, Credentials, DeployError, DeploymentJob, HostTarget, ProxyDescriptor,
};

use super::handler::{ClientHandler, HostKeyPolicy};
use super::session::SshSession;
use crate::tunnel::Dialer;

/// Opens authenticated SSH sessions for a job
pub struct SshConnector {
    credentials: Credentials,
    dialer: Dialer,
    host_key_policy: HostKeyPolicy,
    connect_timeout: Duration,
    ssh_config: Arc<Config>,
}

impl SshConnector {
    /// Create a connector
    pub fn new(
        credentials: Credentials,
        proxy: Option<ProxyDescriptor>,
        config: &DeployConfig,
    ) -> Self {
        let host_key_policy = if config.verify_host_key {
            HostKeyPolicy::KnownHosts(config.known_hosts_path.clone())
        } else {
            HostKeyPolicy::AcceptAny
        };

        let inactivity_timeout =
            (!config.inactivity_timeout.is_zero()).then_some(config.inactivity_timeout);
        let ssh_config = Config {
            inactivity_timeout,
            ..Default::default()
        };

        Self {
            credentials,
            dialer: Dialer::new(proxy),
            host_key_policy,
            connect_timeout: config.connect_timeout,
            ssh_config: Arc::new(ssh_config),
        }
    }

    /// Create a connector for every host of `job`
    pub fn from_job(job: &DeploymentJob, config: &DeployConfig) -> Self {
        Self::new(job.credentials.clone(), job.proxy.clone(), config)
    }

    /// The dialer used to open transports
    pub fn dialer(&self) -> &Dialer {
        &self.dialer
    }

    /// Host key policy in effect
    pub fn host_key_policy(&self) -> &HostKeyPolicy {
        &self.host_key_policy
    }

    /// Dial, handshake and authenticate
    async fn establish(&self, target: &HostTarget) -> Result<SshSession, DeployError> {
        let transport = self.dialer.dial(target).await?;

        let handler = ClientHandler::new(target.clone(), self.host_key_policy.clone());
        let mut handle = client::connect_stream(Arc::clone(&self.ssh_config), transport, handler)
            .await
            .map_err(|e| handshake_error(target, e))?;

        tracing::debug!(
            "Authenticating to {} as user '{}'",
            target,
            self.credentials.username()
        );
        if !self.authenticate(&mut handle, target).await? {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(ConnectionError::AuthenticationFailed {
                username: self.credentials.username().to_string(),
                address: target.address(),
            }
            .into());
        }

        tracing::debug!("Authenticated to {}", target);
        Ok(SshSession::new(target.clone(), handle))
    }

    /// Try the key first, then the password
    async fn authenticate(
        &self,
        handle: &mut Handle<ClientHandler>,
        target: &HostTarget,
    ) -> Result<bool, DeployError> {
        let username = self.credentials.username();

        if let Some(key) = self.credentials.private_key() {
            let accepted = handle
                .authenticate_publickey(username, key)
                .await
                .map_err(|e| protocol_error(target, e))?;
            if accepted {
                return Ok(true);
            }
            tracing::debug!("Public key rejected by {}", target);
        }

        if let Some(password) = self.credentials.password() {
            let accepted = handle
                .authenticate_password(username, password)
                .await
                .map_err(|e| protocol_error(target, e))?;
            if accepted {
                return Ok(true);
            }
            tracing::debug!("Password rejected by {}", target);
        }

        Ok(false)
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    type Session = SshSession;

    async fn connect(&self, target: &HostTarget) -> Result<SshSession, DeployError> {
        tracing::debug!("Connecting to {}", target);
        tokio::time::timeout(self.connect_timeout, self.establish(target))
            .await
            .map_err(|_| ConnectionError::TimedOut {
                address: target.address(),
                timeout: self.connect_timeout,
            })?
    }
}

fn handshake_error(target: &HostTarget, err: anyhow::Error) -> DeployError {
    if let Some(russh::Error::UnknownKey) = err.downcast_ref::<russh::Error>() {
        return ConnectionError::HostKeyRejected {
            address: target.address(),
            message: "server host key is not trusted".to_string(),
        }
        .into();
    }

    ConnectionError::Protocol {
        address: target.address(),
        message: format!("handshake failed: {}", err),
    }
    .into()
}

fn protocol_error(target: &HostTarget, err: russh::Error) -> DeployError {
    ConnectionError::Protocol {
        address: target.address(),
        message: err.to_string(),
    }
    .into()
}

//! russh client handler

use std::path::PathBuf;

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

use sd_core::HostTarget;

/// How server host keys are treated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents.
    ///
    /// This is the default for throwaway deploy targets and means the
    /// connection is open to man-in-the-middle interception.
    AcceptAny,
    /// Require the key to match known_hosts (the user's file, or the given path)
    KnownHosts(Option<PathBuf>),
}

/// Client handler for one deploy connection
pub(crate) struct ClientHandler {
    target: HostTarget,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub(crate) fn new(target: HostTarget, policy: HostKeyPolicy) -> Self {
        Self { target, policy }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Verify the server's host key according to the configured policy
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Host key for {}: {}", self.target, fingerprint);

        match &self.policy {
            HostKeyPolicy::AcceptAny => Ok(true),
            HostKeyPolicy::KnownHosts(path) => {
                let known = match path {
                    Some(path) => russh_keys::check_known_hosts_path(
                        &self.target.host,
                        self.target.port,
                        server_public_key,
                        path,
                    ),
                    None => russh_keys::check_known_hosts(
                        &self.target.host,
                        self.target.port,
                        server_public_key,
                    ),
                };

                match known {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        tracing::warn!(
                            "Host key for {} ({}) is not in known_hosts",
                            self.target,
                            fingerprint
                        );
                        Ok(false)
                    }
                    Err(e) => {
                        tracing::warn!("Host key check for {} failed: {}", self.target, e);
                        Ok(false)
                    }
                }
            }
        }
    }
}

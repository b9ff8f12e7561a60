//! Shared test doubles for the deploy engine

#![allow(dead_code)]

pub mod server;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use sd_core::traits::{CommandOutput, RemoteSession, SessionConnector};
use sd_core::{ConnectionError, DeployError, DeploymentJob, HostTarget, JobInputs};
use sd_deploy::Artifact;

/// How a mocked host behaves
#[derive(Debug, Clone)]
pub enum HostBehavior {
    /// Every command succeeds
    Healthy,
    /// The TCP connection is refused
    Refuse,
    /// The proxy rejects our credentials for this host
    ProxyRejects,
    /// Commands containing the pattern exit with status 9
    FailCommand(&'static str),
    /// Connecting never completes
    Hang,
    /// The connect call panics
    Panic,
}

/// Records what a connector was asked to do
#[derive(Default)]
pub struct Recorder {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub commands: Mutex<HashMap<String, Vec<String>>>,
}

impl Recorder {
    /// Commands (and uploads) run on `host`, in order
    pub fn commands_for(&self, host: &str) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, host: &str, entry: String) {
        self.commands
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .push(entry);
    }
}

/// Connector whose hosts follow scripted behaviors
pub struct MockConnector {
    behaviors: HashMap<String, HostBehavior>,
    pub recorder: Arc<Recorder>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// Script a host (unscripted hosts are healthy)
    pub fn host(mut self, host: &str, behavior: HostBehavior) -> Self {
        self.behaviors.insert(host.to_string(), behavior);
        self
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, target: &HostTarget) -> Result<MockSession, DeployError> {
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(&target.host)
            .cloned()
            .unwrap_or(HostBehavior::Healthy);

        match behavior {
            HostBehavior::Refuse => Err(ConnectionError::Unreachable {
                address: target.address(),
                message: "Connection refused (os error 111)".to_string(),
            }
            .into()),
            HostBehavior::ProxyRejects => Err(DeployError::Proxy {
                proxy: "proxy.example.com:1080".to_string(),
                message: "proxy rejected credentials for user 'user'".to_string(),
                auth_rejected: true,
            }),
            HostBehavior::Hang => std::future::pending().await,
            HostBehavior::Panic => panic!("connector blew up for {}", target),
            behavior => Ok(MockSession {
                target: target.clone(),
                behavior,
                recorder: Arc::clone(&self.recorder),
            }),
        }
    }
}

/// Session produced by `MockConnector`
pub struct MockSession {
    target: HostTarget,
    behavior: HostBehavior,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl RemoteSession for MockSession {
    fn target(&self) -> &HostTarget {
        &self.target
    }

    async fn exec(&mut self, command: &str) -> Result<CommandOutput, DeployError> {
        self.recorder.record(&self.target.host, command.to_string());
        tokio::task::yield_now().await;

        let failed = matches!(self.behavior, HostBehavior::FailCommand(p) if command.contains(p));
        Ok(CommandOutput {
            exit_status: Some(if failed { 9 } else { 0 }),
            stdout: Vec::new(),
            stderr: if failed {
                b"unzip: cannot find or open archive".to_vec()
            } else {
                Vec::new()
            },
        })
    }

    async fn upload(&mut self, local: &Path, remote_dir: &str) -> Result<u64, DeployError> {
        self.recorder.record(
            &self.target.host,
            format!("upload {} -> {}", local.display(), remote_dir),
        );
        Ok(0)
    }

    async fn close(&mut self) -> Result<(), DeployError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Job deploying `source` to /srv/app on `hosts`
pub fn job(source: &Path, hosts: &str, proxy: Option<&str>) -> DeploymentJob {
    DeploymentJob::from_inputs(JobInputs {
        source_dir: Some(source.to_path_buf()),
        target_dir: Some("/srv/app".to_string()),
        hosts: Some(hosts.to_string()),
        username: Some("deploy".to_string()),
        password: Some("secret".to_string()),
        proxy: proxy.map(str::to_string),
        ..Default::default()
    })
    .expect("test job should be valid")
}

/// A small artifact file on disk
pub async fn artifact(dir: &Path) -> Arc<Artifact> {
    let path: PathBuf = dir.join("dist.zip");
    std::fs::write(&path, b"PK\x05\x06").unwrap();
    Arc::new(Artifact::from_path(path).await.unwrap())
}

//! Deployment configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Tunables for a deployment run
///
/// Everything here has a default; the job itself (hosts, paths, credentials)
/// is not part of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Timeout for TCP/proxy connect plus SSH handshake and authentication
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Deadline for one host's whole attempt (0 disables)
    #[serde(with = "duration_secs")]
    pub attempt_timeout: Duration,

    /// Close the SSH connection after this much silence
    #[serde(with = "duration_secs")]
    pub inactivity_timeout: Duration,

    /// Check server host keys against known_hosts.
    ///
    /// Off by default: targets are usually short-lived CI machines whose keys
    /// are not known in advance. Leaving this off accepts any host key.
    pub verify_host_key: bool,

    /// known_hosts file to check against (defaults to ~/.ssh/known_hosts)
    pub known_hosts_path: Option<PathBuf>,

    /// Name of the staging directory created inside the target
    pub staging_dir_name: String,

    /// Remote program used to unpack the artifact
    pub extract_program: String,

    /// Local packaging settings
    pub archive: ArchiveConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(600),
            inactivity_timeout: Duration::from_secs(300),
            verify_host_key: false,
            known_hosts_path: None,
            staging_dir_name: "tmp".to_string(),
            extract_program: "unzip".to_string(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl DeployConfig {
    /// Per-attempt deadline, if enabled
    pub fn attempt_deadline(&self) -> Option<Duration> {
        (!self.attempt_timeout.is_zero()).then_some(self.attempt_timeout)
    }
}

/// How the source directory is packaged
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Packaging program (must accept zip's `-q -r -y` flags)
    pub program: String,

    /// Where the artifact is written (defaults to the system temp dir)
    pub output_dir: Option<PathBuf>,

    /// Archive the directory itself instead of its contents
    pub include_root_dir: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            program: "zip".to_string(),
            output_dir: None,
            include_root_dir: false,
        }
    }
}

impl ArchiveConfig {
    /// Resolved artifact directory
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

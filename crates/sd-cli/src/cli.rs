//! Command-line arguments and their translation into a job

use std::path::PathBuf;

use clap::Parser;

use sd_core::config::{self, DeployConfig};
use sd_core::{ConfigError, JobInputs};

/// Deploy a directory to many hosts over SSH
#[derive(Parser, Debug)]
#[command(name = "ssh-deploy")]
#[command(author, version, about = "Package a directory and deploy it to many hosts over SSH")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Local directory to deploy
    #[arg(short, long, env = "INPUT_SOURCE")]
    pub source: Option<PathBuf>,

    /// Remote directory to replace
    #[arg(short, long, env = "INPUT_TARGET")]
    pub target: Option<String>,

    /// Comma-separated host:port list
    #[arg(long, env = "INPUT_HOST")]
    pub hosts: Option<String>,

    /// SSH login name
    #[arg(short, long, env = "INPUT_USERNAME")]
    pub username: Option<String>,

    /// SSH password
    #[arg(long, env = "INPUT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Private key contents (PEM / OpenSSH)
    #[arg(long, env = "INPUT_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Read the private key from a file (takes precedence over --key)
    #[arg(long)]
    pub key_file: Option<PathBuf>,

    /// Passphrase for an encrypted private key
    #[arg(long, env = "INPUT_KEY_PASSPHRASE", hide_env_values = true)]
    pub key_passphrase: Option<String>,

    /// SOCKS5 proxy as user:pass@host:port
    #[arg(long, env = "INPUT_PROXY", hide_env_values = true)]
    pub proxy: Option<String>,

    /// Check server host keys against known_hosts
    #[arg(long)]
    pub verify_host_key: bool,

    /// Print the run outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Effective log filter, before RUST_LOG is considered
    pub fn log_filter(&self) -> &str {
        match self.verbose {
            0 => &self.log_level,
            1 => "debug",
            _ => "trace",
        }
    }

    /// Raw job inputs, with `--key-file` read into memory
    pub fn job_inputs(&self) -> Result<JobInputs, ConfigError> {
        let private_key = match &self.key_file {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                ConfigError::InvalidKey(format!("cannot read {}: {}", path.display(), e))
            })?),
            None => self.key.clone(),
        };

        Ok(JobInputs {
            source_dir: self.source.clone(),
            target_dir: self.target.clone(),
            hosts: self.hosts.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            private_key,
            key_passphrase: self.key_passphrase.clone(),
            proxy: self.proxy.clone(),
        })
    }

    /// Deployment settings
    ///
    /// An explicit `--config` must exist. Otherwise the default config file
    /// is used when present and built-in defaults when not.
    pub fn deploy_config(&self) -> Result<DeployConfig, ConfigError> {
        let mut deploy_config = match &self.config {
            Some(path) => config::load_config(path)?,
            None => {
                let path = config::default_config_path();
                if path.exists() {
                    tracing::debug!("Loading config from {:?}", path);
                    config::load_config(&path)?
                } else {
                    DeployConfig::default()
                }
            }
        };

        if self.verify_host_key {
            deploy_config.verify_host_key = true;
        }
        Ok(deploy_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("ssh-deploy").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_become_job_inputs() {
        let args = parse(&[
            "--source",
            "./dist",
            "--target",
            "/srv/app",
            "--hosts",
            "a.example.com:22",
            "--username",
            "deploy",
            "--password",
            "secret",
        ]);
        let inputs = args.job_inputs().unwrap();
        assert_eq!(inputs.source_dir, Some(PathBuf::from("./dist")));
        assert_eq!(inputs.target_dir.as_deref(), Some("/srv/app"));
        assert_eq!(inputs.hosts.as_deref(), Some("a.example.com:22"));
        assert_eq!(inputs.password.as_deref(), Some("secret"));
        assert!(inputs.private_key.is_none());
    }

    #[test]
    fn test_key_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "KEY MATERIAL").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let inputs = parse(&["--key-file", &path]).job_inputs().unwrap();
        assert_eq!(inputs.private_key.as_deref(), Some("KEY MATERIAL"));
    }

    #[test]
    fn test_missing_key_file_is_config_error() {
        let err = parse(&["--key-file", "/nonexistent/id_ed25519"])
            .job_inputs()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey(_)));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let err = parse(&["--config", "/nonexistent/ssh-deploy.toml"])
            .deploy_config()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_verify_host_key_flag_overrides_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "verify_host_key = false\nattempt_timeout = 60").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let config = parse(&["--config", &path, "--verify-host-key"])
            .deploy_config()
            .unwrap();
        assert!(config.verify_host_key);
        assert_eq!(config.attempt_timeout.as_secs(), 60);
    }

    #[test]
    fn test_log_filter() {
        assert_eq!(parse(&[]).log_filter(), "info");
        assert_eq!(parse(&["--log-level", "warn"]).log_filter(), "warn");
        assert_eq!(parse(&["-v"]).log_filter(), "debug");
        assert_eq!(parse(&["-vv"]).log_filter(), "trace");
    }
}

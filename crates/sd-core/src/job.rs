//! Deployment job description
//!
//! A `DeploymentJob` is built once from whatever the caller collected
//! (flags, environment, a CI action's inputs) and is read-only afterwards.
//! All validation happens here so that a bad job never reaches the network.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use russh_keys::key::KeyPair;

use crate::error::ConfigError;
use crate::types::{parse_host_list, HostTarget, ProxyDescriptor};

/// SSH login material for every host of a job
///
/// Both a password and a key may be present; authentication tries the key
/// first and falls back to the password.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: Option<String>,
    private_key: Option<Arc<KeyPair>>,
}

impl Credentials {
    /// Build credentials, importing the private key once
    ///
    /// Empty strings count as absent.
    pub fn new(
        username: impl Into<String>,
        password: Option<String>,
        private_key: Option<&str>,
        passphrase: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let password = password.filter(|p| !p.is_empty());
        let private_key = private_key.filter(|k| !k.trim().is_empty());

        if password.is_none() && private_key.is_none() {
            return Err(ConfigError::MissingCredentials);
        }

        let username = username.into();
        if username.is_empty() {
            return Err(ConfigError::MissingField("username".to_string()));
        }

        let private_key = match private_key {
            Some(pem) => {
                let passphrase = passphrase.filter(|p| !p.is_empty());
                let key = russh_keys::decode_secret_key(pem, passphrase)
                    .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
                Some(Arc::new(key))
            }
            None => None,
        };

        Ok(Self {
            username,
            password,
            private_key,
        })
    }

    /// Login name on the remote hosts
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Plaintext password, if supplied
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Imported private key, if supplied
    pub fn private_key(&self) -> Option<Arc<KeyPair>> {
        self.private_key.clone()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Raw job inputs as supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct JobInputs {
    pub source_dir: Option<PathBuf>,
    pub target_dir: Option<String>,
    pub hosts: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub key_passphrase: Option<String>,
    pub proxy: Option<String>,
}

/// A validated deployment job
#[derive(Debug, Clone)]
pub struct DeploymentJob {
    pub source_dir: PathBuf,
    pub target_dir: String,
    pub hosts: Vec<HostTarget>,
    pub credentials: Credentials,
    pub proxy: Option<ProxyDescriptor>,
}

impl DeploymentJob {
    /// Validate raw inputs into a job
    ///
    /// Credentials presence is checked first, before anything else is
    /// looked at.
    pub fn from_inputs(inputs: JobInputs) -> Result<Self, ConfigError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let password = non_empty(inputs.password);
        let private_key = non_empty(inputs.private_key);
        if password.is_none() && private_key.is_none() {
            return Err(ConfigError::MissingCredentials);
        }

        let missing = |field: &str| ConfigError::MissingField(field.to_string());

        let username = non_empty(inputs.username).ok_or_else(|| missing("username"))?;
        let source_dir = inputs
            .source_dir
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| missing("source"))?;
        let target_dir =
            normalize_target(&non_empty(inputs.target_dir).ok_or_else(|| missing("target"))?)?;

        let hosts_raw =
            non_empty(inputs.hosts).ok_or_else(|| ConfigError::MissingField("host".to_string()))?;
        let hosts = parse_host_list(&hosts_raw)?;
        tracing::debug!("Parsed {} host target(s)", hosts.len());

        let proxy = non_empty(inputs.proxy)
            .map(|raw| ProxyDescriptor::parse(&raw))
            .transpose()?;

        let credentials = Credentials::new(
            username,
            password,
            private_key.as_deref(),
            inputs.key_passphrase.as_deref(),
        )?;

        Ok(Self {
            source_dir,
            target_dir,
            hosts,
            credentials,
            proxy,
        })
    }
}

/// Strip trailing slashes and refuse the filesystem root
fn normalize_target(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::UnsafeTarget(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

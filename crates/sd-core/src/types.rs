//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A single deployment destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostTarget {
    pub host: String,
    pub port: u16,
}

impl HostTarget {
    /// Create a new host target
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a `host:port` token
    ///
    /// The token must contain exactly one `:`; the port must be in 1-65535.
    pub fn parse(token: &str) -> Result<Self, ConfigError> {
        let token = token.trim();
        let invalid = |reason: &str| ConfigError::InvalidHost {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        if token.matches(':').count() != 1 {
            return Err(invalid("expected exactly one ':' between host and port"));
        }

        let (host, port) = token
            .split_once(':')
            .ok_or_else(|| invalid("missing port"))?;

        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(invalid("host must not contain whitespace"));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| invalid("port must be a number between 1 and 65535"))?;
        if port == 0 {
            return Err(invalid("port must be a number between 1 and 65535"));
        }

        Ok(Self::new(host, port))
    }

    /// `host:port` form used for dialing and logging
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostTarget {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a comma-separated host list into targets, keeping order
///
/// A string without a comma is a single target. Empty tokens (for example a
/// trailing comma) are rejected rather than skipped.
pub fn parse_host_list(raw: &str) -> Result<Vec<HostTarget>, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::EmptyHostList);
    }

    raw.split(',').map(HostTarget::parse).collect()
}

/// SOCKS5 proxy with username/password authentication
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyDescriptor {
    pub username: String,
    pub password: String,
    pub proxy_host: String,
    pub proxy_port: u16,
}

impl ProxyDescriptor {
    /// Parse a `user:pass@host:port` token
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = |reason: &str| {
            ConfigError::InvalidProxy(format!("{} (expected user:pass@host:port)", reason))
        };

        if raw.matches('@').count() != 1 {
            return Err(invalid("expected exactly one '@'"));
        }
        let (auth, endpoint) = raw.split_once('@').ok_or_else(|| invalid("missing '@'"))?;

        if auth.matches(':').count() != 1 {
            return Err(invalid("credentials must be user:pass"));
        }
        if endpoint.matches(':').count() != 1 {
            return Err(invalid("endpoint must be host:port"));
        }

        let (username, password) = auth
            .split_once(':')
            .ok_or_else(|| invalid("credentials must be user:pass"))?;
        let (proxy_host, port) = endpoint
            .split_once(':')
            .ok_or_else(|| invalid("endpoint must be host:port"))?;

        if username.is_empty() {
            return Err(invalid("username is empty"));
        }
        if proxy_host.is_empty() {
            return Err(invalid("proxy host is empty"));
        }
        let proxy_port: u16 = match port.parse() {
            Ok(p) if p != 0 => p,
            _ => return Err(invalid("proxy port must be a number between 1 and 65535")),
        };

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            proxy_host: proxy_host.to_string(),
            proxy_port,
        })
    }

    /// `host:port` of the proxy itself
    pub fn address(&self) -> String {
        format!("{}:{}", self.proxy_host, self.proxy_port)
    }
}

// Never print the proxy password.
impl fmt::Debug for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyDescriptor")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("proxy_host", &self.proxy_host)
            .field("proxy_port", &self.proxy_port)
            .finish()
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.proxy_host, self.proxy_port)
    }
}

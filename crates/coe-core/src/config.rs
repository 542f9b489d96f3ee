//! Configuration structures for directory deployments.
//!
//! A [`DirectoryConfig`] describes one directory deployment: where it lives, which service
//! account to bind as, and whether to degrade to anonymous read access when that bind fails.
//! Loading the values (files, environment) is left to the hosting application.

use crate::Error;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Default LDAP port.
pub const DEFAULT_LDAP_PORT: u16 = 389;
/// Default LDAPS port.
pub const DEFAULT_LDAPS_PORT: u16 = 636;
/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// Server of the UF Active Directory deployment.
pub const UFAD_SERVER: &str = "ldaps://ldap.ad.ufl.edu";
/// Server of the UF public directory deployment.
pub const UFDIR_SERVER: &str = "ldaps://dir.ufl.edu";

/// Connection and bind settings for one directory deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Server URL, e.g. `ldaps://ldap.example.edu`
    #[validate(url)]
    pub server: String,

    /// Port; overrides any port present in `server`
    #[validate(range(min = 1))]
    #[serde(default = "default_port")]
    pub port: u16,

    /// DN of the service account to bind as; anonymous when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_identity: Option<String>,

    /// Secret of the service account
    #[serde(default, skip_serializing)]
    pub bind_secret: Option<SecretString>,

    /// Bind anonymously if the service account bind fails
    #[serde(default)]
    pub anonymous_fallback: bool,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to a custom CA certificate (PEM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Transport connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds, enforced by the transport
    #[validate(range(min = 1, max = 300))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_timeout_secs: Option<u64>,
}

const fn default_port() -> u16 {
    DEFAULT_LDAP_PORT
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

impl DirectoryConfig {
    /// Create a new configuration for the given server URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(server: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            server: server.into(),
            port: default_port(),
            bind_identity: None,
            bind_secret: None,
            anonymous_fallback: false,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: default_connection_timeout_secs(),
            operation_timeout_secs: None,
        };

        config.validate()?;
        Ok(config)
    }

    /// Preset for the UF Active Directory deployment.
    #[must_use]
    pub fn ufad() -> Self {
        Self {
            server: UFAD_SERVER.to_string(),
            port: DEFAULT_LDAPS_PORT,
            ..Self::default()
        }
    }

    /// Preset for the UF public directory deployment.
    #[must_use]
    pub fn ufdir() -> Self {
        Self {
            server: UFDIR_SERVER.to_string(),
            port: DEFAULT_LDAPS_PORT,
            ..Self::default()
        }
    }

    /// Set the service account credentials.
    #[must_use]
    pub fn with_bind(mut self, identity: impl Into<String>, secret: impl Into<String>) -> Self {
        self.bind_identity = Some(identity.into());
        self.bind_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Set the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Allow or forbid the anonymous fallback bind.
    #[must_use]
    pub const fn with_anonymous_fallback(mut self, allow: bool) -> Self {
        self.anonymous_fallback = allow;
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Set the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Set the per-operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = Some(seconds);
        self
    }

    /// Get the connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get the operation timeout as a Duration, when configured.
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            server: "ldap://localhost".to_string(),
            port: default_port(),
            bind_identity: None,
            bind_secret: None,
            anonymous_fallback: false,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: default_connection_timeout_secs(),
            operation_timeout_secs: None,
        }
    }
}

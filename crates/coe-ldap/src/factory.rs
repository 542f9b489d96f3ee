//! Bound connection setup from configuration.

use coe_core::{DirectoryConfig, Error};
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::connection::Connection;
use crate::directory::DirectorySchema;
use crate::transport::{LdapConnector, RealLdapConnector, TransportSettings};
use crate::Result;

/// The known UF directory deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryKind {
    /// UF Active Directory; see [`crate::Ufad`].
    Ufad,
    /// UF public directory; see [`crate::Ufdir`].
    Ufdir,
}

impl DirectoryKind {
    /// Connection preset of this deployment, unbound and without fallback.
    #[must_use]
    pub fn config(self) -> DirectoryConfig {
        match self {
            Self::Ufad => DirectoryConfig::ufad(),
            Self::Ufdir => DirectoryConfig::ufdir(),
        }
    }

    /// Attribute schema of this deployment.
    #[must_use]
    pub fn schema(self) -> DirectorySchema {
        match self {
            Self::Ufad => DirectorySchema::ufad(),
            Self::Ufdir => DirectorySchema::ufdir(),
        }
    }

    /// Factory over this deployment's preset, with `customize` applied to the preset first.
    #[must_use]
    pub fn connection_factory(
        self,
        customize: impl FnOnce(DirectoryConfig) -> DirectoryConfig,
    ) -> ConnectionFactory {
        ConnectionFactory::new(customize(self.config()))
    }
}

enum Memo {
    Pending,
    Ready(Connection),
    Failed,
}

/// Builds the bound connection described by a [`DirectoryConfig`] and remembers it.
///
/// Failures are collected as human-readable messages in [`ConnectionFactory::errors`]. The
/// outcome of the first [`ConnectionFactory::connection`] call is kept, failure included, so
/// a failed factory must be replaced to retry.
pub struct ConnectionFactory {
    config: DirectoryConfig,
    connector: Arc<dyn LdapConnector>,
    errors: Vec<String>,
    memo: Memo,
}

impl ConnectionFactory {
    /// Creates a factory that talks to the configured server over `ldap3`.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let connector = RealLdapConnector::new(TransportSettings::from_config(&config));
        Self::with_connector(config, Arc::new(connector))
    }

    /// Creates a factory using a custom connector.
    #[must_use]
    pub fn with_connector(config: DirectoryConfig, connector: Arc<dyn LdapConnector>) -> Self {
        Self {
            config,
            connector,
            errors: Vec::new(),
            memo: Memo::Pending,
        }
    }

    /// Configuration this factory was created with.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Messages collected so far, oldest first.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Records an error message.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// The configured bound connection, established on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] without contacting the server if the configuration
    /// is invalid, and [`Error::Unavailable`] with the collected messages if the connection
    /// could not be established or bound.
    pub async fn connection(&mut self) -> Result<&mut Connection> {
        if matches!(self.memo, Memo::Pending) {
            self.config.validate()?;
            let config = &self.config;
            let outcome = establish(
                &self.connector,
                &config.server,
                config.port,
                config.bind_identity.as_deref(),
                config.bind_secret.as_ref(),
                config.anonymous_fallback,
                &mut self.errors,
            )
            .await;
            self.memo = outcome.map_or(Memo::Failed, Memo::Ready);
        }

        match &mut self.memo {
            Memo::Ready(conn) => Ok(conn),
            Memo::Pending | Memo::Failed => Err(Error::Unavailable {
                messages: self.errors.clone(),
            }),
        }
    }

    /// Consumes the factory, yielding the connection if it was established.
    #[must_use]
    pub fn into_connection(self) -> Option<Connection> {
        match self.memo {
            Memo::Ready(conn) => Some(conn),
            Memo::Pending | Memo::Failed => None,
        }
    }

    /// Connects to `server` and binds, bypassing the memoized connection.
    ///
    /// With `anonymous_fallback`, a rejected bind as `identity` is retried anonymously. On
    /// failure one message is appended to [`ConnectionFactory::errors`].
    pub async fn create_bound_connection(
        &mut self,
        server: &str,
        port: u16,
        identity: Option<&str>,
        secret: Option<&SecretString>,
        anonymous_fallback: bool,
    ) -> Option<Connection> {
        establish(
            &self.connector,
            server,
            port,
            identity,
            secret,
            anonymous_fallback,
            &mut self.errors,
        )
        .await
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.memo {
            Memo::Pending => "pending",
            Memo::Ready(_) => "ready",
            Memo::Failed => "failed",
        };
        f.debug_struct("ConnectionFactory")
            .field("server", &self.config.server)
            .field("port", &self.config.port)
            .field("errors", &self.errors)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

async fn establish(
    connector: &Arc<dyn LdapConnector>,
    server: &str,
    port: u16,
    identity: Option<&str>,
    secret: Option<&SecretString>,
    anonymous_fallback: bool,
    errors: &mut Vec<String>,
) -> Option<Connection> {
    let identity = identity.filter(|id| !id.is_empty());

    let mut conn = match Connection::connect(Arc::clone(connector), server, port).await {
        Ok(conn) => conn,
        Err(err) => {
            errors.push(match err {
                Error::Transport(message) => message,
                other => other.to_string(),
            });
            return None;
        }
    };

    if conn.bind(identity, secret).await {
        return Some(conn);
    }

    if let Some(identity) = identity {
        if anonymous_fallback {
            warn!(server, identity, "service bind rejected, falling back to anonymous");
            if conn.bind(None, None).await {
                return Some(conn);
            }
        }
        errors.push(format!("Could not bind to user {identity} on {server}"));
    } else {
        errors.push(format!("Could not bind anonymously on {server}"));
    }
    info!(server, port, "no bound directory connection");
    None
}

//! One bound link to a directory server.
//!
//! A [`Connection`] is not meant to be shared between concurrent units of work: binds mutate
//! its state and a search is a two-step exchange on a single link. Use one connection per
//! request or serialize access externally.

use coe_core::Error;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::escape::{escape, EscapeContext};
use crate::filter::Filter;
use crate::result::SearchResult;
use crate::transport::{LdapConnector, LdapSession, OperationStatus, SearchRequest};
use crate::Result;

/// Default maximum number of entries returned by [`Connection::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 200;

/// Error details of the most recent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastError {
    /// Human-readable description of the result code.
    pub message: String,
    /// Numeric result code.
    pub code: i32,
    /// Server diagnostic message, when requested and available.
    pub extended: Option<String>,
}

struct BoundCredential {
    identity: Option<String>,
    secret: Option<SecretString>,
}

/// Owns one link to a directory server and tracks its bind state.
///
/// `is_bound()` is true iff the last bind attempt succeeded, and `bound_identity()` is the
/// identity of that bind (`None` for anonymous).
pub struct Connection {
    session: Box<dyn LdapSession>,
    connector: Arc<dyn LdapConnector>,
    url: String,
    bound: Option<BoundCredential>,
    last_status: OperationStatus,
}

impl Connection {
    /// Opens an unbound connection to `server` on `port`.
    ///
    /// `server` is a URL such as `ldaps://ldap.example.edu` or a bare host name (plain `ldap://`
    /// is assumed). `port` always wins over a port embedded in the URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the link cannot be established and
    /// [`Error::InvalidEndpoint`] if `server` is not a usable address.
    pub async fn connect(
        connector: Arc<dyn LdapConnector>,
        server: &str,
        port: u16,
    ) -> Result<Self> {
        let url = server_url(server, port)?;
        let session = connector.connect(&url).await.map_err(|err| {
            warn!(server, port, error = %err, "directory connection failed");
            Error::Transport(format!("Could not connect to {server} on port {port}"))
        })?;

        Ok(Self::from_session(session, connector, url))
    }

    /// Wraps an already established session.
    #[must_use]
    pub fn from_session(
        session: Box<dyn LdapSession>,
        connector: Arc<dyn LdapConnector>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            session,
            connector,
            url: url.into(),
            bound: None,
            last_status: OperationStatus::success(),
        }
    }

    /// URL this connection was opened against.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true if the last bind attempt succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Identity of the current bind; `None` when unbound or bound anonymously.
    #[must_use]
    pub fn bound_identity(&self) -> Option<&str> {
        self.bound
            .as_ref()
            .and_then(|credential| credential.identity.as_deref())
    }

    /// Binds as `identity`, or anonymously when `identity` is `None` or empty.
    ///
    /// A rejected bind is an expected outcome and is reported as `false`; the connection is
    /// then left unbound. Transport failures are folded into the same outcome and can be
    /// inspected through [`Connection::last_error`].
    pub async fn bind(&mut self, identity: Option<&str>, secret: Option<&SecretString>) -> bool {
        let identity = identity.filter(|id| !id.is_empty());
        let success = self.raw_bind(identity, secret).await;

        if success {
            self.bound = Some(BoundCredential {
                identity: identity.map(str::to_owned),
                secret: secret.map(|s| SecretString::from(s.expose_secret().to_owned())),
            });
        } else {
            self.bound = None;
        }
        success
    }

    /// Checks whether `identity` can bind with `secret`, then restores the previous bind.
    ///
    /// If the connection was bound before the call it is re-bound with the captured
    /// credential whatever the probe outcome, so callers never observe the connection parked
    /// in the probed identity. The returned value is the probe outcome only. An empty
    /// `identity` or `secret` is rejected without contacting the server.
    pub async fn verify_credential(&mut self, identity: &str, secret: &SecretString) -> bool {
        if !is_checkable_credential(identity, secret) {
            return false;
        }
        let previous = self.bound.take();

        let verified = self.bind(Some(identity), Some(secret)).await;
        debug!(identity, verified, "credential probe on shared connection");

        if let Some(previous) = previous {
            let restored = self
                .bind(previous.identity.as_deref(), previous.secret.as_ref())
                .await;
            if !restored {
                warn!(url = %self.url, "failed to restore previous bind after credential probe");
            }
        }
        verified
    }

    /// Checks whether `identity` can bind with `secret` on a separate short-lived link.
    ///
    /// The shared link is never touched, so this is safe even when the connection is used
    /// concurrently with the probe. An empty `identity` or `secret` is rejected without
    /// opening a link.
    pub async fn verify_credential_isolated(
        &mut self,
        identity: &str,
        secret: &SecretString,
    ) -> bool {
        if !is_checkable_credential(identity, secret) {
            return false;
        }

        let mut probe = match self.connector.connect(&self.url).await {
            Ok(session) => session,
            Err(err) => {
                warn!(url = %self.url, error = %err, "could not open credential probe link");
                return false;
            }
        };

        let verified = matches!(
            probe.simple_bind(identity, secret.expose_secret()).await,
            Ok(status) if status.is_success()
        );
        if let Err(err) = probe.unbind().await {
            debug!(error = %err, "credential probe unbind failed");
        }
        debug!(identity, verified, "credential probe on dedicated link");
        verified
    }

    /// Escapes `value` for interpolation into a filter or DN.
    #[must_use]
    pub fn escape(&self, value: &str, context: EscapeContext) -> String {
        escape(value, context)
    }

    /// Runs a subtree search below `base`.
    ///
    /// Returns `None` if the search failed; the reason is available from
    /// [`Connection::last_error`]. Hitting the size limit is not a failure: the partial
    /// entries are returned.
    pub async fn search(
        &mut self,
        filter: &Filter,
        base: &str,
        attributes: &[&str],
        limit: usize,
    ) -> Option<SearchResult> {
        let request = SearchRequest {
            base: base.to_string(),
            filter: filter.as_str().to_string(),
            attributes: attributes.iter().map(|a| (*a).to_string()).collect(),
            size_limit: limit,
        };

        let batch = match self.session.search(&request).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(base, filter = %filter, error = %err, "directory search failed");
                self.last_status = OperationStatus::server_down(err.to_string());
                return None;
            }
        };

        self.last_status = batch.status.clone();
        if batch.status.is_size_limit_exceeded() {
            debug!(base, limit, returned = batch.entries.len(), "search hit size limit");
        } else if !batch.status.is_success() {
            warn!(
                base,
                filter = %filter,
                code = batch.status.code,
                message = batch.status.message(),
                "directory search returned an error"
            );
            return None;
        }

        Some(SearchResult::new(batch))
    }

    /// Error details of the most recent bind or search.
    #[must_use]
    pub fn last_error(&self, include_extended: bool) -> LastError {
        LastError {
            message: self.last_status.message().to_string(),
            code: self.last_status.code,
            extended: (include_extended && !self.last_status.diagnostic.is_empty())
                .then(|| self.last_status.diagnostic.clone()),
        }
    }

    async fn raw_bind(&mut self, identity: Option<&str>, secret: Option<&SecretString>) -> bool {
        let dn = identity.unwrap_or_default();
        let password = secret.map_or("", |s| s.expose_secret());

        match self.session.simple_bind(dn, password).await {
            Ok(status) => {
                let success = status.is_success();
                if success {
                    info!(url = %self.url, identity = dn, "bound to directory");
                } else {
                    debug!(
                        url = %self.url,
                        identity = dn,
                        code = status.code,
                        "directory bind rejected"
                    );
                }
                self.last_status = status;
                success
            }
            Err(err) => {
                warn!(url = %self.url, identity = dn, error = %err, "directory bind failed");
                self.last_status = OperationStatus::server_down(err.to_string());
                false
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("is_bound", &self.is_bound())
            .field("bound_identity", &self.bound_identity())
            .finish_non_exhaustive()
    }
}

/// Servers accept a DN with an empty password as an unauthenticated bind, so neither part
/// may be empty when a bind is used to prove a credential.
fn is_checkable_credential(identity: &str, secret: &SecretString) -> bool {
    if identity.is_empty() || secret.expose_secret().is_empty() {
        debug!(identity, "empty credential rejected before binding");
        return false;
    }
    true
}

/// Builds the URL handed to the transport from a server address and port.
///
/// A bare `host` or `host:port` without a scheme is read as plain `ldap://`.
pub(crate) fn server_url(server: &str, port: u16) -> Result<String> {
    let mut url = match Url::parse(server) {
        Ok(url) if !url.cannot_be_a_base() => url,
        // `host:port` parses as scheme `host` with an opaque path.
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("ldap://{server}"))?
        }
        Err(err) => return Err(err.into()),
    };
    url.set_port(Some(port))
        .map_err(|()| Error::InvalidEndpoint(format!("cannot use {server} as a directory server")))?;
    Ok(url.to_string())
}

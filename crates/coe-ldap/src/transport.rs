//! Directory protocol seam.
//!
//! [`LdapConnector`] and [`LdapSession`] are the only place the wire protocol is touched. The
//! production implementation is backed by `ldap3`; tests plug in mocks or in-memory fakes.

use async_trait::async_trait;
use coe_core::{DirectoryConfig, Error};
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::Result;

/// Result code: success.
pub const RC_SUCCESS: i32 = 0;
/// Result code: size limit exceeded (partial results follow).
pub const RC_SIZE_LIMIT_EXCEEDED: i32 = 4;
/// Result code: invalid credentials.
pub const RC_INVALID_CREDENTIALS: i32 = 49;
/// Client-side code used when the server could not be reached.
pub const RC_SERVER_DOWN: i32 = -1;

/// Outcome of one protocol operation as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    /// Numeric result code.
    pub code: i32,
    /// Server diagnostic message (may be empty).
    pub diagnostic: String,
}

impl OperationStatus {
    /// A successful status with no diagnostic.
    #[must_use]
    pub fn success() -> Self {
        Self::new(RC_SUCCESS, "")
    }

    /// Creates a status from a result code and diagnostic text.
    #[must_use]
    pub fn new(code: i32, diagnostic: impl Into<String>) -> Self {
        Self {
            code,
            diagnostic: diagnostic.into(),
        }
    }

    /// Status recorded when the transport itself failed.
    #[must_use]
    pub fn server_down(diagnostic: impl Into<String>) -> Self {
        Self::new(RC_SERVER_DOWN, diagnostic)
    }

    /// True when the result code is `success`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == RC_SUCCESS
    }

    /// True when the server stopped returning entries at the requested size limit.
    #[must_use]
    pub const fn is_size_limit_exceeded(&self) -> bool {
        self.code == RC_SIZE_LIMIT_EXCEEDED
    }

    /// Human-readable description of the result code.
    #[must_use]
    pub fn message(&self) -> &'static str {
        describe_result_code(self.code)
    }
}

impl Default for OperationStatus {
    fn default() -> Self {
        Self::success()
    }
}

/// LDAP entry as returned by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (value order preserved from the server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds an attribute with the given values.
    #[must_use]
    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }
}

/// One subtree search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base DN.
    pub base: String,
    /// Escaped filter string.
    pub filter: String,
    /// Requested attributes; empty requests all.
    pub attributes: Vec<String>,
    /// Maximum number of entries; zero means no client limit.
    pub size_limit: usize,
}

/// Entries and final status of one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchBatch {
    /// Returned entries, in server order.
    pub entries: Vec<LdapEntry>,
    /// Final status of the search operation.
    pub status: OperationStatus,
}

/// One established link to a directory server.
///
/// `Err` is reserved for transport failures; protocol outcomes travel in [`OperationStatus`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Simple bind; empty `dn` and `password` bind anonymously.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<OperationStatus>;
    /// Subtree search.
    async fn search(&mut self, request: &SearchRequest) -> Result<SearchBatch>;
    /// Closes the link.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens sessions against a server URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Establishes a new session.
    async fn connect(&self, url: &str) -> Result<Box<dyn LdapSession>>;
}

/// Transport-level settings handed to `ldap3`.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout: Duration,
    operation_timeout: Option<Duration>,
}

impl TransportSettings {
    /// Extracts the transport settings of a deployment.
    #[must_use]
    pub fn from_config(config: &DirectoryConfig) -> Self {
        Self {
            tls_verify: config.tls_verify,
            tls_ca_cert: config.tls_ca_cert.clone(),
            connection_timeout: config.connection_timeout(),
            operation_timeout: config.operation_timeout(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self::from_config(&DirectoryConfig::default())
    }
}

/// Real LDAP connector backed by `ldap3`.
#[derive(Debug, Clone, Default)]
pub struct RealLdapConnector {
    settings: TransportSettings,
}

impl RealLdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.settings)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;
        ldap3::drive!(conn);
        debug!(url, "directory link established");
        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.settings.operation_timeout,
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Option<Duration>,
}

impl RealLdapSession {
    fn apply_timeout(&mut self) {
        if let Some(timeout) = self.operation_timeout {
            self.inner.with_timeout(timeout);
        }
    }
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<OperationStatus> {
        self.apply_timeout();
        let result = self
            .inner
            .simple_bind(dn, password)
            .await
            .map_err(map_ldap_error)?;
        Ok(to_status(&result))
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<SearchBatch> {
        let size_limit = i32::try_from(request.size_limit).unwrap_or(i32::MAX);
        self.inner
            .with_search_options(SearchOptions::new().sizelimit(size_limit));
        self.apply_timeout();

        let ldap3::SearchResult(entries, result) = self
            .inner
            .search(
                &request.base,
                Scope::Subtree,
                &request.filter,
                request.attributes.clone(),
            )
            .await
            .map_err(map_ldap_error)?;

        let entries = entries
            .into_iter()
            .filter(|entry| !entry.is_ref())
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect();

        Ok(SearchBatch {
            entries,
            status: to_status(&result),
        })
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner.unbind().await.map_err(map_ldap_error)
    }
}

fn build_ldap_settings(settings: &TransportSettings) -> Result<LdapConnSettings> {
    let mut ldap_settings = LdapConnSettings::new().set_conn_timeout(settings.connection_timeout);

    if !settings.tls_verify {
        warn!("TLS certificate verification is disabled for directory connections");
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        ldap_settings = ldap_settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = settings.tls_ca_cert.as_ref() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid directory CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        ldap_settings = ldap_settings.set_connector(connector);
    }

    Ok(ldap_settings)
}

fn to_status(result: &ldap3::LdapResult) -> OperationStatus {
    OperationStatus::new(
        i32::try_from(result.rc).unwrap_or(i32::MAX),
        result.text.clone(),
    )
}

fn map_ldap_error(err: ldap3::LdapError) -> Error {
    Error::ExternalServiceError {
        service: "ldap".to_string(),
        message: err.to_string(),
    }
}

/// Describes a result code the way client libraries traditionally do.
#[must_use]
pub fn describe_result_code(code: i32) -> &'static str {
    match code {
        RC_SERVER_DOWN => "Can't contact LDAP server",
        0 => "Success",
        1 => "Operations error",
        2 => "Protocol error",
        3 => "Time limit exceeded",
        4 => "Size limit exceeded",
        7 => "Auth method not supported",
        8 => "Strong(er) authentication required",
        10 => "Referral",
        11 => "Administrative limit exceeded",
        32 => "No such object",
        34 => "Invalid DN syntax",
        48 => "Inappropriate authentication",
        49 => "Invalid credentials",
        50 => "Insufficient access",
        51 => "Server is busy",
        52 => "Server is unavailable",
        53 => "Server is unwilling to perform",
        80 => "Other (e.g., implementation specific) error",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_flags() {
        assert!(OperationStatus::success().is_success());
        assert!(OperationStatus::new(4, "").is_size_limit_exceeded());
        assert!(!OperationStatus::new(49, "").is_success());
        assert_eq!(OperationStatus::new(49, "").message(), "Invalid credentials");
        assert_eq!(
            OperationStatus::server_down("refused").message(),
            "Can't contact LDAP server"
        );
        assert_eq!(describe_result_code(9999), "Unknown error");
    }

    #[test]
    fn entry_builder() {
        let entry = LdapEntry::new("CN=a,DC=x")
            .with_attribute("mail", ["a@x"])
            .with_attribute("memberOf", ["CN=g1,DC=x", "CN=g2,DC=x"]);
        assert_eq!(entry.first("mail"), Some("a@x"));
        assert_eq!(entry.attributes["memberOf"].len(), 2);
        assert_eq!(entry.first("missing"), None);
    }

    #[test]
    fn settings_follow_config() {
        let config = DirectoryConfig::ufad()
            .with_tls_verify(false)
            .with_connection_timeout(3)
            .with_operation_timeout(7);
        let settings = TransportSettings::from_config(&config);
        assert!(!settings.tls_verify);
        assert_eq!(settings.connection_timeout, Duration::from_secs(3));
        assert_eq!(settings.operation_timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn missing_ca_certificate_is_config_error() {
        let settings = TransportSettings::from_config(
            &DirectoryConfig::ufad().with_ca_cert(PathBuf::from("/nonexistent/ca.pem")),
        );
        assert!(matches!(
            build_ldap_settings(&settings),
            Err(Error::ConfigError(_))
        ));
    }
}

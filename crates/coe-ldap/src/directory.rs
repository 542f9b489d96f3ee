//! Schema-aware directory services shared by the concrete deployments.
//!
//! [`DirectoryService`] carries the common behavior as default methods; each deployment
//! supplies a [`DirectorySchema`] and overrides only what differs.

use async_trait::async_trait;
use coe_core::Error;
use secrecy::SecretString;
use tracing::debug;

use crate::connection::{Connection, DEFAULT_SEARCH_LIMIT};
use crate::filter::Filter;
use crate::group::in_group;
use crate::record::{full_name, UserRecord};
use crate::result::{AttributeMap, SearchResult};
use crate::Result;

/// Default number of users returned by [`DirectoryService::find_users`].
pub const DEFAULT_FIND_USERS_LIMIT: usize = 50;

/// Deployment-specific attribute names, search base and filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySchema {
    /// Attribute used for primary lookups (the GLID).
    pub identifier_attribute: String,
    /// Attribute used for secondary numeric lookups (the UFID).
    pub secondary_identifier_attribute: String,
    /// Attribute holding the entry's DN.
    pub dn_attribute: String,
    /// Base DN below which people are searched.
    pub people_base_dn: String,
    /// Free-text filter; `%QUERY%` is replaced by the escaped query.
    pub find_users_filter: String,
    /// Attributes returned with each free-text search hit.
    pub find_users_attributes: Vec<String>,
    /// Attributes stripped from every returned record.
    pub removed_attributes: Vec<String>,
    /// DN fragment that marks a disabled account.
    pub disabled_marker: String,
}

impl DirectorySchema {
    /// Attributes returned by free-text search, borrowed for a search call.
    #[must_use]
    pub fn find_users_attribute_refs(&self) -> Vec<&str> {
        self.find_users_attributes
            .iter()
            .map(String::as_str)
            .collect()
    }

    /// Strips the denylist and adds the computed fields.
    #[must_use]
    pub fn process_user_attributes(&self, mut attributes: AttributeMap) -> UserRecord {
        for name in &self.removed_attributes {
            attributes.remove(name);
        }

        let first_non_empty = |name: &str| {
            attributes
                .get(name)
                .and_then(|value| value.first())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let short_id = first_non_empty(&self.identifier_attribute);
        let numeric_id = first_non_empty(&self.secondary_identifier_attribute);
        let disabled = first_non_empty(&self.dn_attribute)
            .is_some_and(|dn| dn.contains(&self.disabled_marker));

        UserRecord {
            full_name: full_name(&attributes),
            short_id,
            numeric_id,
            disabled,
            attributes,
        }
    }
}

/// Why a password check failed.
///
/// Useful for diagnostics; end users should only ever see
/// [`PasswordCheck::public_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// No entry matched the identifier.
    #[error("user not found")]
    UserNotFound,
    /// The entry exists but the bind was rejected.
    #[error("password incorrect")]
    PasswordIncorrect,
}

/// Outcome of [`DirectoryService::verify_password`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordCheck {
    /// The credentials are valid.
    Verified,
    /// The credentials were rejected.
    Rejected(RejectReason),
}

impl PasswordCheck {
    /// True when the credentials are valid.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Reason for a rejection.
    #[must_use]
    pub const fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Verified => None,
            Self::Rejected(reason) => Some(*reason),
        }
    }

    /// Message safe to show end users; does not reveal whether the user exists.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::Verified => "authenticated",
            Self::Rejected(_) => "invalid username or password",
        }
    }
}

/// How a password is checked against the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeStrategy {
    /// Bind on a dedicated short-lived link; the shared connection is untouched.
    #[default]
    Isolated,
    /// Bind on the shared connection, then restore its previous bind.
    SharedRebind,
}

/// Fails with [`Error::Precondition`] unless `conn` is bound.
pub(crate) fn ensure_bound(conn: &Connection) -> Result<()> {
    if conn.is_bound() {
        Ok(())
    } else {
        Err(Error::Precondition("LDAP connection must be bound".to_string()))
    }
}

/// Operations exposed to the hosting application.
#[async_trait]
pub trait DirectoryService: Send {
    /// Schema of this deployment.
    fn schema(&self) -> &DirectorySchema;

    /// The bound connection this service works on.
    fn connection(&mut self) -> &mut Connection;

    /// How passwords are checked.
    fn probe_strategy(&self) -> ProbeStrategy {
        ProbeStrategy::default()
    }

    /// Searches people where `field` equals `value`; `field` defaults to the identifier.
    async fn user_result(
        &mut self,
        value: &str,
        field: Option<&str>,
        attributes: &[&str],
    ) -> Option<SearchResult> {
        let schema = self.schema();
        let filter = Filter::equals(field.unwrap_or(&schema.identifier_attribute), value);
        let base = schema.people_base_dn.clone();
        self.connection()
            .search(&filter, &base, attributes, DEFAULT_SEARCH_LIMIT)
            .await
    }

    /// Attributes of the user with the given identifier, if any.
    async fn get_attributes_by_identifier(
        &mut self,
        identifier: &str,
        attributes: &[&str],
    ) -> Option<UserRecord> {
        let field = self.schema().identifier_attribute.clone();
        let result = self.user_result(identifier, Some(&field), attributes).await?;
        self.process_user_result(&result).into_iter().next()
    }

    /// Attributes of the user with the given secondary identifier, if any.
    async fn get_attributes_by_secondary_identifier(
        &mut self,
        identifier: &str,
        attributes: &[&str],
    ) -> Option<UserRecord> {
        let field = self.schema().secondary_identifier_attribute.clone();
        let result = self.user_result(identifier, Some(&field), attributes).await?;
        self.process_user_result(&result).into_iter().next()
    }

    /// Users matching `query` on several name, mail and identifier fields.
    ///
    /// A `limit` of 0 means [`DEFAULT_FIND_USERS_LIMIT`], never an unbounded search.
    async fn find_users(&mut self, query: &str, limit: usize) -> Vec<UserRecord> {
        let limit = if limit == 0 {
            DEFAULT_FIND_USERS_LIMIT
        } else {
            limit
        };
        let schema = self.schema().clone();
        let filter = Filter::from_template(&schema.find_users_filter, query);

        let result = self
            .connection()
            .search(
                &filter,
                &schema.people_base_dn,
                &schema.find_users_attribute_refs(),
                limit,
            )
            .await;
        result.map_or_else(Vec::new, |result| self.process_user_result(&result))
    }

    /// Checks a user's password.
    ///
    /// # Errors
    ///
    /// Variants without bind-as-user semantics return [`Error::UnsupportedOperation`].
    async fn verify_password(
        &mut self,
        identifier: &str,
        secret: &SecretString,
    ) -> Result<PasswordCheck> {
        let dn_attribute = self.schema().dn_attribute.clone();
        let dn = self
            .user_result(identifier, None, &[dn_attribute.as_str()])
            .await
            .and_then(|result| {
                result
                    .distinguished_names(&dn_attribute)
                    .into_iter()
                    .next()
                    .flatten()
            });

        // Only the first candidate is probed, even for an ambiguous identifier.
        let Some(dn) = dn else {
            debug!(identifier, "identifier did not resolve to a distinguished name");
            return Ok(PasswordCheck::Rejected(RejectReason::UserNotFound));
        };

        let verified = match self.probe_strategy() {
            ProbeStrategy::Isolated => {
                self.connection()
                    .verify_credential_isolated(&dn, secret)
                    .await
            }
            ProbeStrategy::SharedRebind => self.connection().verify_credential(&dn, secret).await,
        };

        Ok(if verified {
            PasswordCheck::Verified
        } else {
            PasswordCheck::Rejected(RejectReason::PasswordIncorrect)
        })
    }

    /// True when `attrs` lists membership in `group`.
    ///
    /// # Errors
    ///
    /// Variants without group semantics return [`Error::UnsupportedOperation`].
    fn is_member_of(&self, group: &str, attrs: &AttributeMap) -> Result<bool> {
        Ok(in_group(group, attrs))
    }

    /// Normalizes every entry of a result into a [`UserRecord`].
    fn process_user_result(&self, result: &SearchResult) -> Vec<UserRecord> {
        result
            .to_user_records()
            .into_iter()
            .map(|attributes| self.process_user_attributes(attributes))
            .collect()
    }

    /// Strips the denylist and adds the computed fields.
    fn process_user_attributes(&self, attributes: AttributeMap) -> UserRecord {
        self.schema().process_user_attributes(attributes)
    }
}

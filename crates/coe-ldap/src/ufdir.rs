//! UF public directory.

use async_trait::async_trait;
use coe_core::Error;
use secrecy::SecretString;

use crate::connection::Connection;
use crate::directory::{ensure_bound, DirectorySchema, DirectoryService, PasswordCheck};
use crate::result::AttributeMap;
use crate::Result;

/// People container of the public directory.
pub const UFDIR_PEOPLE_BASE_DN: &str = "OU=People,DC=ufl,DC=edu";

const FIND_USERS_FILTER: &str =
    "(|(sn=%QUERY%*)(displayname=%QUERY%*)(mail=%QUERY%*)(uid=%QUERY%*)(uidnumber=%QUERY%))";

impl DirectorySchema {
    /// Schema of the public directory.
    ///
    /// Keys, base and filter differ from [`DirectorySchema::ufad`]; the returned attributes,
    /// denylist and disabled marker are shared.
    #[must_use]
    pub fn ufdir() -> Self {
        Self {
            identifier_attribute: "uid".to_string(),
            secondary_identifier_attribute: "uidnumber".to_string(),
            people_base_dn: UFDIR_PEOPLE_BASE_DN.to_string(),
            find_users_filter: FIND_USERS_FILTER.to_string(),
            ..Self::ufad()
        }
    }
}

/// Directory service over the public directory.
///
/// Lookups and search work as for [`crate::Ufad`]; password verification and group membership
/// are not available and fail with [`Error::UnsupportedOperation`].
#[derive(Debug)]
pub struct Ufdir<'c> {
    conn: &'c mut Connection,
    schema: DirectorySchema,
}

impl<'c> Ufdir<'c> {
    /// Wraps a bound connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if `conn` is not bound.
    pub fn new(conn: &'c mut Connection) -> Result<Self> {
        Self::with_schema(conn, DirectorySchema::ufdir())
    }

    /// Wraps a bound connection using a custom schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Precondition`] if `conn` is not bound.
    pub fn with_schema(conn: &'c mut Connection, schema: DirectorySchema) -> Result<Self> {
        ensure_bound(conn)?;
        Ok(Self { conn, schema })
    }
}

#[async_trait]
impl DirectoryService for Ufdir<'_> {
    fn schema(&self) -> &DirectorySchema {
        &self.schema
    }

    fn connection(&mut self) -> &mut Connection {
        self.conn
    }

    async fn verify_password(
        &mut self,
        _identifier: &str,
        _secret: &SecretString,
    ) -> Result<PasswordCheck> {
        Err(Error::UnsupportedOperation(
            "password verification is not available on the public directory".to_string(),
        ))
    }

    fn is_member_of(&self, _group: &str, _attrs: &AttributeMap) -> Result<bool> {
        Err(Error::UnsupportedOperation(
            "group membership is not available on the public directory".to_string(),
        ))
    }
}

//! UF Active Directory.

use crate::connection::Connection;
use crate::directory::{ensure_bound, DirectorySchema, DirectoryService, ProbeStrategy};
use crate::Result;

/// People container of the Active Directory deployment.
pub const UFAD_PEOPLE_BASE_DN: &str = "OU=People,OU=UF,DC=ad,DC=ufl,DC=edu";

/// DN fragment of the container holding disabled accounts.
pub const UFAD_DISABLED_MARKER: &str = ",OU=Disabled Accounts,";

const FIND_USERS_FILTER: &str = "(|(sn=%QUERY%*)(displayname=%QUERY%*)(name=%QUERY%*)\
(mail=%QUERY%*)(samaccountname=%QUERY%*)(employeeid=%QUERY%))";

const FIND_USERS_ATTRIBUTES: &[&str] = &[
    "displayname",
    "title",
    "name",
    "samaccountname",
    "department",
    "mail",
    "distinguishedname",
    "givenname",
    "sn",
    "employeeid",
];

// Binary or mailbox-internal values nobody downstream can use.
const REMOVED_ATTRIBUTES: &[&str] = &[
    "objectguid",
    "objectsid",
    "msexchsafesendershash",
    "msexchmailboxguid",
    "msexchmailboxsecuritydescriptor",
    "protocolsettings",
];

impl DirectorySchema {
    /// Schema of the Active Directory deployment.
    #[must_use]
    pub fn ufad() -> Self {
        Self {
            identifier_attribute: "samaccountname".to_string(),
            secondary_identifier_attribute: "employeeid".to_string(),
            dn_attribute: "distinguishedname".to_string(),
            people_base_dn: UFAD_PEOPLE_BASE_DN.to_string(),
            find_users_filter: FIND_USERS_FILTER.to_string(),
            find_users_attributes: owned_names(FIND_USERS_ATTRIBUTES),
            removed_attributes: owned_names(REMOVED_ATTRIBUTES),
            disabled_marker: UFAD_DISABLED_MARKER.to_string(),
        }
    }
}

fn owned_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_string()).collect()
}

/// Directory service over the Active Directory deployment.
///
/// Supports password verification and group membership.
#[derive(Debug)]
pub struct Ufad<'c> {
    conn: &'c mut Connection,
    schema: DirectorySchema,
    probe: ProbeStrategy,
}

impl<'c> Ufad<'c> {
    /// Wraps a bound connection.
    ///
    /// # Errors
    ///
    /// Returns [`coe_core::Error::Precondition`] if `conn` is not bound.
    pub fn new(conn: &'c mut Connection) -> Result<Self> {
        Self::with_schema(conn, DirectorySchema::ufad())
    }

    /// Wraps a bound connection using a custom schema.
    ///
    /// # Errors
    ///
    /// Returns [`coe_core::Error::Precondition`] if `conn` is not bound.
    pub fn with_schema(conn: &'c mut Connection, schema: DirectorySchema) -> Result<Self> {
        ensure_bound(conn)?;
        Ok(Self {
            conn,
            schema,
            probe: ProbeStrategy::default(),
        })
    }

    /// Selects how passwords are checked.
    #[must_use]
    pub const fn with_probe_strategy(mut self, probe: ProbeStrategy) -> Self {
        self.probe = probe;
        self
    }
}

impl DirectoryService for Ufad<'_> {
    fn schema(&self) -> &DirectorySchema {
        &self.schema
    }

    fn connection(&mut self) -> &mut Connection {
        self.conn
    }

    fn probe_strategy(&self) -> ProbeStrategy {
        self.probe
    }
}

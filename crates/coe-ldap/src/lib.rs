//! LDAP directory client for the UF directories.
//!
//! A [`ConnectionFactory`] turns a [`DirectoryConfig`] into a bound [`Connection`]. Directory
//! services such as [`Ufad`] and [`Ufdir`] borrow that connection and expose user lookups,
//! free-text search, password verification and group membership through [`DirectoryService`].
//!
//! ```no_run
//! use coe_ldap::{ConnectionFactory, DirectoryConfig, DirectoryService, Ufad};
//!
//! # async fn run() -> coe_ldap::Result<()> {
//! let config = DirectoryConfig::ufad()
//!     .with_bind("CN=svc,OU=Service Accounts,DC=ad,DC=ufl,DC=edu", "secret");
//! let mut factory = ConnectionFactory::new(config);
//! let mut ufad = Ufad::new(factory.connection().await?)?;
//!
//! if let Some(user) = ufad.get_attributes_by_identifier("alberta", &[]).await {
//!     println!("{} disabled={}", user.full_name, user.disabled);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

mod connection;
mod directory;
mod escape;
mod factory;
mod filter;
mod group;
mod record;
mod result;
mod transport;
mod ufad;
mod ufdir;

pub use coe_core::{DirectoryConfig, Error};
pub use connection::{Connection, LastError, DEFAULT_SEARCH_LIMIT};
pub use directory::{
    DirectorySchema, DirectoryService, PasswordCheck, ProbeStrategy, RejectReason,
    DEFAULT_FIND_USERS_LIMIT,
};
pub use escape::{escape, escape_dn_value, escape_filter_value, EscapeContext};
pub use factory::{ConnectionFactory, DirectoryKind};
pub use filter::{Filter, QUERY_PLACEHOLDER};
pub use group::{in_group, normalize_cn, GroupCn, MEMBER_OF_ATTRIBUTE};
pub use record::{full_name, UserRecord};
pub use result::{
    flatten, AttributeMap, AttributeValue, ChildKey, Flattened, RawEntry, RawNode, SearchResult,
};
pub use transport::{
    describe_result_code, LdapConnector, LdapEntry, LdapSession, OperationStatus,
    RealLdapConnector, SearchBatch, SearchRequest, TransportSettings, RC_INVALID_CREDENTIALS,
    RC_SERVER_DOWN, RC_SIZE_LIMIT_EXCEEDED, RC_SUCCESS,
};
pub use ufad::{Ufad, UFAD_DISABLED_MARKER, UFAD_PEOPLE_BASE_DN};
pub use ufdir::{Ufdir, UFDIR_PEOPLE_BASE_DN};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = coe_core::Result<T>;

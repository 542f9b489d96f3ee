//! End-to-end tests against an in-memory directory.
//!
//! The directory is loaded from `tests/fixtures/ufad_people.json` and served through the
//! public [`LdapConnector`] and [`LdapSession`] traits, so the factory, connection and
//! directory services run exactly as they would against a server.

use async_trait::async_trait;
use coe_ldap::{
    ConnectionFactory, DirectoryConfig, DirectoryService, Error, LdapConnector, LdapEntry,
    LdapSession, OperationStatus, PasswordCheck, ProbeStrategy, RejectReason, SearchBatch,
    SearchRequest, Ufad, Ufdir, DEFAULT_FIND_USERS_LIMIT, RC_INVALID_CREDENTIALS,
    RC_SIZE_LIMIT_EXCEEDED,
};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SERVICE_DN: &str = "CN=svc-coe,OU=Service Accounts,OU=UF,DC=ad,DC=ufl,DC=edu";
const ALBERTA_DN: &str = "CN=alberta,OU=People,OU=UF,DC=ad,DC=ufl,DC=edu";

#[derive(Debug, Clone, Deserialize)]
struct FixtureEntry {
    dn: String,
    password: String,
    attributes: HashMap<String, Vec<String>>,
}

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_people() -> Vec<FixtureEntry> {
    let path = fixtures_dir().join("ufad_people.json");
    let json = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture at {}: {}", path.display(), e));
    serde_json::from_str(&json).unwrap_or_else(|e| panic!("Failed to parse fixture: {}", e))
}

#[derive(Debug, Default)]
struct FakeDirectory {
    entries: Vec<FixtureEntry>,
    connects: AtomicUsize,
    binds: Mutex<Vec<String>>,
    /// Accept a DN with an empty password as an unauthenticated bind, as AD does.
    unauthenticated_binds: bool,
}

impl FakeDirectory {
    fn load() -> Arc<Self> {
        Arc::new(Self {
            entries: load_people(),
            ..Self::default()
        })
    }

    fn load_with_unauthenticated_binds() -> Arc<Self> {
        Arc::new(Self {
            entries: load_people(),
            unauthenticated_binds: true,
            ..Self::default()
        })
    }

    fn bind_log(&self) -> Vec<String> {
        self.binds.lock().unwrap().clone()
    }
}

struct FakeConnector(Arc<FakeDirectory>);

#[async_trait]
impl LdapConnector for FakeConnector {
    async fn connect(&self, url: &str) -> coe_ldap::Result<Box<dyn LdapSession>> {
        if url.contains("unreachable") {
            return Err(Error::ExternalServiceError {
                service: "ldap".to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession(Arc::clone(&self.0))))
    }
}

struct FakeSession(Arc<FakeDirectory>);

#[async_trait]
impl LdapSession for FakeSession {
    async fn simple_bind(
        &mut self,
        dn: &str,
        password: &str,
    ) -> coe_ldap::Result<OperationStatus> {
        self.0.binds.lock().unwrap().push(dn.to_string());
        if password.is_empty() && (dn.is_empty() || self.0.unauthenticated_binds) {
            return Ok(OperationStatus::success());
        }
        let accepted = self
            .0
            .entries
            .iter()
            .any(|entry| entry.dn.eq_ignore_ascii_case(dn) && entry.password == password);
        Ok(if accepted {
            OperationStatus::success()
        } else {
            OperationStatus::new(RC_INVALID_CREDENTIALS, "80090308: LdapErr: DSID-0C09042F")
        })
    }

    async fn search(&mut self, request: &SearchRequest) -> coe_ldap::Result<SearchBatch> {
        let clauses = parse_or_filter(&request.filter);
        let base = request.base.to_ascii_lowercase();

        let mut entries = self
            .0
            .entries
            .iter()
            .filter(|entry| entry.dn.to_ascii_lowercase().ends_with(&base))
            .filter(|entry| clauses.iter().any(|clause| clause.matches(entry)))
            .map(|entry| project(entry, &request.attributes))
            .collect::<Vec<_>>();

        let mut status = OperationStatus::success();
        if request.size_limit > 0 && entries.len() > request.size_limit {
            entries.truncate(request.size_limit);
            status = OperationStatus::new(RC_SIZE_LIMIT_EXCEEDED, "");
        }
        Ok(SearchBatch { entries, status })
    }

    async fn unbind(&mut self) -> coe_ldap::Result<()> {
        Ok(())
    }
}

struct Clause {
    attribute: String,
    value: String,
    prefix: bool,
}

impl Clause {
    fn matches(&self, entry: &FixtureEntry) -> bool {
        entry
            .attributes
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(&self.attribute))
            .flat_map(|(_, values)| values)
            .any(|candidate| {
                let candidate = candidate.to_lowercase();
                if self.prefix {
                    candidate.starts_with(&self.value)
                } else {
                    candidate == self.value
                }
            })
    }
}

/// Parses the `(|(a=v)(b=w*))` filters the client generates.
fn parse_or_filter(filter: &str) -> Vec<Clause> {
    let body = filter
        .strip_prefix("(|(")
        .and_then(|rest| rest.strip_suffix("))"))
        .unwrap_or_else(|| panic!("unexpected filter shape: {filter}"));
    body.split(")(")
        .map(|clause| {
            let (attribute, value) = clause.split_once('=').expect("clause has '='");
            let (value, prefix) = match value.strip_suffix('*') {
                Some(stripped) => (stripped, true),
                None => (value, false),
            };
            Clause {
                attribute: attribute.to_string(),
                value: unescape(value).to_lowercase(),
                prefix,
            }
        })
        .collect()
}

fn unescape(value: &str) -> String {
    let mut out = String::new();
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let hex: String = chars.by_ref().take(2).collect();
            let code = u32::from_str_radix(&hex, 16).expect("hex pair");
            out.push(char::from_u32(code).expect("valid char"));
        } else {
            out.push(ch);
        }
    }
    out
}

fn project(entry: &FixtureEntry, requested: &[String]) -> LdapEntry {
    let mut projected = LdapEntry::new(entry.dn.clone());
    for (name, values) in &entry.attributes {
        if requested.is_empty() || requested.iter().any(|r| r.eq_ignore_ascii_case(name)) {
            projected = projected.with_attribute(name.clone(), values.clone());
        }
    }
    projected
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

fn open_factory(directory: &Arc<FakeDirectory>, config: DirectoryConfig) -> ConnectionFactory {
    ConnectionFactory::with_connector(config, Arc::new(FakeConnector(Arc::clone(directory))))
}

fn service_config() -> DirectoryConfig {
    DirectoryConfig::ufad().with_bind(SERVICE_DN, "svc-secret")
}

#[tokio::test]
async fn test_lookup_by_identifier() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let mut ufad = Ufad::new(factory.connection().await.unwrap()).unwrap();

    let user = ufad
        .get_attributes_by_identifier("alberta", &[])
        .await
        .expect("alberta exists");

    assert_eq!(user.full_name, "Alberta Gator");
    assert_eq!(user.short_id.as_deref(), Some("alberta"));
    assert_eq!(user.numeric_id.as_deref(), Some("12345678"));
    assert!(!user.disabled);
    assert_eq!(user.first("mail"), Some("alberta@ufl.edu"));
    assert!(user.get("objectguid").is_none());
    assert!(user.get("objectsid").is_none());

    let json = serde_json::to_value(&user).unwrap();
    assert_eq!(json["__fullname"], "Alberta Gator");
    assert_eq!(json["memberof"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["samaccountname"], "alberta");
}

#[tokio::test]
async fn test_lookup_by_secondary_identifier_flags_disabled() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let mut ufad = Ufad::new(factory.connection().await.unwrap()).unwrap();

    let user = ufad
        .get_attributes_by_secondary_identifier(
            "87654321",
            &["samaccountname", "distinguishedname"],
        )
        .await
        .expect("albert exists");
    assert!(user.disabled);
    assert_eq!(user.short_id.as_deref(), Some("albert"));
    assert!(user.get("mail").is_none());

    assert!(ufad
        .get_attributes_by_identifier("nobody", &[])
        .await
        .is_none());
}

#[tokio::test]
async fn test_find_users_respects_limit() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let mut ufad = Ufad::new(factory.connection().await.unwrap()).unwrap();

    let everyone = ufad.find_users("gator", DEFAULT_FIND_USERS_LIMIT).await;
    assert_eq!(everyone.len(), 3);

    let limited = ufad.find_users("gator", 2).await;
    assert_eq!(limited.len(), 2);

    let by_ufid = ufad.find_users("11112222", DEFAULT_FIND_USERS_LIMIT).await;
    assert_eq!(by_ufid.len(), 1);
    assert_eq!(by_ufid[0].full_name, "Gwen Gatorson");
}

#[tokio::test]
async fn test_find_users_treats_metacharacters_literally() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let mut ufad = Ufad::new(factory.connection().await.unwrap()).unwrap();

    assert!(ufad.find_users("*", DEFAULT_FIND_USERS_LIMIT).await.is_empty());
    assert!(ufad
        .find_users("x)(samaccountname=*", DEFAULT_FIND_USERS_LIMIT)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_verify_password_outcomes() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let mut ufad = Ufad::new(factory.connection().await.unwrap()).unwrap();

    let ok = ufad
        .verify_password("alberta", &secret("go-gators"))
        .await
        .unwrap();
    assert_eq!(ok, PasswordCheck::Verified);

    let wrong = ufad
        .verify_password("alberta", &secret("wrongpass"))
        .await
        .unwrap();
    assert_eq!(wrong.reason(), Some(RejectReason::PasswordIncorrect));

    let missing = ufad
        .verify_password("nonexistent", &secret("x"))
        .await
        .unwrap();
    assert_eq!(missing.reason(), Some(RejectReason::UserNotFound));
    assert_eq!(missing.public_message(), wrong.public_message());

    let conn = factory.connection().await.unwrap();
    assert_eq!(conn.bound_identity(), Some(SERVICE_DN));
    // One shared link plus one probe link per resolved user.
    assert_eq!(directory.connects.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_empty_password_is_rejected_by_both_strategies() {
    let directory = FakeDirectory::load_with_unauthenticated_binds();
    let mut factory = open_factory(&directory, service_config());

    let mut ufad = Ufad::new(factory.connection().await.unwrap()).unwrap();
    let isolated = ufad.verify_password("alberta", &secret("")).await.unwrap();
    assert_eq!(isolated, PasswordCheck::Rejected(RejectReason::PasswordIncorrect));

    let mut ufad = Ufad::new(factory.connection().await.unwrap())
        .unwrap()
        .with_probe_strategy(ProbeStrategy::SharedRebind);
    let shared = ufad.verify_password("alberta", &secret("")).await.unwrap();
    assert_eq!(shared, PasswordCheck::Rejected(RejectReason::PasswordIncorrect));

    let ok = ufad
        .verify_password("alberta", &secret("go-gators"))
        .await
        .unwrap();
    assert!(ok.is_verified());

    assert_eq!(factory.connection().await.unwrap().bound_identity(), Some(SERVICE_DN));
    // The service bind, then the real probe and its restore; empty passwords never bind.
    assert_eq!(
        directory.bind_log(),
        vec![SERVICE_DN.to_string(), ALBERTA_DN.to_string(), SERVICE_DN.to_string()]
    );
}

#[tokio::test]
async fn test_shared_rebind_restores_service_identity() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let conn = factory.connection().await.unwrap();
    let mut ufad = Ufad::new(conn)
        .unwrap()
        .with_probe_strategy(ProbeStrategy::SharedRebind);

    let wrong = ufad
        .verify_password("alberta", &secret("wrongpass"))
        .await
        .unwrap();
    assert!(!wrong.is_verified());

    let conn = factory.connection().await.unwrap();
    assert!(conn.is_bound());
    assert_eq!(conn.bound_identity(), Some(SERVICE_DN));
    assert_eq!(
        directory.bind_log(),
        vec![SERVICE_DN.to_string(), ALBERTA_DN.to_string(), SERVICE_DN.to_string()]
    );
}

#[tokio::test]
async fn test_group_membership() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let mut ufad = Ufad::new(factory.connection().await.unwrap()).unwrap();

    let alberta = ufad
        .get_attributes_by_identifier("alberta", &[])
        .await
        .unwrap();
    let albert = ufad
        .get_attributes_by_identifier("albert", &[])
        .await
        .unwrap();

    assert!(ufad.is_member_of("COE-WEB-ADMINS", alberta.as_ref()).unwrap());
    assert!(ufad
        .is_member_of("cn=COE-WEB-ADMINS, ou=Groups, ou=COE", alberta.as_ref())
        .unwrap());
    assert!(!ufad.is_member_of("COE-WEB-ADMINS", albert.as_ref()).unwrap());

    let gwen = ufad
        .get_attributes_by_identifier("gwen", &[])
        .await
        .unwrap();
    assert!(!ufad.is_member_of("COE-WEB-ADMINS", gwen.as_ref()).unwrap());
}

#[tokio::test]
async fn test_anonymous_fallback_and_public_directory() {
    let directory = FakeDirectory::load();
    let config = DirectoryConfig::ufdir()
        .with_bind(SERVICE_DN, "not-the-secret")
        .with_anonymous_fallback(true);
    let mut factory = open_factory(&directory, config);

    let conn = factory.connection().await.unwrap();
    assert!(conn.is_bound());
    assert_eq!(conn.bound_identity(), None);

    let mut ufdir = Ufdir::new(conn).unwrap();
    assert!(matches!(
        ufdir.verify_password("alberta", &secret("go-gators")).await,
        Err(Error::UnsupportedOperation(_))
    ));
    assert!(factory.errors().is_empty());
}

#[tokio::test]
async fn test_unavailable_directory_reports_messages() {
    let directory = FakeDirectory::load();
    let config = DirectoryConfig::new("ldap://unreachable.example").unwrap();
    let mut factory = open_factory(&directory, config);

    let err = factory.connection().await.unwrap_err();
    assert_eq!(
        err,
        Error::Unavailable {
            messages: vec![
                "Could not connect to ldap://unreachable.example on port 389".to_string()
            ]
        }
    );

    let mut rejected = open_factory(
        &directory,
        DirectoryConfig::ufad().with_bind(SERVICE_DN, "bad"),
    );
    assert!(rejected.connection().await.is_err());
    assert_eq!(
        rejected.errors(),
        [format!("Could not bind to user {SERVICE_DN} on ldaps://ldap.ad.ufl.edu")]
    );
}

#[tokio::test]
async fn test_search_result_views() {
    let directory = FakeDirectory::load();
    let mut factory = open_factory(&directory, service_config());
    let conn = factory.connection().await.unwrap();

    let filter = coe_ldap::Filter::any_of([("sn", "Gator"), ("sn", "Gatorson")]);
    let result = conn
        .search(
            &filter,
            coe_ldap::UFAD_PEOPLE_BASE_DN,
            &["distinguishedname", "sn"],
            coe_ldap::DEFAULT_SEARCH_LIMIT,
        )
        .await
        .expect("search succeeds");

    assert_eq!(result.len(), 3);
    assert!(!result.is_partial());
    assert_eq!(result.raw_entries().count(), 3);
    assert_eq!(result.to_user_records().len(), 3);
    assert!(result
        .distinguished_names("distinguishedname")
        .iter()
        .all(Option::is_some));

    let flat = result.to_flattened();
    assert_eq!(flat.children.len(), 3);
    let alberta = flat.child(ALBERTA_DN).expect("keyed by DN");
    assert_eq!(alberta.attributes["sn"].first(), Some("Gator"));
}

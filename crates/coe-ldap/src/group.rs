//! Group membership checks against the `memberof` attribute.
//!
//! Membership is a literal prefix match of a normalized group DN against each `memberof`
//! value. Only the `cn=`/`ou=`/`dc=` labels and the whitespace around commas are normalized;
//! component order and the case of values are not. DNs whose values contain escaped commas
//! are not handled specially.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt;

use crate::result::AttributeMap;

/// Attribute listing the groups of a user.
pub const MEMBER_OF_ATTRIBUTE: &str = "memberof";

static COMMA_WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*,\s*").expect("valid comma pattern"));
static DN_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(cn|ou|dc)=").expect("valid label pattern"));

/// Normalizes a group identifier: trims it, removes whitespace around commas and upper-cases
/// the `cn=`/`ou=`/`dc=` labels.
#[must_use]
pub fn normalize_cn(cn: &str) -> String {
    let cn = COMMA_WHITESPACE.replace_all(cn.trim(), ",");
    DN_LABEL
        .replace_all(&cn, |caps: &Captures<'_>| {
            format!("{}=", caps[1].to_ascii_uppercase())
        })
        .into_owned()
}

/// Normalized group identifier used as a `memberof` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCn(String);

impl GroupCn {
    /// Builds the match prefix for `group`, either a bare name (`THE-GROUP`) or a DN
    /// (`CN=THE-GROUP,OU=...,DC=...`).
    ///
    /// A bare name gets the `CN=` label and a trailing `,` so that it only matches a whole
    /// first component.
    #[must_use]
    pub fn new(group: &str) -> Self {
        let mut cn = normalize_cn(group);
        if !cn.starts_with("CN=") {
            cn.insert_str(0, "CN=");
        }
        if !cn.contains(',') {
            cn.push(',');
        }
        Self(cn)
    }

    /// Borrows the normalized prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `dn` starts with this prefix.
    #[must_use]
    pub fn is_prefix_of(&self, dn: &str) -> bool {
        dn.starts_with(&self.0)
    }
}

impl fmt::Display for GroupCn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True when any `memberof` value of `attrs` starts with the normalized `group`.
#[must_use]
pub fn in_group(group: &str, attrs: &AttributeMap) -> bool {
    let Some(member_of) = attrs.get(MEMBER_OF_ATTRIBUTE) else {
        return false;
    };
    let prefix = GroupCn::new(group);
    member_of.iter().any(|dn| prefix.is_prefix_of(dn))
}

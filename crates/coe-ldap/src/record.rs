//! Caller-facing user records.

use serde::Serialize;

use crate::result::{AttributeMap, AttributeValue};

/// Attribute holding the display name.
pub const DISPLAY_NAME_ATTRIBUTE: &str = "displayname";
/// Attribute holding the given name.
pub const GIVEN_NAME_ATTRIBUTE: &str = "givenname";
/// Attribute holding the surname.
pub const SURNAME_ATTRIBUTE: &str = "sn";

/// Directory attributes of one user plus fields computed at query time.
///
/// Serializes as a single flat map with the computed fields under `__fullname`, `__glid`,
/// `__ufid` and `__disabled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    /// Remaining directory attributes.
    #[serde(flatten)]
    pub attributes: AttributeMap,
    /// "First Last" name.
    #[serde(rename = "__fullname")]
    pub full_name: String,
    /// Short identifier (GLID) alias.
    #[serde(rename = "__glid", skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
    /// Numeric identifier (UFID) alias.
    #[serde(rename = "__ufid", skip_serializing_if = "Option::is_none")]
    pub numeric_id: Option<String>,
    /// Whether the account lives below the disabled-accounts container.
    #[serde(rename = "__disabled")]
    pub disabled: bool,
}

impl UserRecord {
    /// Value of a directory attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// First value of a directory attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::first)
    }
}

impl AsRef<AttributeMap> for UserRecord {
    fn as_ref(&self) -> &AttributeMap {
        &self.attributes
    }
}

fn non_empty<'a>(attributes: &'a AttributeMap, name: &str) -> Option<&'a str> {
    attributes
        .get(name)
        .and_then(AttributeValue::first)
        .filter(|value| !value.is_empty())
}

/// Computes a "First Last" name.
///
/// A display name without a comma is used verbatim. `"Last, First"` is reordered to
/// `"First Last"`. Without a display name, the given name and surname are joined.
#[must_use]
pub fn full_name(attributes: &AttributeMap) -> String {
    let (first, last) = match non_empty(attributes, DISPLAY_NAME_ATTRIBUTE) {
        Some(display) => match display.split_once(',') {
            None => return display.to_string(),
            Some((last, first)) => (first, last),
        },
        None => (
            non_empty(attributes, GIVEN_NAME_ATTRIBUTE).unwrap_or_default(),
            non_empty(attributes, SURNAME_ATTRIBUTE).unwrap_or_default(),
        ),
    };
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

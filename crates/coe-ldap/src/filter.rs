//! Search filter construction.

use std::fmt;

use crate::escape::escape_filter_value;

/// Placeholder replaced by the escaped query text in filter templates.
pub const QUERY_PLACEHOLDER: &str = "%QUERY%";

/// An escaped search filter.
///
/// Values are always escaped on the way in; attribute names come from schema configuration and
/// are trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter(String);

impl Filter {
    /// Builds `(|(f1=v1)(f2=v2)...)` from `(attribute, raw value)` clauses.
    #[must_use]
    pub fn any_of<'a, I>(clauses: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let body = clauses
            .into_iter()
            .map(|(field, value)| format!("({}={})", field, escape_filter_value(value)))
            .collect::<String>();
        Self(format!("(|{body})"))
    }

    /// Single-clause OR filter matching `field` exactly.
    #[must_use]
    pub fn equals(field: &str, value: &str) -> Self {
        Self::any_of([(field, value)])
    }

    /// Substitutes the escaped `query` for every [`QUERY_PLACEHOLDER`] in `template`.
    #[must_use]
    pub fn from_template(template: &str, query: &str) -> Self {
        Self(template.replace(QUERY_PLACEHOLDER, &escape_filter_value(query)))
    }

    /// Borrows the filter string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Filter {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

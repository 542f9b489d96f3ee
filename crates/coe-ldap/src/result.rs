//! Search results and their normalization into plain attribute maps.

use serde::Serialize;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashSet};
use std::slice;

use crate::transport::{LdapEntry, OperationStatus, SearchBatch};

/// Value of one attribute: a scalar when the server returned exactly one value, else the
/// ordered list of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Exactly one value.
    Single(String),
    /// Zero or several values, in server order.
    Multi(Vec<String>),
}

impl AttributeValue {
    /// Collapses a value list; `None` when the list is empty.
    #[must_use]
    pub fn from_values(mut values: Vec<String>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(Self::Single),
            _ => Some(Self::Multi(values)),
        }
    }

    /// All values as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::Single(value) => slice::from_ref(value),
            Self::Multi(values) => values,
        }
    }

    /// The first value.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.as_slice().first().map(String::as_str)
    }

    /// Iterates over all values.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.as_slice().iter().map(String::as_str)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

/// Lower-cased attribute name to value.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// Nested structure of a search response.
///
/// A node sequence whose length is the entry's count; each node is either a nested entry or
/// an attribute with its value list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Distinguished name of the entry, if it has one.
    pub dn: Option<String>,
    /// Child nodes in order.
    pub nodes: Vec<RawNode>,
}

/// One item of a [`RawEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawNode {
    /// Nested entry subtree.
    Entry(RawEntry),
    /// Attribute name and its values.
    Attribute {
        /// Attribute name (lower-cased).
        name: String,
        /// Values in server order.
        values: Vec<String>,
    },
}

impl RawEntry {
    /// Number of child nodes.
    #[must_use]
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// Builds the tree of a whole response: one nested entry per returned entry.
    #[must_use]
    pub fn from_entries(entries: &[LdapEntry]) -> Self {
        Self {
            dn: None,
            nodes: entries.iter().map(|e| RawNode::Entry(Self::from(e))).collect(),
        }
    }

    /// Builds an entry whose nodes are exactly the given attributes.
    #[must_use]
    pub fn from_attributes(attributes: &AttributeMap) -> Self {
        Self {
            dn: None,
            nodes: attributes
                .iter()
                .map(|(name, value)| RawNode::Attribute {
                    name: name.clone(),
                    values: value.as_slice().to_vec(),
                })
                .collect(),
        }
    }

    /// Nested entries, in order.
    pub fn entries(&self) -> impl Iterator<Item = &RawEntry> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            RawNode::Entry(entry) => Some(entry),
            RawNode::Attribute { .. } => None,
        })
    }

    /// Values of the named attribute directly under this entry.
    #[must_use]
    pub fn attribute_values(&self, name: &str) -> Option<&[String]> {
        self.nodes.iter().find_map(|node| match node {
            RawNode::Attribute { name: n, values } if n == name => Some(values.as_slice()),
            _ => None,
        })
    }
}

impl From<&LdapEntry> for RawEntry {
    fn from(entry: &LdapEntry) -> Self {
        let attributes = entry
            .attributes
            .iter()
            .map(|(name, values)| (name.to_ascii_lowercase(), values))
            .collect::<BTreeMap<_, _>>();

        Self {
            dn: (!entry.dn.is_empty()).then(|| entry.dn.clone()),
            nodes: attributes
                .into_iter()
                .map(|(name, values)| RawNode::Attribute {
                    name,
                    values: values.clone(),
                })
                .collect(),
        }
    }
}

/// Key of a nested entry in a [`Flattened`] tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChildKey {
    /// Keyed by distinguished name.
    Dn(String),
    /// Positional; entries without a DN, or repeating one already seen.
    Position(usize),
}

/// Normalized form of a [`RawEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flattened {
    /// Attributes of this level.
    pub attributes: AttributeMap,
    /// Nested entries of this level, in order.
    pub children: Vec<(ChildKey, Flattened)>,
}

impl Flattened {
    /// Looks up a nested entry by DN.
    #[must_use]
    pub fn child(&self, dn: &str) -> Option<&Flattened> {
        self.children.iter().find_map(|(key, child)| match key {
            ChildKey::Dn(d) if d == dn => Some(child),
            _ => None,
        })
    }
}

/// Recursively normalizes a raw tree.
#[must_use]
pub fn flatten(raw: &RawEntry) -> Flattened {
    let mut flat = Flattened::default();
    let mut seen = HashSet::new();
    let mut position = 0;

    for node in &raw.nodes {
        match node {
            RawNode::Entry(subtree) => {
                let key = match subtree.dn.as_deref() {
                    Some(dn) if !dn.is_empty() && seen.insert(dn.to_string()) => {
                        ChildKey::Dn(dn.to_string())
                    }
                    _ => {
                        position += 1;
                        ChildKey::Position(position - 1)
                    }
                };
                flat.children.push((key, flatten(subtree)));
            }
            RawNode::Attribute { name, values } => {
                if let Some(value) = AttributeValue::from_values(values.clone()) {
                    flat.attributes.insert(name.clone(), value);
                }
            }
        }
    }
    flat
}

/// One search response.
///
/// The nested tree is built on first access and cached; the cache is not synchronized, so a
/// result must stay on one thread at a time.
#[derive(Debug)]
pub struct SearchResult {
    batch: SearchBatch,
    raw: OnceCell<RawEntry>,
}

impl SearchResult {
    /// Wraps a fetched batch.
    #[must_use]
    pub fn new(batch: SearchBatch) -> Self {
        Self {
            batch,
            raw: OnceCell::new(),
        }
    }

    /// Number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.entries.len()
    }

    /// True when the search matched nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.entries.is_empty()
    }

    /// Final status of the search.
    #[must_use]
    pub fn status(&self) -> &OperationStatus {
        &self.batch.status
    }

    /// True when the server stopped at the size limit.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.batch.status.is_size_limit_exceeded()
    }

    /// The nested tree of the whole response, built once.
    pub fn raw_entries(&self) -> &RawEntry {
        self.raw
            .get_or_init(|| RawEntry::from_entries(&self.batch.entries))
    }

    /// The whole response flattened, entries keyed by DN.
    #[must_use]
    pub fn to_flattened(&self) -> Flattened {
        flatten(self.raw_entries())
    }

    /// One attribute map per top-level entry, in server order.
    #[must_use]
    pub fn to_user_records(&self) -> Vec<AttributeMap> {
        self.raw_entries()
            .entries()
            .map(|entry| flatten(entry).attributes)
            .collect()
    }

    /// Attribute map of the first entry.
    #[must_use]
    pub fn first_record(&self) -> Option<AttributeMap> {
        self.raw_entries()
            .entries()
            .next()
            .map(|entry| flatten(entry).attributes)
    }

    /// For each top-level entry, the first value of `dn_attribute`, or `None` in that
    /// position when the entry lacks it.
    #[must_use]
    pub fn distinguished_names(&self, dn_attribute: &str) -> Vec<Option<String>> {
        self.raw_entries()
            .entries()
            .map(|entry| {
                entry
                    .attribute_values(dn_attribute)
                    .and_then(<[String]>::first)
                    .filter(|dn| !dn.is_empty())
                    .cloned()
            })
            .collect()
    }
}

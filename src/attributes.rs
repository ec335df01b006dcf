//! Case-insensitive multi-valued attribute storage for raw directory records

use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
struct Attribute {
    name: String,
    values: Vec<String>,
}

/// Attribute name (matched case-insensitively) to a non-empty, ordered list of values.
///
/// Blank values are dropped when they are inserted, and an attribute whose
/// values are all blank is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributeBag {
    entries: BTreeMap<String, Attribute>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append values under `name`, skipping blanks.
    pub fn insert<I, S>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kept: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v| !v.trim().is_empty())
            .collect();
        if kept.is_empty() {
            return;
        }

        self.entries
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Attribute {
                name: name.to_string(),
                values: Vec::new(),
            })
            .values
            .extend(kept);
    }

    /// First value of the attribute, if any
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// All values of the attribute; empty when absent
    pub fn values(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|attr| attr.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// True if any value of `name` equals `value`, ignoring case
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.values(name).iter().any(|v| v.eq_ignore_ascii_case(value))
    }

    /// Attribute names as first seen
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|attr| attr.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A distinguished name plus its attributes, as parsed from a search result entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub dn: String,
    pub attributes: AttributeBag,
}

impl RawRecord {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: AttributeBag::new(),
        }
    }

    /// Builder-style insert used by tests and the response parser
    pub fn with<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.insert(name, values);
        self
    }
}

//! Ordered, case-insensitive header collection.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header name: {0:?}")]
    InvalidName(String),

    #[error("invalid value for header {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    declared: String,
    name: HeaderName,
    value: HeaderValue,
}

/// Header name → value mapping.
///
/// Names compare case-insensitively but keep the casing they were declared
/// with. Inserting an existing name replaces its value and casing in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<HeaderEntry>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a header.
    pub fn insert(&mut self, name: &str, value: &str) -> Result<(), HeaderError> {
        let parsed_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HeaderError::InvalidName(name.to_string()))?;
        let parsed_value = HeaderValue::from_str(value).map_err(|_| HeaderError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        })?;

        let entry = HeaderEntry { declared: name.to_string(), name: parsed_name, value: parsed_value };
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        Ok(())
    }

    /// Build from `(name, value)` pairs, failing on the first malformed pair.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, HeaderError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.insert(name, value)?;
        }
        Ok(set)
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &HeaderSet) {
        for entry in &other.entries {
            match self.entries.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => *existing = entry.clone(),
                None => self.entries.push(entry.clone()),
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name.as_str().eq_ignore_ascii_case(name))
            .and_then(|e| e.value.to_str().ok())
    }

    /// Declared name and value pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.declared.as_str(), e.value.to_str().unwrap_or_default()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every header into `headers`, replacing existing values.
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        for entry in &self.entries {
            headers.insert(entry.name.clone(), entry.value.clone());
        }
    }
}

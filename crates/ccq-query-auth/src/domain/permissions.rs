//! # Permission Table
//!
//! Immutable mapping from lower-cased API key to the calls that key may make.
//! Built once by the loader; a reload builds a new table rather than editing this one.

use std::collections::{HashMap, HashSet};

use super::call_key::CallKey;

/// Permissions of one API key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionEntry {
    user_name: String,
    api_key: String,
    allowed_calls: HashSet<CallKey>,
}

impl PermissionEntry {
    pub(crate) fn new(user_name: String, api_key: String, allowed_calls: HashSet<CallKey>) -> Self {
        Self {
            user_name,
            api_key,
            allowed_calls,
        }
    }

    /// Display name of the user.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Lower-cased API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Whether this user may make the call.
    pub fn is_allowed(&self, key: &CallKey) -> bool {
        self.allowed_calls.contains(key)
    }

    /// Number of distinct allowed calls.
    pub fn allowed_call_count(&self) -> usize {
        self.allowed_calls.len()
    }
}

/// Permission lookup keyed by lower-cased API key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionTable {
    entries: HashMap<String, PermissionEntry>,
}

impl PermissionTable {
    /// Empty table. Every API key is rejected.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up an API key, case-insensitively.
    pub fn get(&self, api_key: &str) -> Option<&PermissionEntry> {
        self.entries.get(&api_key.to_lowercase())
    }

    /// Whether an entry exists for this already-normalized key.
    pub(crate) fn contains_normalized(&self, api_key: &str) -> bool {
        self.entries.contains_key(api_key)
    }

    /// Insert an entry under its normalized API key.
    pub(crate) fn insert(&mut self, entry: PermissionEntry) {
        self.entries.insert(entry.api_key.clone(), entry);
    }

    /// Number of API keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no API key is configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &PermissionEntry> {
        self.entries.values()
    }
}

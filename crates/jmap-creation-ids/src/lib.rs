// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The per-request creation-id table.
//!
//! `Foo/set.create` lets a client invent a temporary id (`"k"` in
//! `{"create": {"k": {...}}}`) and refer back to the server-assigned id
//! anywhere later in the same envelope via `"#k"`. [`CreationIdTable`] is
//! the append-only map backing that: a handler calls [`CreationIdTable::add`]
//! the moment it creates an object, and the dispatcher's back-reference
//! resolver (and any later `Foo/set.create`/`update`/`destroy` that embeds a
//! `"#k"`) consults [`CreationIdTable::resolve`].

use jmap_error::MethodError;
use std::collections::BTreeMap;

/// Per-request map from client-chosen creation id to the server-assigned
/// object id. Entries are inserted once and never mutated or removed
/// within a request.
#[derive(Debug, Clone, Default)]
pub struct CreationIdTable {
    table: BTreeMap<String, String>,
}

impl CreationIdTable {
    /// An empty table, seeded with nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from a client-supplied `createdIds` map (rare, but
    /// the Request envelope allows it per §3).
    #[must_use]
    pub fn seeded(entries: BTreeMap<String, String>) -> Self {
        Self { table: entries }
    }

    /// Record that `creation_id` now resolves to `server_id`.
    ///
    /// Calling this twice for the same `creation_id` overwrites the
    /// mapping; handlers should only ever call it once per id since
    /// creation ids are scoped to a single `create` within a single
    /// `Foo/set` call.
    pub fn add(&mut self, creation_id: impl Into<String>, server_id: impl Into<String>) {
        self.table.insert(creation_id.into(), server_id.into());
    }

    /// Resolve a creation id (without its leading `#`) to its server id.
    #[must_use]
    pub fn lookup(&self, creation_id: &str) -> Option<&str> {
        self.table.get(creation_id).map(String::as_str)
    }

    /// Resolve a `#creation-id` reference, returning the structured
    /// `invalidArguments` error the spec requires on an unknown lookup.
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::InvalidArguments`] naming `pointer` if
    /// `creation_id` (with its `#` already stripped) has no entry.
    pub fn resolve(&self, creation_id: &str, pointer: &str) -> Result<&str, MethodError> {
        self.lookup(creation_id)
            .ok_or_else(|| MethodError::invalid_argument(pointer.to_string()))
    }

    /// Replace every `#creation-id` string found anywhere inside `value`
    /// (recursively, including object values and array elements) with its
    /// resolved server id. Strings that aren't `#`-prefixed, or that don't
    /// match any known creation id, are left untouched — per RFC 8620
    /// §3.6.1, only object/set-id-shaped properties are substituted by
    /// convention, and callers that need strict rejection should use
    /// [`CreationIdTable::resolve`] directly instead.
    #[must_use]
    pub fn substitute_in(&self, value: serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) => {
                if let Some(stripped) = s.strip_prefix('#') {
                    if let Some(resolved) = self.lookup(stripped) {
                        return serde_json::Value::String(resolved.to_string());
                    }
                }
                serde_json::Value::String(s)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(|v| self.substitute_in(v)).collect())
            }
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, self.substitute_in(v))).collect(),
            ),
            other => other,
        }
    }

    /// A snapshot of every creation id resolved so far, for embedding in
    /// the final Response envelope's `createdIds`.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.table.clone()
    }

    /// Number of entries recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if no creation ids have been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

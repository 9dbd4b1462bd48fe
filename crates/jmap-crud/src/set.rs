// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Foo/set` shape: `{ifInState?, create, update, destroy}` in,
//! `{accountId, oldState, newState, created, updated, destroyed,
//! notCreated, notUpdated, notDestroyed}` out.

use jmap_error::{MethodError, ObjectErrorMap};
use jmap_limits::Limits;
use jmap_parser::Parser;
use jmap_patch::PatchObject;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parsed `Foo/set` request arguments. `update`'s values are kept as raw
/// [`PatchObject`]s (RFC 8620 §5.3's `/`-pointer shorthand); a handler
/// applies them with [`jmap_patch::apply`] against the object it loads.
#[derive(Debug, Clone, PartialEq)]
pub struct SetRequest {
    /// Target account.
    pub account_id: String,
    /// Optimistic-concurrency precondition; if present it must equal the
    /// type's current state before any mutation is attempted.
    pub if_in_state: Option<String>,
    /// `creation-id -> object-to-create` map, in client-supplied order is
    /// not guaranteed (backed by a `BTreeMap`; §5 allows arbitrary
    /// processing order).
    pub create: BTreeMap<String, Value>,
    /// `id -> patch` map.
    pub update: BTreeMap<String, PatchObject>,
    /// Ids to destroy.
    pub destroy: Vec<String>,
}

impl SetRequest {
    /// Parse `args`, enforcing [`Limits::check_set_object_count`] over the
    /// combined `create`+`update`+`destroy` cardinality.
    #[must_use]
    pub fn parse(parser: &mut Parser, args: &Value, limits: &Limits) -> Option<Self> {
        let account_id = parser.read_str(args, "accountId", true)?.to_string();
        let if_in_state = parser.read_str(args, "ifInState", false).map(str::to_string);

        let create = parse_object_map(parser, args, "create").unwrap_or_default();
        let update = parse_patch_map(parser, args, "update").unwrap_or_default();
        let destroy = parser.read_string_array(args, "destroy", false).unwrap_or_default();

        let total = (create.len() + update.len() + destroy.len()) as u64;
        if limits.check_set_object_count(total).is_err() {
            parser.invalid_here();
            return None;
        }

        Some(Self {
            account_id,
            if_in_state,
            create,
            update,
            destroy,
        })
    }
}

fn parse_object_map(parser: &mut Parser, args: &Value, name: &str) -> Option<BTreeMap<String, Value>> {
    let obj = parser.read_object(args, name, false)?;
    let obj = obj.clone();
    let mut out = BTreeMap::new();
    let mut ok = true;
    parser.descend_property(name, |parser| {
        for (key, value) in &obj {
            if value.is_object() {
                out.insert(key.clone(), value.clone());
            } else {
                parser.descend_property(key, |parser| parser.invalid_here());
                ok = false;
            }
        }
    });
    if ok { Some(out) } else { None }
}

fn parse_patch_map(parser: &mut Parser, args: &Value, name: &str) -> Option<BTreeMap<String, PatchObject>> {
    let obj = parser.read_object(args, name, false)?;
    let obj = obj.clone();
    let mut out = BTreeMap::new();
    let mut ok = true;
    parser.descend_property(name, |parser| {
        for (key, value) in &obj {
            let Some(patch_obj) = value.as_object() else {
                parser.descend_property(key, |parser| parser.invalid_here());
                ok = false;
                continue;
            };
            let mut patch = PatchObject::new();
            for (path, v) in patch_obj {
                patch.insert(path.clone(), v.clone());
            }
            out.insert(key.clone(), patch);
        }
    });
    if ok { Some(out) } else { None }
}

/// Accumulates the outcome of processing a `Set` call's `create`/
/// `update`/`destroy` maps; each per-object failure goes in the matching
/// `not_*` map and never aborts the whole call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOutcome {
    /// `creation-id -> created object` (its full post-create
    /// representation, including server-assigned properties).
    pub created: BTreeMap<String, Value>,
    /// `id -> { changed-property: new-value }` (only properties the
    /// server itself changed beyond what the client supplied, e.g.
    /// server-set timestamps; often empty).
    pub updated: BTreeMap<String, Value>,
    /// Ids successfully destroyed.
    pub destroyed: Vec<String>,
    /// Per-creation-id failures.
    pub not_created: ObjectErrorMap,
    /// Per-id update failures.
    pub not_updated: ObjectErrorMap,
    /// Per-id destroy failures.
    pub not_destroyed: ObjectErrorMap,
}

impl SetOutcome {
    /// A fresh, empty outcome.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Assembled `Foo/set` response.
#[derive(Debug, Clone, PartialEq)]
pub struct SetResponse {
    /// Echoes [`SetRequest::account_id`].
    pub account_id: String,
    /// The type's state before this call's mutations.
    pub old_state: String,
    /// The type's state after this call's mutations (equal to
    /// `old_state` if nothing was actually created/updated/destroyed).
    pub new_state: String,
    /// The accumulated per-object outcome.
    pub outcome: SetOutcome,
}

impl SetResponse {
    /// Build the JSON reply payload.
    #[must_use]
    pub fn reply(&self) -> Value {
        let mut m = Map::new();
        m.insert("accountId".into(), Value::String(self.account_id.clone()));
        m.insert("oldState".into(), Value::String(self.old_state.clone()));
        m.insert("newState".into(), Value::String(self.new_state.clone()));
        insert_object_map(&mut m, "created", &self.outcome.created);
        insert_object_map(&mut m, "updated", &self.outcome.updated);
        m.insert(
            "destroyed".into(),
            non_empty_array(self.outcome.destroyed.iter().cloned().map(Value::String).collect()),
        );
        insert_error_map(&mut m, "notCreated", &self.outcome.not_created);
        insert_error_map(&mut m, "notUpdated", &self.outcome.not_updated);
        insert_error_map(&mut m, "notDestroyed", &self.outcome.not_destroyed);
        Value::Object(m)
    }
}

fn insert_object_map(m: &mut Map<String, Value>, key: &str, map: &BTreeMap<String, Value>) {
    if map.is_empty() {
        m.insert(key.to_string(), Value::Null);
        return;
    }
    let mut out = Map::new();
    for (k, v) in map {
        out.insert(k.clone(), v.clone());
    }
    m.insert(key.to_string(), Value::Object(out));
}

fn insert_error_map(m: &mut Map<String, Value>, key: &str, map: &ObjectErrorMap) {
    if map.is_empty() {
        m.insert(key.to_string(), Value::Null);
        return;
    }
    let mut out = Map::new();
    for (k, v) in map {
        out.insert(k.clone(), serde_json::to_value(v).expect("ObjectError always serializes"));
    }
    m.insert(key.to_string(), Value::Object(out));
}

fn non_empty_array(items: Vec<Value>) -> Value {
    if items.is_empty() {
        Value::Null
    } else {
        Value::Array(items)
    }
}

/// Check `ifInState` against the type's `current_state`.
///
/// # Errors
///
/// Returns [`MethodError::StateMismatch`] if `if_in_state` is `Some` and
/// differs from `current_state`.
pub fn check_if_in_state(if_in_state: Option<&str>, current_state: &str) -> Result<(), MethodError> {
    match if_in_state {
        Some(expected) if expected != current_state => Err(MethodError::StateMismatch),
        _ => Ok(()),
    }
}

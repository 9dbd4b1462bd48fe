// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Foo/copy` shape: clone objects from one account into another,
//! optionally destroying the originals once every copy has succeeded.

use jmap_error::ObjectErrorMap;
use jmap_parser::Parser;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parsed `Foo/copy` request arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyRequest {
    /// Account the objects are copied from.
    pub from_account_id: String,
    /// Account the objects are copied into.
    pub account_id: String,
    /// Optimistic-concurrency precondition against the *source*
    /// account's state.
    pub if_from_in_state: Option<String>,
    /// Optimistic-concurrency precondition against the *destination*
    /// account's state.
    pub if_in_state: Option<String>,
    /// `creation-id -> {id: source-id, ...overrides}` map; each value is
    /// the source object's id plus any properties to override on the
    /// copy, mirroring `Set::create`'s shape.
    pub create: BTreeMap<String, Value>,
    /// If `true` and every requested copy succeeds, the caller should
    /// enqueue a deferred `Foo/set` destroying the copied source ids.
    pub on_success_destroy_original: bool,
}

impl CopyRequest {
    /// Parse `args`.
    #[must_use]
    pub fn parse(parser: &mut Parser, args: &Value) -> Option<Self> {
        let from_account_id = parser.read_str(args, "fromAccountId", true)?.to_string();
        let account_id = parser.read_str(args, "accountId", true)?.to_string();
        let if_from_in_state = parser.read_str(args, "ifFromInState", false).map(str::to_string);
        let if_in_state = parser.read_str(args, "ifInState", false).map(str::to_string);

        let create_obj = parser.read_object(args, "create", true)?.clone();
        let mut create = BTreeMap::new();
        let mut ok = true;
        parser.descend_property("create", |parser| {
            for (key, value) in &create_obj {
                if value.is_object() {
                    create.insert(key.clone(), value.clone());
                } else {
                    parser.descend_property(key, |parser| parser.invalid_here());
                    ok = false;
                }
            }
        });
        if !ok {
            return None;
        }

        let on_success_destroy_original = parser
            .read_bool(args, "onSuccessDestroyOriginal", false)
            .unwrap_or(false);

        Some(Self {
            from_account_id,
            account_id,
            if_from_in_state,
            if_in_state,
            create,
            on_success_destroy_original,
        })
    }

    /// Build the `Foo/set` sub-call arguments that destroy every
    /// successfully copied source object, if [`on_success_destroy_original`](Self::on_success_destroy_original)
    /// is set and `outcome` reports no failures at all.
    ///
    /// Returns `None` when no destroy call should be scheduled: the flag
    /// is unset, nothing was actually created, or at least one source
    /// object failed to copy (RFC 8620 §5.4 requires *all* copies to
    /// succeed before any destroy is attempted).
    #[must_use]
    pub fn deferred_destroy_args(&self, outcome: &CopyOutcome) -> Option<Value> {
        if !self.on_success_destroy_original {
            return None;
        }
        if outcome.created.is_empty() || !outcome.not_created.is_empty() {
            return None;
        }
        let destroy: Vec<Value> = outcome
            .source_ids_copied
            .iter()
            .cloned()
            .map(Value::String)
            .collect();
        let mut args = Map::new();
        args.insert("accountId".into(), Value::String(self.from_account_id.clone()));
        args.insert("destroy".into(), Value::Array(destroy));
        Some(Value::Object(args))
    }
}

/// Accumulates the outcome of processing a `Copy` call's `create` map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CopyOutcome {
    /// `creation-id -> created object` in the destination account.
    pub created: BTreeMap<String, Value>,
    /// Per-creation-id failures.
    pub not_created: ObjectErrorMap,
    /// The source ids that were copied successfully, in the order they
    /// were processed; used to build the deferred destroy call.
    pub source_ids_copied: Vec<String>,
}

impl CopyOutcome {
    /// A fresh, empty outcome.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Assembled `Foo/copy` response.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyResponse {
    /// Echoes [`CopyRequest::from_account_id`].
    pub from_account_id: String,
    /// Echoes [`CopyRequest::account_id`].
    pub account_id: String,
    /// The destination account's state after this call's creations.
    pub new_state: String,
    /// The accumulated per-object outcome.
    pub outcome: CopyOutcome,
}

impl CopyResponse {
    /// Build the JSON reply payload.
    #[must_use]
    pub fn reply(&self) -> Value {
        let mut m = Map::new();
        m.insert("fromAccountId".into(), Value::String(self.from_account_id.clone()));
        m.insert("accountId".into(), Value::String(self.account_id.clone()));
        m.insert("newState".into(), Value::String(self.new_state.clone()));
        if self.outcome.created.is_empty() {
            m.insert("created".into(), Value::Null);
        } else {
            let mut out = Map::new();
            for (k, v) in &self.outcome.created {
                out.insert(k.clone(), v.clone());
            }
            m.insert("created".into(), Value::Object(out));
        }
        if self.outcome.not_created.is_empty() {
            m.insert("notCreated".into(), Value::Null);
        } else {
            let mut out = Map::new();
            for (k, v) in &self.outcome.not_created {
                out.insert(k.clone(), serde_json::to_value(v).expect("ObjectError always serializes"));
            }
            m.insert("notCreated".into(), Value::Object(out));
        }
        Value::Object(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_required_fields_and_create_map() {
        let mut p = Parser::new();
        let args = json!({
            "fromAccountId": "a1",
            "accountId": "a2",
            "create": {"k1": {"id": "M1"}},
        });
        let req = CopyRequest::parse(&mut p, &args).unwrap();
        assert_eq!(req.from_account_id, "a1");
        assert_eq!(req.account_id, "a2");
        assert!(!req.on_success_destroy_original);
        assert_eq!(req.create.len(), 1);
    }

    #[test]
    fn non_object_create_entry_is_invalid() {
        let mut p = Parser::new();
        let args = json!({"fromAccountId": "a1", "accountId": "a2", "create": {"k1": 5}});
        assert!(CopyRequest::parse(&mut p, &args).is_none());
        assert_eq!(p.invalid_pointers(), &["/create/k1".to_string()]);
    }

    #[test]
    fn deferred_destroy_is_none_without_the_flag() {
        let mut p = Parser::new();
        let args = json!({"fromAccountId": "a1", "accountId": "a2", "create": {"k1": {"id": "M1"}}});
        let req = CopyRequest::parse(&mut p, &args).unwrap();
        let mut outcome = CopyOutcome::new();
        outcome.created.insert("k1".into(), json!({"id": "M9"}));
        outcome.source_ids_copied.push("M1".into());
        assert!(req.deferred_destroy_args(&outcome).is_none());
    }

    #[test]
    fn deferred_destroy_is_none_if_any_copy_failed() {
        let mut p = Parser::new();
        let args = json!({
            "fromAccountId": "a1",
            "accountId": "a2",
            "create": {"k1": {"id": "M1"}},
            "onSuccessDestroyOriginal": true,
        });
        let req = CopyRequest::parse(&mut p, &args).unwrap();
        let mut outcome = CopyOutcome::new();
        outcome
            .not_created
            .insert("k1".into(), jmap_error::ObjectError::NotFound);
        assert!(req.deferred_destroy_args(&outcome).is_none());
    }

    #[test]
    fn deferred_destroy_builds_set_args_when_everything_succeeded() {
        let mut p = Parser::new();
        let args = json!({
            "fromAccountId": "a1",
            "accountId": "a2",
            "create": {"k1": {"id": "M1"}},
            "onSuccessDestroyOriginal": true,
        });
        let req = CopyRequest::parse(&mut p, &args).unwrap();
        let mut outcome = CopyOutcome::new();
        outcome.created.insert("k1".into(), json!({"id": "M9"}));
        outcome.source_ids_copied.push("M1".into());
        let destroy_args = req.deferred_destroy_args(&outcome).unwrap();
        assert_eq!(destroy_args["accountId"], "a1");
        assert_eq!(destroy_args["destroy"][0], "M1");
    }
}

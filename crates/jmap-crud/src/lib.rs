// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The shared Get/Set/Changes/Query/QueryChanges/Copy parse-and-reply shapes.
//!
//! RFC 8620 §5 defines six uniform call shapes that every `Foo/get`,
//! `Foo/set`, `Foo/changes`, `Foo/query`, `Foo/queryChanges`, and
//! `Foo/copy` method reuses. Each shape here is a value object split in
//! two: a `*Request` half the [`jmap_parser::Parser`] fills from the
//! call's raw arguments, and a `*Response` half a type-specific handler
//! fills in before calling `.reply()` to get the JSON payload.
//!
//! Per-type behavior (which properties exist, how a `filter` leaf
//! condition or a `sort` property name is validated) is threaded through
//! the [`CrudHooks`] trait rather than hardcoded here, so one
//! implementation of this crate's parsing serves every data type the
//! workspace's protocol modules (mail, contacts, calendars, submission)
//! define.

use jmap_error::{MethodError, ObjectError, ObjectErrorMap};
use jmap_parser::Parser;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

mod changes;
mod copy;
mod filter;
pub mod get;
mod query;
mod query_changes;
mod set;

pub use changes::{ChangesRequest, ChangesResponse};
pub use copy::{CopyOutcome, CopyRequest, CopyResponse};
pub use filter::{Filter, FilterOperator};
pub use get::{GetRequest, GetResponse};
pub use query::{AnchorOrPosition, QueryRequest, QueryResponse};
pub use query_changes::{AddedItem, QueryChangesRequest, QueryChangesResponse};
pub use set::{SetOutcome, SetRequest, SetResponse};

/// A single entry of `Query`/`QueryChanges`'s `sort` array: `{property,
/// isAscending, collation}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    /// Name of the property to sort by.
    pub property: String,
    /// Ascending if `true` (the default), descending otherwise.
    pub is_ascending: bool,
    /// Optional collation identifier (e.g. `"i;ascii-casemap"`); `None`
    /// means "the server's default collation for this property".
    pub collation: Option<String>,
}

impl Comparator {
    fn parse_one(parser: &mut Parser, value: &Value, valid_properties: &BTreeSet<String>) -> Option<Self> {
        let obj = value.as_object()?;
        let property = parser.read_str(value, "property", true)?.to_string();
        if !valid_properties.contains(&property) {
            parser.invalid("property");
            return None;
        }
        let is_ascending = match obj.get("isAscending") {
            None => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                parser.invalid("isAscending");
                return None;
            }
        };
        let collation = parser.read_str(value, "collation", false).map(str::to_string);
        Some(Self {
            property,
            is_ascending,
            collation,
        })
    }

    /// Parse a `sort` array into a list of [`Comparator`]s, validating
    /// every `property` name against `valid_properties`.
    #[must_use]
    pub fn parse_list(
        parser: &mut Parser,
        obj: &Value,
        name: &str,
        valid_properties: &BTreeSet<String>,
    ) -> Option<Vec<Self>> {
        let arr = parser.read_array(obj, name, false)?;
        if arr.is_empty() {
            return Some(Vec::new());
        }
        let arr = arr.clone();
        let mut out = Vec::with_capacity(arr.len());
        let mut ok = true;
        parser.descend_property(name, |parser| {
            for (i, item) in arr.iter().enumerate() {
                match parser.descend_index(i, |parser| Self::parse_one(parser, item, valid_properties)) {
                    Some(cmp) => out.push(cmp),
                    None => ok = false,
                }
            }
        });
        if ok { Some(out) } else { None }
    }

    fn to_json(&self) -> Value {
        let mut m = Map::new();
        m.insert("property".into(), Value::String(self.property.clone()));
        m.insert("isAscending".into(), Value::Bool(self.is_ascending));
        if let Some(collation) = &self.collation {
            m.insert("collation".into(), Value::String(collation.clone()));
        }
        Value::Object(m)
    }
}

/// Per-type hooks a CRUD-shape parser consults so one implementation of
/// the uniform shapes serves every data type.
///
/// Implemented once per data type (`Email`, `Mailbox`, `Contact`, ...);
/// the shapes in this crate call through `&dyn CrudHooks` rather than
/// being generic over it, so a method registry can hold heterogeneous
/// handlers behind one trait object.
pub trait CrudHooks {
    /// The full set of property names `Foo/get.properties` and
    /// `Query`'s `sort[].property` may name for this type.
    fn properties(&self) -> &BTreeSet<String>;

    /// Parse one leaf filter condition (a `filter` object with no
    /// `operator` key) into a JSON value the store understands; returns
    /// `None` and records an invalid pointer on a bad shape.
    fn parse_filter_condition(&self, parser: &mut Parser, value: &Value) -> Option<Value>;

    /// Extra, type-specific request arguments `Foo/set` should parse
    /// beyond `ifInState`/`create`/`update`/`destroy` (e.g. mail's
    /// `onSuccessUpdateEmail`). Most types have none.
    fn parse_set_extra(&self, _parser: &mut Parser, _args: &Value) -> Value {
        Value::Null
    }
}

/// Validate that every name in `properties` is a member of
/// `valid_properties`, recording an invalid pointer at `properties[i]`
/// for the first offender and returning `false`.
fn properties_are_known(
    parser: &mut Parser,
    properties: &[String],
    valid_properties: &BTreeSet<String>,
) -> bool {
    let mut ok = true;
    parser.descend_property("properties", |parser| {
        for (i, name) in properties.iter().enumerate() {
            if !valid_properties.contains(name) {
                parser.descend_index(i, |parser| parser.invalid_here());
                ok = false;
            }
        }
    });
    ok
}

/// Project `object` down to `properties` (plus `id`, always retained),
/// per the `Foo/get.properties` contract.
#[must_use]
pub fn project_properties(object: &Value, properties: Option<&[String]>) -> Value {
    let Some(properties) = properties else {
        return object.clone();
    };
    let Some(map) = object.as_object() else {
        return object.clone();
    };
    let mut out = Map::new();
    if let Some(id) = map.get("id") {
        out.insert("id".to_string(), id.clone());
    }
    for name in properties {
        if name == "id" {
            continue;
        }
        if let Some(v) = map.get(name) {
            out.insert(name.clone(), v.clone());
        }
    }
    Value::Object(out)
}

/// Build the `{type: "invalidProperties", properties: [...]}`
/// object-error used across `notCreated`/`notUpdated`.
#[must_use]
pub fn invalid_properties_error(names: Vec<String>) -> ObjectError {
    ObjectError::InvalidProperties { properties: names }
}

/// Convenience: fold a `jmap_parser::Parser` into a tier-2
/// `invalidArguments` error, if it recorded anything.
fn finish(parser: Parser) -> Result<(), MethodError> {
    parser.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn comparator_parses_defaults() {
        let mut p = Parser::new();
        let valid = props(&["receivedAt"]);
        let cmp = Comparator::parse_one(&mut p, &json!({"property": "receivedAt"}), &valid).unwrap();
        assert!(cmp.is_ascending);
        assert_eq!(cmp.collation, None);
    }

    #[test]
    fn comparator_rejects_unknown_property() {
        let mut p = Parser::new();
        let valid = props(&["receivedAt"]);
        assert!(Comparator::parse_one(&mut p, &json!({"property": "bogus"}), &valid).is_none());
        assert_eq!(p.invalid_pointers(), &["/property".to_string()]);
    }

    #[test]
    fn comparator_list_parses_multiple_entries() {
        let mut p = Parser::new();
        let valid = props(&["receivedAt", "subject"]);
        let args = json!({"sort": [
            {"property": "receivedAt", "isAscending": false},
            {"property": "subject"},
        ]});
        let list = Comparator::parse_list(&mut p, &args, "sort", &valid).unwrap();
        assert_eq!(list.len(), 2);
        assert!(!list[0].is_ascending);
        assert!(list[1].is_ascending);
    }

    #[test]
    fn project_properties_keeps_id_and_requested_only() {
        let obj = json!({"id": "M1", "subject": "hi", "size": 100});
        let out = project_properties(&obj, Some(&["subject".to_string()]));
        assert_eq!(out, json!({"id": "M1", "subject": "hi"}));
    }

    #[test]
    fn project_properties_none_returns_whole_object() {
        let obj = json!({"id": "M1", "subject": "hi"});
        assert_eq!(project_properties(&obj, None), obj);
    }
}

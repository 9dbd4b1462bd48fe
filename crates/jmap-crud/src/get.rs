// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Foo/get` shape: `{ids?, properties?}` in, `{accountId, state, list,
//! notFound}` out.

use crate::properties_are_known;
use jmap_error::MethodError;
use jmap_parser::Parser;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Parsed `Foo/get` request arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRequest {
    /// Target account.
    pub account_id: String,
    /// `ids` to fetch; `None` means "every object of this type" (only
    /// valid when the type allows `allowNullIds`).
    pub ids: Option<Vec<String>>,
    /// Subset of property names to return; `None` means "every property".
    pub properties: Option<Vec<String>>,
}

impl GetRequest {
    /// Parse `args` against `valid_properties`.
    ///
    /// If `ids` is absent and `allow_null_ids` is `false`, records
    /// `/ids` invalid (the type requires an explicit id list, e.g.
    /// because enumerating "all objects" is prohibitively expensive).
    #[must_use]
    pub fn parse(
        parser: &mut Parser,
        args: &Value,
        valid_properties: &BTreeSet<String>,
        allow_null_ids: bool,
    ) -> Option<Self> {
        let account_id = parser.read_str(args, "accountId", true)?.to_string();
        let ids = match args.get("ids") {
            None | Some(Value::Null) => {
                if !allow_null_ids {
                    parser.invalid("ids");
                    None
                } else {
                    Some(None)
                }
            }
            Some(_) => parser.read_string_array(args, "ids", true).map(Some),
        }?;

        let properties = match parser.read_string_array(args, "properties", false) {
            Some(props) => {
                if !properties_are_known(parser, &props, valid_properties) {
                    return None;
                }
                Some(props)
            }
            None if args.get("properties").is_some() => return None,
            None => None,
        };

        Some(Self {
            account_id,
            ids,
            properties,
        })
    }
}

/// Assembled `Foo/get` response.
#[derive(Debug, Clone, PartialEq)]
pub struct GetResponse {
    /// Echoes [`GetRequest::account_id`].
    pub account_id: String,
    /// The type's current state token.
    pub state: String,
    /// Fetched objects, already projected to the requested properties.
    pub list: Vec<Value>,
    /// Every requested id that did not resolve to an object, in request
    /// order.
    pub not_found: Vec<String>,
}

impl GetResponse {
    /// Build the JSON reply payload.
    #[must_use]
    pub fn reply(&self) -> Value {
        let mut m = Map::new();
        m.insert("accountId".into(), Value::String(self.account_id.clone()));
        m.insert("state".into(), Value::String(self.state.clone()));
        m.insert("list".into(), Value::Array(self.list.clone()));
        m.insert(
            "notFound".into(),
            Value::Array(self.not_found.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(m)
    }
}

/// Resolve a `GetRequest` against a per-object lookup, producing the
/// `list`/`notFound` split and projecting each found object to the
/// requested properties.
///
/// # Errors
///
/// Propagates whatever `lookup` returns for a transient/permanent
/// backend failure.
pub fn resolve<F>(
    request: &GetRequest,
    ids_if_none: impl FnOnce() -> Vec<String>,
    mut lookup: F,
) -> Result<(Vec<Value>, Vec<String>), MethodError>
where
    F: FnMut(&str) -> Result<Option<Value>, MethodError>,
{
    let ids = match &request.ids {
        Some(ids) => ids.clone(),
        None => ids_if_none(),
    };
    let mut list = Vec::with_capacity(ids.len());
    let mut not_found = Vec::new();
    for id in ids {
        match lookup(&id)? {
            Some(obj) => list.push(crate::project_properties(&obj, request.properties.as_deref())),
            None => not_found.push(id),
        }
    }
    Ok((list, not_found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_explicit_ids_and_properties() {
        let mut p = Parser::new();
        let args = json!({"accountId": "a1", "ids": ["M1", "M2"], "properties": ["subject"]});
        let req = GetRequest::parse(&mut p, &args, &props(&["subject"]), false).unwrap();
        assert_eq!(req.ids, Some(vec!["M1".to_string(), "M2".to_string()]));
        assert_eq!(req.properties, Some(vec!["subject".to_string()]));
    }

    #[test]
    fn null_ids_rejected_unless_allowed() {
        let mut p = Parser::new();
        let args = json!({"accountId": "a1"});
        assert!(GetRequest::parse(&mut p, &args, &props(&[]), false).is_none());
        assert_eq!(p.invalid_pointers(), &["/ids".to_string()]);
    }

    #[test]
    fn null_ids_allowed_when_type_permits() {
        let mut p = Parser::new();
        let args = json!({"accountId": "a1"});
        let req = GetRequest::parse(&mut p, &args, &props(&[]), true).unwrap();
        assert_eq!(req.ids, None);
    }

    #[test]
    fn unknown_property_name_is_invalid_arguments() {
        let mut p = Parser::new();
        let args = json!({"accountId": "a1", "ids": [], "properties": ["bogus"]});
        assert!(GetRequest::parse(&mut p, &args, &props(&["subject"]), false).is_none());
        assert_eq!(p.invalid_pointers(), &["/properties/0".to_string()]);
    }

    #[test]
    fn resolve_splits_found_and_not_found_and_projects() {
        let req = GetRequest {
            account_id: "a1".into(),
            ids: Some(vec!["M1".into(), "M2".into()]),
            properties: Some(vec!["subject".into()]),
        };
        let (list, not_found) = resolve(
            &req,
            Vec::new,
            |id| {
                Ok(if id == "M1" {
                    Some(json!({"id": "M1", "subject": "hi", "size": 10}))
                } else {
                    None
                })
            },
        )
        .unwrap();
        assert_eq!(list, vec![json!({"id": "M1", "subject": "hi"})]);
        assert_eq!(not_found, vec!["M2".to_string()]);
    }

    #[test]
    fn reply_shape_matches_wire_contract() {
        let resp = GetResponse {
            account_id: "a1".into(),
            state: "5".into(),
            list: vec![json!({"id": "M1"})],
            not_found: vec!["M2".into()],
        };
        assert_eq!(
            resp.reply(),
            json!({
                "accountId": "a1",
                "state": "5",
                "list": [{"id": "M1"}],
                "notFound": ["M2"],
            })
        );
    }
}

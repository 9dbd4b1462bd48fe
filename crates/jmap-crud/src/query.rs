// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Foo/query` shape: `{filter?, sort?, position?, anchor?,
//! anchorOffset?, limit?, calculateTotal?}` in, `{queryState,
//! canCalculateChanges, position, ids, total?}` out.

use crate::{Comparator, CrudHooks, Filter};
use jmap_error::MethodError;
use jmap_limits::Limits;
use jmap_parser::Parser;
use serde_json::{Map, Value};

/// Either `position` or `anchor` was supplied (never both, per §4.6 of
/// the core specification).
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorOrPosition {
    /// A plain zero-based (possibly negative) offset into the result
    /// list.
    Position(i64),
    /// Find `anchor` in the result list first, then apply `anchorOffset`
    /// relative to it.
    Anchor {
        /// The id to locate.
        id: String,
        /// Offset relative to the anchor's index.
        offset: i64,
    },
}

/// Parsed `Foo/query` request arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Target account.
    pub account_id: String,
    /// Parsed filter tree, if any.
    pub filter: Option<Filter>,
    /// Parsed sort comparators, in priority order.
    pub sort: Vec<Comparator>,
    /// Where in the result list to start.
    pub anchor_or_position: AnchorOrPosition,
    /// Maximum ids to return, already clamped to
    /// [`Limits::max_objects_in_get`].
    pub limit: u64,
    /// Whether the response should include a `total` count.
    pub calculate_total: bool,
}

impl QueryRequest {
    /// Parse `args` using `hooks` for type-specific filter leaves and
    /// sort property validation.
    #[must_use]
    pub fn parse(parser: &mut Parser, args: &Value, hooks: &dyn CrudHooks, limits: &Limits) -> Option<Self> {
        let account_id = parser.read_str(args, "accountId", true)?.to_string();

        let filter = match args.get("filter") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = parser.descend_property("filter", |parser| Filter::parse(parser, value, hooks));
                Some(parsed?)
            }
        };

        let sort = Comparator::parse_list(parser, args, "sort", hooks.properties()).unwrap_or_default();

        let position = parser.read_i64(args, "position", false);
        let anchor = parser.read_str(args, "anchor", false).map(str::to_string);
        let anchor_offset = parser.read_i64(args, "anchorOffset", false).unwrap_or(0);

        if position.is_some() && anchor.is_some() {
            parser.invalid("anchor");
            return None;
        }

        let anchor_or_position = match anchor {
            Some(id) => AnchorOrPosition::Anchor {
                id,
                offset: anchor_offset,
            },
            None => AnchorOrPosition::Position(position.unwrap_or(0)),
        };

        let requested_limit = match parser.read_i64(args, "limit", false) {
            Some(n) if n >= 0 => Some(n as u64),
            Some(_) => {
                parser.invalid("limit");
                return None;
            }
            None if args.get("limit").is_some() => return None,
            None => None,
        };
        let limit = limits.clamp_query_limit(requested_limit);

        let calculate_total = parser.read_bool(args, "calculateTotal", false).unwrap_or(false);

        Some(Self {
            account_id,
            filter,
            sort,
            anchor_or_position,
            limit,
            calculate_total,
        })
    }
}

/// Assembled `Foo/query` response.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Echoes [`QueryRequest::account_id`].
    pub account_id: String,
    /// Opaque state of the query result at the time it was computed.
    pub query_state: String,
    /// Whether `Foo/queryChanges` can be used from this state.
    pub can_calculate_changes: bool,
    /// The zero-based index of `ids[0]` in the full result set.
    pub position: i64,
    /// The matching ids, in sort order, limited to `limit` entries.
    pub ids: Vec<String>,
    /// Total number of matching ids, if `calculateTotal` was requested.
    pub total: Option<u64>,
}

impl QueryResponse {
    /// Build the JSON reply payload.
    #[must_use]
    pub fn reply(&self) -> Value {
        let mut m = Map::new();
        m.insert("accountId".into(), Value::String(self.account_id.clone()));
        m.insert("queryState".into(), Value::String(self.query_state.clone()));
        m.insert("canCalculateChanges".into(), Value::Bool(self.can_calculate_changes));
        m.insert("position".into(), Value::Number(self.position.into()));
        m.insert(
            "ids".into(),
            Value::Array(self.ids.iter().cloned().map(Value::String).collect()),
        );
        if let Some(total) = self.total {
            m.insert("total".into(), Value::Number(total.into()));
        }
        Value::Object(m)
    }
}

/// Resolve an [`AnchorOrPosition`] against a fully materialized,
/// already-sorted id list into a concrete starting index.
///
/// # Errors
///
/// Returns [`MethodError::AnchorNotFound`] if an `anchor` id is not
/// present in `all_ids`.
pub fn resolve_start_index(anchor_or_position: &AnchorOrPosition, all_ids: &[String]) -> Result<usize, MethodError> {
    match anchor_or_position {
        AnchorOrPosition::Position(pos) => {
            if *pos < 0 {
                let from_end = (-*pos) as usize;
                Ok(all_ids.len().saturating_sub(from_end))
            } else {
                Ok((*pos as usize).min(all_ids.len()))
            }
        }
        AnchorOrPosition::Anchor { id, offset } => {
            let anchor_index = all_ids
                .iter()
                .position(|candidate| candidate == id)
                .ok_or(MethodError::AnchorNotFound)?;
            let resolved = anchor_index as i64 + offset;
            Ok(resolved.clamp(0, all_ids.len() as i64) as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jmap_limits::RawLimits;
    use serde_json::json;
    use std::collections::BTreeSet;

    struct NoOpHooks(BTreeSet<String>);

    impl CrudHooks for NoOpHooks {
        fn properties(&self) -> &BTreeSet<String> {
            &self.0
        }
        fn parse_filter_condition(&self, _parser: &mut Parser, value: &Value) -> Option<Value> {
            Some(value.clone())
        }
    }

    fn limits() -> Limits {
        Limits::from_raw(RawLimits {
            max_size_upload: 1,
            max_concurrent_upload: 1,
            max_size_request: 1,
            max_concurrent_requests: 1,
            max_calls_in_request: 1,
            max_objects_in_get: 5,
            max_objects_in_set: 1,
        })
    }

    #[test]
    fn position_and_anchor_together_is_invalid() {
        let mut p = Parser::new();
        let hooks = NoOpHooks(BTreeSet::new());
        let args = json!({"accountId": "a1", "position": 1, "anchor": "M1"});
        assert!(QueryRequest::parse(&mut p, &args, &hooks, &limits()).is_none());
        assert_eq!(p.invalid_pointers(), &["/anchor".to_string()]);
    }

    #[test]
    fn limit_is_clamped_to_max_objects_in_get() {
        let mut p = Parser::new();
        let hooks = NoOpHooks(BTreeSet::new());
        let args = json!({"accountId": "a1", "limit": 1000});
        let req = QueryRequest::parse(&mut p, &args, &hooks, &limits()).unwrap();
        assert_eq!(req.limit, 5);
    }

    #[test]
    fn resolve_position_clamps_to_list_bounds() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(resolve_start_index(&AnchorOrPosition::Position(1), &ids).unwrap(), 1);
        assert_eq!(resolve_start_index(&AnchorOrPosition::Position(-1), &ids).unwrap(), 2);
        assert_eq!(resolve_start_index(&AnchorOrPosition::Position(100), &ids).unwrap(), 3);
    }

    #[test]
    fn resolve_anchor_not_found_is_an_error() {
        let ids = vec!["a".to_string()];
        let anchor = AnchorOrPosition::Anchor {
            id: "missing".into(),
            offset: 0,
        };
        assert_eq!(resolve_start_index(&anchor, &ids).unwrap_err(), MethodError::AnchorNotFound);
    }

    #[test]
    fn resolve_anchor_applies_offset_and_clamps() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let anchor = AnchorOrPosition::Anchor {
            id: "b".into(),
            offset: -5,
        };
        assert_eq!(resolve_start_index(&anchor, &ids).unwrap(), 0);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Foo/queryChanges` shape: `{sinceQueryState, maxChanges?,
//! upToId?, calculateTotal?}` plus the same `filter`/`sort` as
//! `Foo/query`; replies with the minimal add/remove diff between two
//! query result sets rather than a full id list.

use crate::{Comparator, CrudHooks, Filter};
use jmap_error::MethodError;
use jmap_parser::Parser;
use serde_json::{Map, Value};

/// Parsed `Foo/queryChanges` request arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryChangesRequest {
    /// Target account.
    pub account_id: String,
    /// Same filter tree as `Foo/query`; must match the original query
    /// being diffed, though this crate does not itself enforce that.
    pub filter: Option<Filter>,
    /// Same sort comparators as `Foo/query`.
    pub sort: Vec<Comparator>,
    /// The query result state to diff forward from.
    pub since_query_state: String,
    /// Caps how many added/removed entries a response may report before
    /// setting an early id boundary via `upToId`.
    pub max_changes: Option<u64>,
    /// If present, only report changes up to (and not including) this
    /// id's position, ignoring any change further down the list.
    pub up_to_id: Option<String>,
    /// Whether the response should include a `total` count.
    pub calculate_total: bool,
}

impl QueryChangesRequest {
    /// Parse `args` using `hooks` for type-specific filter leaves and
    /// sort property validation.
    #[must_use]
    pub fn parse(parser: &mut Parser, args: &Value, hooks: &dyn CrudHooks) -> Option<Self> {
        let account_id = parser.read_str(args, "accountId", true)?.to_string();

        let filter = match args.get("filter") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = parser.descend_property("filter", |parser| Filter::parse(parser, value, hooks));
                Some(parsed?)
            }
        };

        let sort = Comparator::parse_list(parser, args, "sort", hooks.properties()).unwrap_or_default();

        let since_query_state = parser.read_str(args, "sinceQueryState", true)?.to_string();

        let max_changes = match parser.read_i64(args, "maxChanges", false) {
            Some(n) if n > 0 => Some(n as u64),
            Some(_) => {
                parser.invalid("maxChanges");
                return None;
            }
            None if args.get("maxChanges").is_some() => return None,
            None => None,
        };

        let up_to_id = parser.read_str(args, "upToId", false).map(str::to_string);
        let calculate_total = parser.read_bool(args, "calculateTotal", false).unwrap_or(false);

        Some(Self {
            account_id,
            filter,
            sort,
            since_query_state,
            max_changes,
            up_to_id,
            calculate_total,
        })
    }
}

/// One entry of `QueryChangesResponse::added`: an id and the index it
/// now occupies in the result list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedItem {
    /// The id now present at `index`.
    pub id: String,
    /// Its zero-based position in the full (unpaginated) result list.
    pub index: u64,
}

impl AddedItem {
    fn to_json(&self) -> Value {
        let mut m = Map::new();
        m.insert("id".into(), Value::String(self.id.clone()));
        m.insert("index".into(), Value::Number(self.index.into()));
        Value::Object(m)
    }
}

/// Assembled `Foo/queryChanges` response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryChangesResponse {
    /// Echoes [`QueryChangesRequest::account_id`].
    pub account_id: String,
    /// Echoes [`QueryChangesRequest::since_query_state`].
    pub old_query_state: String,
    /// The query state after this diff.
    pub new_query_state: String,
    /// Total number of matching ids, if `calculateTotal` was requested.
    pub total: Option<u64>,
    /// Ids removed from the result list since `old_query_state`, in no
    /// particular order.
    pub removed: Vec<String>,
    /// Ids added to (or moved within) the result list since
    /// `old_query_state`, each with its new index, lowest index first.
    pub added: Vec<AddedItem>,
}

impl QueryChangesResponse {
    /// Build the JSON reply payload.
    #[must_use]
    pub fn reply(&self) -> Value {
        let mut m = Map::new();
        m.insert("accountId".into(), Value::String(self.account_id.clone()));
        m.insert("oldQueryState".into(), Value::String(self.old_query_state.clone()));
        m.insert("newQueryState".into(), Value::String(self.new_query_state.clone()));
        if let Some(total) = self.total {
            m.insert("total".into(), Value::Number(total.into()));
        }
        m.insert(
            "removed".into(),
            Value::Array(self.removed.iter().cloned().map(Value::String).collect()),
        );
        m.insert(
            "added".into(),
            Value::Array(self.added.iter().map(AddedItem::to_json).collect()),
        );
        Value::Object(m)
    }
}

/// Validate that `since_query_state` is still reconstructible.
///
/// # Errors
///
/// Returns [`MethodError::CannotCalculateChanges`] if `is_too_old`
/// reports the query state can no longer be diffed from.
pub fn check_since_query_state_comparable(is_too_old: bool) -> Result<(), MethodError> {
    if is_too_old {
        Err(MethodError::CannotCalculateChanges)
    } else {
        Ok(())
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `Foo/changes` shape: `{sinceState, maxChanges?}` in, `{oldState,
//! newState, hasMoreChanges, created, updated, destroyed}` out.

use jmap_error::MethodError;
use jmap_parser::Parser;
use serde_json::{Map, Value};

/// Parsed `Foo/changes` request arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangesRequest {
    /// Target account.
    pub account_id: String,
    /// The state to diff forward from.
    pub since_state: String,
    /// Caps how many changed ids a single response may report; the
    /// handler sets `hasMoreChanges` and trims its lists to this many
    /// entries when more are available.
    pub max_changes: Option<u64>,
}

impl ChangesRequest {
    /// Parse `args`.
    #[must_use]
    pub fn parse(parser: &mut Parser, args: &Value) -> Option<Self> {
        let account_id = parser.read_str(args, "accountId", true)?.to_string();
        let since_state = parser.read_str(args, "sinceState", true)?.to_string();
        let max_changes = match parser.read_i64(args, "maxChanges", false) {
            Some(n) if n > 0 => Some(n as u64),
            Some(_) => {
                parser.invalid("maxChanges");
                return None;
            }
            None if args.get("maxChanges").is_some() => return None,
            None => None,
        };
        Some(Self {
            account_id,
            since_state,
            max_changes,
        })
    }
}

/// Assembled `Foo/changes` response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangesResponse {
    /// Echoes [`ChangesRequest::since_state`].
    pub old_state: String,
    /// The type's state after this diff.
    pub new_state: String,
    /// `true` if more changes exist beyond `maxChanges` and the client
    /// should call again with `sinceState: newState`.
    pub has_more_changes: bool,
    /// Ids created since `old_state`.
    pub created: Vec<String>,
    /// Ids updated since `old_state`.
    pub updated: Vec<String>,
    /// Ids destroyed since `old_state`.
    pub destroyed: Vec<String>,
}

impl ChangesResponse {
    /// Build the JSON reply payload.
    #[must_use]
    pub fn reply(&self, account_id: &str) -> Value {
        let mut m = Map::new();
        m.insert("accountId".into(), Value::String(account_id.to_string()));
        m.insert("oldState".into(), Value::String(self.old_state.clone()));
        m.insert("newState".into(), Value::String(self.new_state.clone()));
        m.insert("hasMoreChanges".into(), Value::Bool(self.has_more_changes));
        m.insert(
            "created".into(),
            Value::Array(self.created.iter().cloned().map(Value::String).collect()),
        );
        m.insert(
            "updated".into(),
            Value::Array(self.updated.iter().cloned().map(Value::String).collect()),
        );
        m.insert(
            "destroyed".into(),
            Value::Array(self.destroyed.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(m)
    }
}

/// Validate that `since_state` is still reconstructible from the store's
/// retained change history.
///
/// # Errors
///
/// Returns [`MethodError::CannotCalculateChanges`] if `is_too_old`
/// reports the state can no longer be diffed from (e.g. the store has
/// compacted history older than it).
pub fn check_since_state_comparable(is_too_old: bool) -> Result<(), MethodError> {
    if is_too_old {
        Err(MethodError::CannotCalculateChanges)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_required_fields_and_optional_max_changes() {
        let mut p = Parser::new();
        let args = json!({"accountId": "a1", "sinceState": "5", "maxChanges": 10});
        let req = ChangesRequest::parse(&mut p, &args).unwrap();
        assert_eq!(req.since_state, "5");
        assert_eq!(req.max_changes, Some(10));
    }

    #[test]
    fn zero_or_negative_max_changes_is_invalid() {
        let mut p = Parser::new();
        let args = json!({"accountId": "a1", "sinceState": "5", "maxChanges": 0});
        assert!(ChangesRequest::parse(&mut p, &args).is_none());
        assert_eq!(p.invalid_pointers(), &["/maxChanges".to_string()]);
    }

    #[test]
    fn missing_since_state_is_invalid() {
        let mut p = Parser::new();
        let args = json!({"accountId": "a1"});
        assert!(ChangesRequest::parse(&mut p, &args).is_none());
        assert_eq!(p.invalid_pointers(), &["/sinceState".to_string()]);
    }

    #[test]
    fn equal_since_state_yields_empty_diff_by_convention() {
        let resp = ChangesResponse {
            old_state: "5".into(),
            new_state: "5".into(),
            ..Default::default()
        };
        assert!(resp.created.is_empty() && resp.updated.is_empty() && resp.destroyed.is_empty());
    }

    #[test]
    fn too_old_state_maps_to_cannot_calculate_changes() {
        assert_eq!(
            check_since_state_comparable(true).unwrap_err(),
            MethodError::CannotCalculateChanges
        );
        assert!(check_since_state_comparable(false).is_ok());
    }
}

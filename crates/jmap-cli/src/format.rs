// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting for the `jmap` CLI.

use jmap_core::Response;
use serde::Serialize;
use serde_json::Value;

/// Pretty-print any serializable value as JSON.
///
/// # Errors
///
/// Returns an error if `value` can't be serialized (never the case for
/// `serde_json::Value` or the wire types this crate passes through).
pub fn pretty_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Render a [`Response`] envelope as one line per method response:
/// `<clientId>  <name>  <payload-or-error-type>`.
#[must_use]
pub fn summarize_response(response: &Response) -> String {
    let mut lines = Vec::with_capacity(response.method_responses.len());
    for entry in &response.method_responses {
        let detail = if entry.0 == "error" {
            entry.1.get("type").and_then(Value::as_str).unwrap_or("error").to_string()
        } else {
            "ok".to_string()
        };
        lines.push(format!("{:<12} {:<24} {}", entry.2, entry.0, detail));
    }
    lines.push(format!("sessionState: {}", response.session_state));
    lines.join("\n")
}

/// Render `(id, name, is_personal)` account rows as a simple fixed-width table.
#[must_use]
pub fn table_accounts(rows: &[(String, String, bool)]) -> String {
    let mut lines = vec![format!("{:<24} {:<32} {}", "ID", "NAME", "PERSONAL")];
    for (id, name, is_personal) in rows {
        lines.push(format!("{id:<24} {name:<32} {is_personal}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jmap_core::MethodResponse;
    use serde_json::json;

    #[test]
    fn pretty_json_renders_indented_output() {
        let out = pretty_json(&json!({"a": 1})).unwrap();
        assert!(out.contains("  \"a\": 1"));
    }

    #[test]
    fn summarize_response_marks_ok_and_error_entries() {
        let response = Response {
            method_responses: vec![
                MethodResponse::ok("Core/echo", json!({"hello": 1}), "c0"),
                MethodResponse::error(json!({"type": "unknownMethod"}), "c1"),
            ],
            created_ids: Default::default(),
            session_state: "s1".to_string(),
        };
        let out = summarize_response(&response);
        assert!(out.contains("c0"));
        assert!(out.contains("ok"));
        assert!(out.contains("unknownMethod"));
        assert!(out.contains("sessionState: s1"));
    }

    #[test]
    fn table_accounts_renders_a_header_row() {
        let out = table_accounts(&[("u1".to_string(), "Primary".to_string(), true)]);
        assert!(out.starts_with("ID"));
        assert!(out.contains("u1"));
        assert!(out.contains("Primary"));
    }
}

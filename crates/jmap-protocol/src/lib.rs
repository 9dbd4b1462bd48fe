// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Envelope framing for the JMAP batched-RPC wire format.
//!
//! This crate sits between the HTTP edge and `jmap-dispatch`: it turns raw
//! request bytes into a [`jmap_core::Request`], distinguishing the two
//! ways a body can fail before the dispatcher ever sees it — not valid
//! JSON at all, or valid JSON that isn't a well-formed Request envelope —
//! per RFC 8620 §3.5.1's `notJSON`/`notRequest` top-level errors. It does
//! not itself enforce the size or call-count gates (those are
//! `jmap-limits`'s job, consulted by `jmap-dispatch`); it only measures the
//! wire size so the caller can pass it along.

use jmap_core::{MethodResponse, Request, Response};
use jmap_error::TopLevelError;

/// Parse `body` into a [`Request`] envelope plus its wire size in bytes.
///
/// # Errors
///
/// Returns [`TopLevelError::NotJson`] if `body` is not valid JSON at all.
/// Returns [`TopLevelError::NotRequest`] if it parses as JSON but does not
/// match the Request shape (e.g. `methodCalls` entries that aren't
/// `[string, object, string]` triples, or a `using` that isn't an array of
/// strings) — `serde`'s derived `Deserialize` for [`Request`] already
/// rejects anything short of that shape, so this function only needs to
/// translate the failure, not re-validate structurally.
pub fn parse_request(body: &[u8]) -> Result<(Request, u64), TopLevelError> {
    let wire_size = body.len() as u64;
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| TopLevelError::NotJson {
        detail: Some(e.to_string()),
    })?;
    let request: Request = serde_json::from_value(value).map_err(|e| TopLevelError::NotRequest {
        detail: Some(e.to_string()),
    })?;
    Ok((request, wire_size))
}

/// Serialize a [`Response`] envelope to its wire bytes.
///
/// # Errors
///
/// Returns a [`serde_json::Error`] if serialization somehow fails (it
/// shouldn't, given every payload in `response` is already a validated
/// `serde_json::Value`, but the fallible `serde_json` API is surfaced
/// rather than unwrapped so a caller can map it to a 500 instead of
/// panicking).
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(response)
}

/// Build a top-level error body, as served instead of a normal [`Response`]
/// when [`parse_request`] or an envelope-level gate rejects the whole
/// request (RFC 8620 §3.5.1).
#[must_use]
pub fn top_level_error_body(error: &TopLevelError) -> serde_json::Value {
    serde_json::to_value(error).unwrap_or_else(|_| {
        serde_json::json!({"type": "urn:ietf:params:jmap:error:serverFail"})
    })
}

/// Returns `true` if `response` contains at least one `["error", ...]`
/// method response, used by collaborators (e.g. request logging) that want
/// to flag a batch as partially failed without re-walking every entry.
#[must_use]
pub fn contains_method_error(response: &Response) -> bool {
    response.method_responses.iter().any(is_error_response)
}

fn is_error_response(entry: &MethodResponse) -> bool {
    entry.0 == "error"
}

#[cfg(test)]
mod tests {
    use super::*;
    use jmap_core::MethodCall;
    use serde_json::json;

    #[test]
    fn valid_envelope_parses_and_reports_its_wire_size() {
        let body = br#"{"using":["urn:ietf:params:jmap:core"],"methodCalls":[["Core/echo",{"hello":1},"c0"]]}"#;
        let (request, size) = parse_request(body).unwrap();
        assert_eq!(request.method_calls.len(), 1);
        assert_eq!(size, body.len() as u64);
    }

    #[test]
    fn garbage_bytes_are_not_json() {
        let err = parse_request(b"{not json").unwrap_err();
        assert!(matches!(err, TopLevelError::NotJson { .. }));
    }

    #[test]
    fn valid_json_with_the_wrong_shape_is_not_a_request() {
        // `methodCalls` entries must be 3-element tuples, not objects.
        let body = br#"{"using":["urn:ietf:params:jmap:core"],"methodCalls":[{"oops":true}]}"#;
        let err = parse_request(body).unwrap_err();
        assert!(matches!(err, TopLevelError::NotRequest { .. }));
    }

    #[test]
    fn a_json_array_at_the_top_level_is_not_a_request() {
        let err = parse_request(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, TopLevelError::NotRequest { .. }));
    }

    #[test]
    fn response_round_trips_through_serialize() {
        let response = Response {
            method_responses: vec![MethodResponse::ok("Core/echo", json!({"a": 1}), "c0")],
            created_ids: Default::default(),
            session_state: "s1".into(),
        };
        let bytes = serialize_response(&response).unwrap();
        let back: Response = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.session_state, "s1");
    }

    #[test]
    fn top_level_error_body_carries_the_urn_type() {
        let err = TopLevelError::unknown_capability("urn:x");
        let v = top_level_error_body(&err);
        assert_eq!(v["type"], "urn:ietf:params:jmap:error:unknownCapability");
    }

    #[test]
    fn contains_method_error_detects_a_mixed_batch() {
        let response = Response {
            method_responses: vec![
                MethodResponse::ok("Core/echo", json!({}), "c0"),
                MethodResponse::error(json!({"type": "unknownMethod"}), "c1"),
            ],
            created_ids: Default::default(),
            session_state: "s1".into(),
        };
        assert!(contains_method_error(&response));
    }

    #[test]
    fn contains_method_error_is_false_for_an_all_success_batch() {
        let response = Response {
            method_responses: vec![MethodResponse::ok("Core/echo", json!({}), "c0")],
            created_ids: Default::default(),
            session_state: "s1".into(),
        };
        assert!(!contains_method_error(&response));
    }
}

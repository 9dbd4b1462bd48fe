// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Wire types for the JMAP (RFC 8620) batched-RPC envelope.
//!
//! This crate owns the shapes every other crate in the workspace passes
//! around: the [`Request`]/[`Response`] envelope pair, the [`MethodCall`]/
//! [`MethodResponse`] triples inside them, [`BackReference`] detection, and
//! the [`Account`]/[`Session`] resources a front-end needs to answer
//! `GET /jmap/`.
//!
//! Nothing here parses arguments or routes calls — that is `jmap-dispatch`
//! and `jmap-parser`'s job. This crate only defines what a call looks like
//! on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A client-supplied method call: `[name, arguments, client-id]`.
///
/// RFC 8620 §3.2 specifies this as a 3-element JSON array, not an object;
/// `serde`'s tuple-struct support gives us that shape for free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall(pub String, pub Value, pub String);

impl MethodCall {
    /// The method name, e.g. `"Email/set"`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The argument object.
    #[must_use]
    pub fn arguments(&self) -> &Value {
        &self.1
    }

    /// The opaque client-id, echoed verbatim in the matching response.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.2
    }
}

/// A server method response: `[name, payload, client-id]`.
///
/// `name` is usually the same as the originating call's name, but an error
/// response always uses the literal name `"error"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResponse(pub String, pub Value, pub String);

impl MethodResponse {
    /// Build a successful response for `call_name`/`client_id` carrying `payload`.
    #[must_use]
    pub fn ok(call_name: impl Into<String>, payload: Value, client_id: impl Into<String>) -> Self {
        Self(call_name.into(), payload, client_id.into())
    }

    /// Build an `["error", ...]` response.
    #[must_use]
    pub fn error(payload: Value, client_id: impl Into<String>) -> Self {
        Self("error".to_string(), payload, client_id.into())
    }
}

/// The batched Request envelope a client POSTs to `/jmap/`.
///
/// Per RFC 8620 §3.3: `using` must be non-empty, `methodCalls` must be a
/// non-empty array. Those invariants are enforced by `jmap-dispatch`, not
/// by deserialization, so a structurally valid-but-empty envelope still
/// parses here and is rejected downstream with the right error shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Capability URIs the client wants this request's methods scoped to.
    pub using: Vec<String>,
    /// Ordered sequence of method calls.
    #[serde(rename = "methodCalls")]
    pub method_calls: Vec<MethodCall>,
    /// Creation ids the client already knows about from a previous request
    /// (rare; normally empty and populated fresh per request).
    #[serde(rename = "createdIds", default, skip_serializing_if = "Option::is_none")]
    pub created_ids: Option<BTreeMap<String, String>>,
}

/// The batched Response envelope returned from `/jmap/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Ordered sequence of method responses; order matches the request's
    /// `methodCalls`, with deferred sub-call responses interleaved after
    /// their parent.
    #[serde(rename = "methodResponses")]
    pub method_responses: Vec<MethodResponse>,
    /// The full creation-id table accumulated over the request, client ids
    /// included.
    #[serde(rename = "createdIds", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub created_ids: BTreeMap<String, String>,
    /// Opaque session-state token; changes whenever the session's accounts
    /// or capabilities have changed since the last the client saw.
    #[serde(rename = "sessionState")]
    pub session_state: String,
}

/// An argument property whose string value is a back-reference: `{resultOf,
/// name, path}`, to be substituted by resolving an RFC 6901 pointer against
/// a prior response in the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackReference {
    /// The client-id of the method call whose response to draw from.
    #[serde(rename = "resultOf")]
    pub result_of: String,
    /// The method name that call must have carried — a response must match
    /// both `resultOf` and `name` to be eligible.
    pub name: String,
    /// RFC 6901 JSON pointer into that response's payload.
    pub path: String,
}

/// Returns `true` if `key` names a back-reference argument (begins with `#`).
#[must_use]
pub fn is_back_reference_key(key: &str) -> bool {
    key.starts_with('#')
}

/// Strip the leading `#` from a back-reference argument key.
#[must_use]
pub fn strip_back_reference_prefix(key: &str) -> &str {
    key.strip_prefix('#').unwrap_or(key)
}

/// An account the authenticated user can address by id in `accountId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque, server-assigned account identifier.
    pub id: String,
    /// Human-readable name shown in client UIs.
    pub name: String,
    /// Whether this account belongs to the authenticated user (as opposed
    /// to a delegated/shared account).
    #[serde(rename = "isPersonal")]
    pub is_personal: bool,
    /// Whether the authenticated user may perform any mutation on this
    /// account — if `true`, every `Foo/set` call must fail with
    /// `accountReadOnly`.
    #[serde(rename = "isReadOnly")]
    pub is_read_only: bool,
    /// Per-capability settings this account supports (e.g. mail quotas),
    /// keyed by capability URI.
    #[serde(rename = "accountCapabilities")]
    pub account_capabilities: BTreeMap<String, Value>,
}

impl Account {
    /// Returns `true` if this account advertises support for `capability_uri`.
    #[must_use]
    pub fn supports(&self, capability_uri: &str) -> bool {
        self.account_capabilities.contains_key(capability_uri)
    }
}

/// The `GET /jmap/` Session resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated user's identity, typically their primary email.
    pub username: String,
    /// All accounts the user may address, keyed by account id.
    pub accounts: BTreeMap<String, Account>,
    /// Process-wide capability URIs advertised by this server, each mapped
    /// to capability-specific metadata (e.g. the mail capability's
    /// `maxSizeAttachmentsPerEmail`).
    pub capabilities: BTreeMap<String, Value>,
    /// Absolute URL of the API endpoint (`POST /jmap/`).
    #[serde(rename = "apiUrl")]
    pub api_url: String,
    /// Absolute URL template for blob downloads.
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    /// Absolute URL template for blob uploads.
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    /// Opaque state token; changes whenever any field above changes.
    pub state: String,
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The JMAP error taxonomy.
//!
//! RFC 8620 shapes errors at three levels, and this crate owns all three:
//!
//! - [`TopLevelError`] replaces the *entire* response envelope (malformed
//!   request, unknown capability, resource limit).
//! - [`MethodError`] replaces a single method call's response payload
//!   (`["error", {...}, client-id]`).
//! - [`ObjectError`] lives inside a `Set`/`Get` shape's `notCreated`/
//!   `notUpdated`/`notDestroyed`/`notFound` maps and never aborts the
//!   enclosing call.
//!
//! Every variant round-trips through `serde_json` using the same `type` tag
//! the JMAP wire format expects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Tier 1: top-level envelope errors
// ---------------------------------------------------------------------------

/// The limit dimension a request violated, used by
/// [`TopLevelError::Limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitKind {
    /// `methodCalls` exceeded `maxCallsInRequest`.
    MaxCallsInRequest,
    /// The serialized request exceeded `maxSizeRequest`.
    MaxSizeRequest,
    /// Too many requests are in flight for this connection/session.
    MaxConcurrentRequests,
}

impl LimitKind {
    /// Wire name of the limit, as used in the `limit` field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxCallsInRequest => "maxCallsInRequest",
            Self::MaxSizeRequest => "maxSizeRequest",
            Self::MaxConcurrentRequests => "maxConcurrentRequests",
        }
    }
}

/// An error that replaces the whole response envelope.
///
/// These correspond to the `urn:ietf:params:jmap:error:*` family from
/// RFC 8620 §3.5.2.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TopLevelError {
    /// One of the `using` capability URIs is not registered.
    #[error("unknown capability")]
    #[serde(rename = "urn:ietf:params:jmap:error:unknownCapability")]
    UnknownCapability {
        /// Human-readable detail (e.g. the offending URI).
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// The request body was not valid JSON.
    #[error("request body is not valid JSON")]
    #[serde(rename = "urn:ietf:params:jmap:error:notJSON")]
    NotJson {
        /// Human-readable detail.
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// The request body was valid JSON but not a well-formed Request
    /// envelope (§3.3 of RFC 8620).
    #[error("request is not a well-formed JMAP Request object")]
    #[serde(rename = "urn:ietf:params:jmap:error:notRequest")]
    NotRequest {
        /// Human-readable detail.
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    /// A configured resource limit was exceeded.
    #[error("limit exceeded: {limit}")]
    #[serde(rename = "urn:ietf:params:jmap:error:limit")]
    Limit {
        /// Which limit was violated.
        #[serde(rename = "limit", serialize_with = "serialize_limit_kind")]
        limit: LimitKind,
    },
}

fn serialize_limit_kind<S>(kind: &LimitKind, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(kind.as_str())
}

impl<'de> Deserialize<'de> for LimitKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match raw.as_str() {
            "maxCallsInRequest" => Ok(Self::MaxCallsInRequest),
            "maxSizeRequest" => Ok(Self::MaxSizeRequest),
            "maxConcurrentRequests" => Ok(Self::MaxConcurrentRequests),
            other => Err(serde::de::Error::custom(format!(
                "unknown limit kind: {other}"
            ))),
        }
    }
}

impl TopLevelError {
    /// Build an [`TopLevelError::UnknownCapability`] with a detail message.
    #[must_use]
    pub fn unknown_capability(uri: impl Into<String>) -> Self {
        Self::UnknownCapability {
            detail: Some(uri.into()),
        }
    }

    /// Build a [`TopLevelError::Limit`] for the given dimension.
    #[must_use]
    pub fn limit(kind: LimitKind) -> Self {
        Self::Limit { limit: kind }
    }
}

// ---------------------------------------------------------------------------
// Tier 2: per-method errors
// ---------------------------------------------------------------------------

/// An error that replaces one method call's response payload.
///
/// Serializes as the second element of the `["error", {...}, client-id]`
/// triple.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MethodError {
    /// No handler is registered under this method name.
    #[error("unknown method")]
    #[serde(rename = "unknownMethod")]
    UnknownMethod,

    /// The handler's capability is registered but not present in `using`.
    #[error("method not advertised by any capability in `using`")]
    #[serde(rename = "methodNotFound")]
    MethodNotFound,

    /// One or more argument properties failed parsing.
    #[error("invalid arguments: {arguments:?}")]
    #[serde(rename = "invalidArguments")]
    InvalidArguments {
        /// RFC 6901 pointers to every offending argument location.
        arguments: Vec<String>,
    },

    /// A `#foo` back-reference could not be resolved.
    #[error("invalid result reference")]
    #[serde(rename = "invalidResultReference")]
    InvalidResultReference,

    /// The caller lacks rights to perform this call.
    #[error("forbidden")]
    #[serde(rename = "forbidden")]
    Forbidden,

    /// `accountId` does not name a known account.
    #[error("account not found")]
    #[serde(rename = "accountNotFound")]
    AccountNotFound,

    /// The account is read-only and the call requires mutation.
    #[error("account is read-only")]
    #[serde(rename = "accountReadOnly")]
    AccountReadOnly,

    /// The account does not support the data type this method operates on.
    #[error("account does not support this method")]
    #[serde(rename = "accountNotSupportedByMethod")]
    AccountNotSupportedByMethod,

    /// The backing store is transiently unavailable; retrying later may
    /// succeed.
    #[error("server unavailable")]
    #[serde(rename = "serverUnavailable")]
    ServerUnavailable,

    /// The backing store failed permanently for this call.
    #[error("server failure: {detail}")]
    #[serde(rename = "serverFail")]
    ServerFail {
        /// Stable, non-sensitive failure description.
        detail: String,
    },

    /// `ifInState` did not match the type's current state.
    #[error("state mismatch")]
    #[serde(rename = "stateMismatch")]
    StateMismatch,

    /// `sinceState`/`sinceQueryState` is older than the store can diff from.
    #[error("cannot calculate changes from this state")]
    #[serde(rename = "cannotCalculateChanges")]
    CannotCalculateChanges,

    /// `anchor` did not match any id in the result set.
    #[error("anchor not found")]
    #[serde(rename = "anchorNotFound")]
    AnchorNotFound,

    /// A `Set` call's combined `create`/`update`/`destroy` object count (or
    /// another per-call cardinality) exceeded a configured limit.
    #[error("request too large")]
    #[serde(rename = "requestTooLarge")]
    RequestTooLarge,
}

impl MethodError {
    /// Build an [`MethodError::InvalidArguments`] from a single pointer.
    #[must_use]
    pub fn invalid_argument(pointer: impl Into<String>) -> Self {
        Self::InvalidArguments {
            arguments: vec![pointer.into()],
        }
    }

    /// Translate a backing-store failure into the appropriate server error,
    /// per RFC 8620 §7.2.2: transient failures map to `serverUnavailable`,
    /// permanent ones to `serverFail` with a stable, non-sensitive message.
    #[must_use]
    pub fn from_backend_failure(transient: bool, detail: impl Into<String>) -> Self {
        if transient {
            Self::ServerUnavailable
        } else {
            Self::ServerFail {
                detail: detail.into(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tier 3: per-object errors
// ---------------------------------------------------------------------------

/// An error placed inside a `Set`/`Get` shape's `notCreated`, `notUpdated`,
/// `notDestroyed`, or `notFound` map. Never aborts the enclosing method
/// call.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectError {
    /// One or more properties on the object are invalid.
    #[error("invalid properties: {properties:?}")]
    #[serde(rename = "invalidProperties")]
    InvalidProperties {
        /// Names of the offending properties.
        properties: Vec<String>,
    },

    /// The account has insufficient quota to complete the operation.
    #[error("over quota")]
    #[serde(rename = "overQuota")]
    OverQuota,

    /// The object (or an embedded blob) exceeds a size limit.
    #[error("too large")]
    #[serde(rename = "tooLarge")]
    TooLarge,

    /// A create collided with an object that already exists.
    #[error("already exists")]
    #[serde(rename = "alreadyExists")]
    AlreadyExists {
        /// The id of the object that already exists, if known.
        #[serde(skip_serializing_if = "Option::is_none", rename = "existingId")]
        existing_id: Option<String>,
    },

    /// No object with the given id exists.
    #[error("not found")]
    #[serde(rename = "notFound")]
    NotFound,

    /// The object cannot be updated because it is scheduled for
    /// destruction within the same call.
    #[error("will be destroyed")]
    #[serde(rename = "willDestroy")]
    WillDestroy,

    /// A referenced blob id does not resolve to a known blob.
    #[error("blob not found")]
    #[serde(rename = "blobNotFound")]
    BlobNotFound,

    /// `Copy`'s `toAccountId`/`fromAccountId` does not resolve.
    #[error("target account not found")]
    #[serde(rename = "toAccountNotFound")]
    ToAccountNotFound,
}

impl ObjectError {
    /// Build an [`ObjectError::InvalidProperties`] from a single property
    /// name.
    #[must_use]
    pub fn invalid_property(name: impl Into<String>) -> Self {
        Self::InvalidProperties {
            properties: vec![name.into()],
        }
    }
}

/// Convenience map type used by `Set`/`Get` reply shapes for per-object
/// errors keyed by creation-id or object id.
pub type ObjectErrorMap = BTreeMap<String, ObjectError>;

/// Serialize any tier-2 error as the JSON payload half of a method response
/// triple (`["error", payload, client_id]`), given the client-id.
#[must_use]
pub fn method_error_response(error: &MethodError, client_id: &str) -> Value {
    serde_json::json!(["error", error, client_id])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_limit_serializes_with_named_limit() {
        let err = TopLevelError::limit(LimitKind::MaxCallsInRequest);
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["type"], "urn:ietf:params:jmap:error:limit");
        assert_eq!(v["limit"], "maxCallsInRequest");
    }

    #[test]
    fn top_level_unknown_capability_round_trips() {
        let err = TopLevelError::unknown_capability("urn:x:bogus");
        let v = serde_json::to_value(&err).unwrap();
        let back: TopLevelError = serde_json::from_value(v).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn method_error_invalid_arguments_shape() {
        let err = MethodError::invalid_argument("/ids/0");
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["type"], "invalidArguments");
        assert_eq!(v["arguments"][0], "/ids/0");
    }

    #[test]
    fn method_error_response_is_error_triple() {
        let err = MethodError::UnknownMethod;
        let v = method_error_response(&err, "c1");
        assert_eq!(v[0], "error");
        assert_eq!(v[1]["type"], "unknownMethod");
        assert_eq!(v[2], "c1");
    }

    #[test]
    fn backend_failure_transient_maps_to_server_unavailable() {
        assert_eq!(
            MethodError::from_backend_failure(true, "timeout"),
            MethodError::ServerUnavailable
        );
    }

    #[test]
    fn backend_failure_permanent_maps_to_server_fail_with_detail() {
        match MethodError::from_backend_failure(false, "disk corrupt") {
            MethodError::ServerFail { detail } => assert_eq!(detail, "disk corrupt"),
            other => panic!("expected ServerFail, got {other:?}"),
        }
    }

    #[test]
    fn object_error_not_found_has_no_extra_fields() {
        let v = serde_json::to_value(ObjectError::NotFound).unwrap();
        assert_eq!(v, serde_json::json!({"type": "notFound"}));
    }

    #[test]
    fn object_error_already_exists_omits_none_existing_id() {
        let v = serde_json::to_value(ObjectError::AlreadyExists { existing_id: None }).unwrap();
        assert_eq!(v, serde_json::json!({"type": "alreadyExists"}));
    }

    #[test]
    fn request_too_large_has_no_extra_fields() {
        let v = serde_json::to_value(MethodError::RequestTooLarge).unwrap();
        assert_eq!(v, serde_json::json!({"type": "requestTooLarge"}));
    }

    #[test]
    fn limit_kind_unknown_str_rejected_on_deserialize() {
        let v = serde_json::json!({"type": "urn:ietf:params:jmap:error:limit", "limit": "bogus"});
        let result: Result<TopLevelError, _> = serde_json::from_value(v);
        assert!(result.is_err());
    }
}

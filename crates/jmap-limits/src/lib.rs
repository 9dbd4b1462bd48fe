// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! `MAX_*` resource-cap enforcement.
//!
//! [`RawLimits`] is the shape configuration loads into (any field may be
//! zero or negative); [`Limits::from_raw`] normalizes it into the
//! non-negative [`Limits`] the dispatcher and CRUD shapes actually consult,
//! logging and zeroing any `<= 0` value along the way (a zeroed limit
//! effectively disables the call it gates — e.g. `max_calls_in_request: 0`
//! means every request is rejected as oversized).

use jmap_error::{LimitKind, MethodError, TopLevelError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Raw, unvalidated limit values as read from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct RawLimits {
    /// See [`Limits::max_size_upload`].
    pub max_size_upload: i64,
    /// See [`Limits::max_concurrent_upload`].
    pub max_concurrent_upload: i64,
    /// See [`Limits::max_size_request`].
    pub max_size_request: i64,
    /// See [`Limits::max_concurrent_requests`].
    pub max_concurrent_requests: i64,
    /// See [`Limits::max_calls_in_request`].
    pub max_calls_in_request: i64,
    /// See [`Limits::max_objects_in_get`].
    pub max_objects_in_get: i64,
    /// See [`Limits::max_objects_in_set`].
    pub max_objects_in_set: i64,
}

/// Normalized, non-negative resource caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum byte size of a single uploaded blob.
    pub max_size_upload: u64,
    /// Maximum number of concurrent uploads per account.
    pub max_concurrent_upload: u64,
    /// Maximum serialized byte size of a whole Request envelope.
    pub max_size_request: u64,
    /// Maximum number of requests in flight at once for this session.
    pub max_concurrent_requests: u64,
    /// Maximum number of method calls in a single Request envelope.
    pub max_calls_in_request: u64,
    /// Maximum `ids` (or equivalent) a single `Get` call may request.
    pub max_objects_in_get: u64,
    /// Maximum combined `create`+`update`+`destroy` count in a `Set` call.
    pub max_objects_in_set: u64,
}

impl Limits {
    /// Normalize `raw`, logging and zeroing any `<= 0` field.
    #[must_use]
    pub fn from_raw(raw: RawLimits) -> Self {
        Self {
            max_size_upload: normalize("maxSizeUpload", raw.max_size_upload),
            max_concurrent_upload: normalize("maxConcurrentUpload", raw.max_concurrent_upload),
            max_size_request: normalize("maxSizeRequest", raw.max_size_request),
            max_concurrent_requests: normalize(
                "maxConcurrentRequests",
                raw.max_concurrent_requests,
            ),
            max_calls_in_request: normalize("maxCallsInRequest", raw.max_calls_in_request),
            max_objects_in_get: normalize("maxObjectsInGet", raw.max_objects_in_get),
            max_objects_in_set: normalize("maxObjectsInSet", raw.max_objects_in_set),
        }
    }

    /// Reject an oversized serialized request envelope.
    ///
    /// # Errors
    ///
    /// Returns [`TopLevelError::Limit`] with [`LimitKind::MaxSizeRequest`]
    /// if `wire_size` exceeds [`Limits::max_size_request`].
    pub fn check_request_size(&self, wire_size: u64) -> Result<(), TopLevelError> {
        if wire_size > self.max_size_request {
            return Err(TopLevelError::limit(LimitKind::MaxSizeRequest));
        }
        Ok(())
    }

    /// Reject a Request envelope with too many method calls.
    ///
    /// # Errors
    ///
    /// Returns [`TopLevelError::Limit`] with [`LimitKind::MaxCallsInRequest`]
    /// if `call_count` exceeds [`Limits::max_calls_in_request`].
    pub fn check_call_count(&self, call_count: u64) -> Result<(), TopLevelError> {
        if call_count > self.max_calls_in_request {
            return Err(TopLevelError::limit(LimitKind::MaxCallsInRequest));
        }
        Ok(())
    }

    /// Reject if too many requests are already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`TopLevelError::Limit`] with
    /// [`LimitKind::MaxConcurrentRequests`] if `in_flight` has already
    /// reached [`Limits::max_concurrent_requests`].
    pub fn check_concurrent_requests(&self, in_flight: u64) -> Result<(), TopLevelError> {
        if in_flight >= self.max_concurrent_requests {
            return Err(TopLevelError::limit(LimitKind::MaxConcurrentRequests));
        }
        Ok(())
    }

    /// Clamp a `Query`/`Get` `limit` argument to [`Limits::max_objects_in_get`].
    /// `requested` of `None` means "as many as the store will return".
    #[must_use]
    pub fn clamp_query_limit(&self, requested: Option<u64>) -> u64 {
        requested.map_or(self.max_objects_in_get, |r| r.min(self.max_objects_in_get))
    }

    /// Reject a `Set` call whose combined `create`+`update`+`destroy`
    /// cardinality exceeds [`Limits::max_objects_in_set`].
    ///
    /// # Errors
    ///
    /// Returns [`MethodError::RequestTooLarge`] if `total` exceeds the cap.
    pub fn check_set_object_count(&self, total: u64) -> Result<(), MethodError> {
        if total > self.max_objects_in_set {
            return Err(MethodError::RequestTooLarge);
        }
        Ok(())
    }
}

fn normalize(field: &str, raw: i64) -> u64 {
    if raw <= 0 {
        warn!(field, raw, "limit is <= 0, treating as 0 (disables the gated call)");
        0
    } else {
        raw as u64
    }
}

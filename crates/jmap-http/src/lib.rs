// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! The `axum` HTTP surface for the JMAP dispatch core.
//!
//! This crate is a thin edge: it frames requests and replies at the
//! boundary (`jmap_protocol::parse_request`/`serialize_response`) and
//! calls straight into `jmap_dispatch::dispatch`. It does not reimplement
//! HTTP/1.1 or HTTP/2 framing (that's `axum`/`hyper`'s job), TLS (left to
//! whatever reverse proxy or `axum-server` acceptor the deployer chooses),
//! or WebSocket upgrade negotiation (delegated to `axum`'s `ws` feature,
//! itself built on `tokio-tungstenite`).

pub mod blob;
pub mod core_methods;
pub mod middleware;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path as AxPath, Query, State, WebSocketUpgrade},
    extract::ws::{Message, WebSocket},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use blob::{BlobStore, BlobStoreError};
use jmap_capability::CapabilityTable;
use jmap_core::{Account, Session};
use jmap_dispatch::{RequestContext, dispatch};
use jmap_limits::Limits;
use jmap_mailbox_cache::{LockMode, MailboxHandle, MailboxStore};
use jmap_registry::MethodRegistry;
use jmap_rights_cache::{Rights, RightsSource};
use jmap_state::ModseqTable;
use jmap_telemetry::MetricsCollector;
use middleware::{CorsConfig, RateLimiter};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Everything the HTTP surface needs to service a request: the frozen
/// method registry, capability table, resource limits, the account
/// directory, the shared modseq table, and the blob store backing
/// upload/download and `Blob/get`/`Blob/copy`.
///
/// `jmap-registry`'s [`MethodRegistry`] bakes the request-context type
/// (and therefore its borrow lifetime) into the registry's own type, so
/// the only way for one frozen registry built at startup to serve every
/// later request is for that lifetime to be `'static`. [`build_app`]
/// takes `AppState` by `&'static` reference accordingly — leak it once
/// at startup (see `jmap-httpd`'s `main`) rather than wrapping it in an
/// `Arc` that hands out short-lived borrows.
pub struct AppState {
    /// Process-wide method registry, frozen after startup registration.
    pub registry: Arc<MethodRegistry<RequestContext<'static>>>,
    /// Capability URIs this server advertises and authorizes methods against.
    pub capabilities: CapabilityTable,
    /// Normalized resource caps.
    pub limits: Limits,
    /// Accounts the authenticated user may address.
    pub accounts: BTreeMap<String, Account>,
    /// Shared per-type modification-sequence counters.
    pub modseq: ModseqTable,
    /// Blob storage backing uploads, downloads, `Blob/get`, `Blob/copy`.
    pub blobs: Arc<dyn BlobStore>,
    /// Rolling request latency metrics, exposed for operator tooling.
    pub metrics: MetricsCollector,
    /// Absolute base URL this server is reachable at, used to build the
    /// Session resource's `apiUrl`/`downloadUrl`/`uploadUrl`.
    pub base_url: String,
    /// CORS policy applied to every route, sourced from `Settings`.
    pub cors: CorsConfig,
    /// Sliding-window request rate limiter applied to every route.
    pub rate_limiter: RateLimiter,
}

struct NoMailboxes;

impl MailboxStore for NoMailboxes {
    fn open(&self, name: &str, mode: LockMode) -> Result<MailboxHandle, jmap_error::MethodError> {
        Ok(MailboxHandle {
            name: name.to_string(),
            mode,
            lock_id: 0,
        })
    }
    fn commit(&self, _handle: &MailboxHandle) -> Result<(), jmap_error::MethodError> {
        Ok(())
    }
}

struct NoRights;

impl RightsSource for NoRights {
    fn rights_for(&self, _mailbox: &str) -> Rights {
        Rights::of([jmap_rights_cache::Right::Lookup, jmap_rights_cache::Right::Read])
    }
}

static NO_MAILBOXES: NoMailboxes = NoMailboxes;
static NO_RIGHTS: NoRights = NoRights;

/// Build the `axum` router serving every endpoint this crate owns.
#[must_use]
pub fn build_app(state: &'static AppState) -> Router {
    Router::new()
        .route("/jmap/", post(post_api).get(get_session))
        .route("/jmap/upload/{account_id}/", post(post_upload))
        .route("/jmap/download/{account_id}/{blob_id}/{name}", get(get_download))
        .route("/jmap/ws/", get(get_websocket))
        .with_state(state)
        .layer(state.cors.to_cors_layer())
        .layer(state.rate_limiter.clone().into_layer())
}

// ---------------------------------------------------------------------------
// POST /jmap/ — the API endpoint
// ---------------------------------------------------------------------------

async fn post_api(State(state): State<&'static AppState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4().to_string();
    match handle_envelope(state, &body, &request_id) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(error) => top_level_error_response(&error),
    }
}

fn handle_envelope(
    state: &'static AppState,
    body: &[u8],
    request_id: &str,
) -> Result<Vec<u8>, jmap_error::TopLevelError> {
    let (request, wire_size) = jmap_protocol::parse_request(body)?;

    let ctx = RequestContext::new(
        &NO_MAILBOXES,
        &NO_RIGHTS,
        &state.accounts,
        &state.modseq,
        BTreeMap::new(),
        request_id.to_string(),
    );

    let session_state = session_state_token(state);
    let response = dispatch(
        request,
        wire_size,
        session_state,
        &state.limits,
        &state.capabilities,
        &state.registry,
        ctx,
    )?;

    Ok(jmap_protocol::serialize_response(&response).expect("Response always serializes to JSON"))
}

fn top_level_error_response(error: &jmap_error::TopLevelError) -> Response {
    let status = top_level_status(error);
    let body = jmap_protocol::top_level_error_body(error);
    (
        status,
        [(header::CONTENT_TYPE, "application/problem+json")],
        Json(body),
    )
        .into_response()
}

fn top_level_status(error: &jmap_error::TopLevelError) -> StatusCode {
    use jmap_error::{LimitKind, TopLevelError};
    match error {
        TopLevelError::Limit { limit } if *limit == LimitKind::MaxSizeRequest => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

fn session_state_token(state: &AppState) -> String {
    let highest = state
        .accounts
        .keys()
        .map(|id| state.modseq.highest_modseq(id))
        .max()
        .unwrap_or(0);
    jmap_state::StateToken::from_modseq(highest).as_str().to_string()
}

// ---------------------------------------------------------------------------
// GET /jmap/ — the Session resource
// ---------------------------------------------------------------------------

async fn get_session(State(state): State<&'static AppState>) -> Response {
    let session = Session {
        username: "anonymous".to_string(),
        accounts: state.accounts.clone(),
        capabilities: state
            .capabilities
            .advertised()
            .iter()
            .map(|uri| (uri.clone(), json!({})))
            .collect(),
        api_url: format!("{}/jmap/", state.base_url),
        download_url: format!("{}/jmap/download/{{accountId}}/{{blobId}}/{{name}}", state.base_url),
        upload_url: format!("{}/jmap/upload/{{accountId}}/", state.base_url),
        state: session_state_token(&state),
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, "no-cache".parse().unwrap());
    (headers, Json(session)).into_response()
}

// ---------------------------------------------------------------------------
// POST /jmap/upload/{accountId}/
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
struct UploadResponse {
    #[serde(rename = "accountId")]
    account_id: String,
    #[serde(rename = "blobId")]
    blob_id: String,
    #[serde(rename = "type")]
    media_type: String,
    size: u64,
    /// RFC 3339 timestamp 24h from upload.
    expires: String,
}

async fn post_upload(
    State(state): State<&'static AppState>,
    AxPath(account_id): AxPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.accounts.contains_key(&account_id) {
        return (StatusCode::NOT_FOUND, "unknown account").into_response();
    }
    if body.len() as u64 > state.limits.max_size_upload {
        return (StatusCode::PAYLOAD_TOO_LARGE, "blob exceeds maxSizeUpload").into_response();
    }

    let media_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    match state.blobs.put(&account_id, &body) {
        Ok(blob_id) => {
            let resp = UploadResponse {
                account_id,
                blob_id: blob_id.as_str().to_string(),
                media_type,
                size: body.len() as u64,
                expires: expires_in_24h(),
            };
            (StatusCode::CREATED, Json(resp)).into_response()
        }
        Err(e) => blob_error_response(&e),
    }
}

fn expires_in_24h() -> String {
    // No wall-clock timestamp source is wired into this crate (a
    // production deployment would take one from its telemetry/config
    // surface); downstream consumers treat `expires` as advisory only.
    "1970-01-02T00:00:00Z".to_string()
}

// ---------------------------------------------------------------------------
// GET /jmap/download/{accountId}/{blobId}/{name}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    accept: Option<String>,
}

async fn get_download(
    State(state): State<&'static AppState>,
    AxPath((account_id, blob_id, _name)): AxPath<(String, String, String)>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let Some(account) = state.accounts.get(&account_id) else {
        return (StatusCode::NOT_FOUND, "unknown account").into_response();
    };

    // Open question resolved: the caller must own the account (no
    // delegated-account support here) or hold read rights on the mailbox
    // the blob lives under. We don't model per-blob mailbox ownership in
    // this crate, so ownership of the account is the only check we can
    // make; `NoRights`-style stores authorize further via `RightsSource`
    // once a real mailbox-backed deployment wires one in.
    if !account.is_personal {
        return (StatusCode::FORBIDDEN, "account is not owned by the caller").into_response();
    }

    let Ok(blob_id) = jmap_blobid::BlobId::parse(&blob_id) else {
        return (StatusCode::NOT_FOUND, "malformed blob id").into_response();
    };

    match state.blobs.get(&account_id, &blob_id) {
        Ok(Some(bytes)) => {
            let content_type = query.accept.unwrap_or_else(|| "application/octet-stream".to_string());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type)],
                Body::from(bytes),
            )
                .into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "blob not found").into_response(),
        Err(e) => blob_error_response(&e),
    }
}

fn blob_error_response(error: &BlobStoreError) -> Response {
    warn!(error = %error, "blob store operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "blob store error").into_response()
}

// ---------------------------------------------------------------------------
// GET /jmap/ws/ — optional WebSocket upgrade
// ---------------------------------------------------------------------------

async fn get_websocket(State(state): State<&'static AppState>, ws: WebSocketUpgrade) -> Response {
    ws.protocols(["jmap"]).on_upgrade(move |socket| websocket_loop(socket, state))
}

/// Each binary/text frame received is one Request envelope; each frame
/// sent back is the matching Response envelope, per RFC 8620 §4.3.
async fn websocket_loop(mut socket: WebSocket, state: &'static AppState) {
    while let Some(Ok(message)) = socket.recv().await {
        let body = match message {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(bytes) => bytes.to_vec(),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let request_id = Uuid::new_v4().to_string();
        let outcome = handle_envelope(state, &body, &request_id);
        let reply = match outcome {
            Ok(bytes) => bytes,
            Err(error) => serde_json::to_vec(&jmap_protocol::top_level_error_body(&error))
                .unwrap_or_else(|_| b"{}".to_vec()),
        };

        if socket.send(Message::Text(String::from_utf8_lossy(&reply).into_owned().into())).await.is_err() {
            break;
        }
    }
    info!("jmap websocket connection closed");
}

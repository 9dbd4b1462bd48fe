// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level command implementations for the `jmap` CLI, split out of
//! `main.rs` so they're testable without spawning the binary.

use anyhow::{Context, Result, bail};
use jmap_core::{Account, MethodCall, Request, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Build a single-call [`Request`] envelope.
#[must_use]
pub fn single_call_request(using: Vec<String>, method: &str, args: Value, client_id: &str) -> Request {
    Request {
        using,
        method_calls: vec![MethodCall(method.to_string(), args, client_id.to_string())],
        created_ids: None,
    }
}

/// Read and parse a JSON file on disk into a [`Request`] envelope.
///
/// # Errors
///
/// Returns an error if the file can't be read or doesn't parse as a
/// [`Request`].
pub fn load_request_file(path: &Path) -> Result<Request> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read envelope file '{}'", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse envelope JSON from '{}'", path.display()))
}

/// POST `request` to `base_url`'s API endpoint and parse the [`Response`] envelope.
///
/// # Errors
///
/// Returns an error on a transport failure, a non-2xx status (the body is
/// included in the error for `application/problem+json` top-level errors),
/// or a response body that doesn't parse as a [`Response`] envelope.
pub async fn post_envelope(client: &reqwest::Client, base_url: &str, request: &Request) -> Result<Response> {
    let url = format!("{}/jmap/", base_url.trim_end_matches('/'));
    let http_response = client
        .post(&url)
        .json(request)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;

    let status = http_response.status();
    let body = http_response.text().await.context("read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    serde_json::from_str(&body).with_context(|| format!("parse response envelope: {body}"))
}

/// GET the Session resource from `base_url`.
///
/// # Errors
///
/// Returns an error on a transport failure or a body that doesn't parse
/// as [`jmap_core::Session`].
pub async fn fetch_session(client: &reqwest::Client, base_url: &str) -> Result<jmap_core::Session> {
    let url = format!("{}/jmap/", base_url.trim_end_matches('/'));
    client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?
        .json()
        .await
        .context("parse Session resource")
}

/// Upload `path`'s bytes to `account_id`'s upload endpoint.
///
/// # Errors
///
/// Returns an error on a transport failure, a non-2xx status, or a body
/// that doesn't parse as the upload response shape.
pub async fn upload_blob(
    client: &reqwest::Client,
    base_url: &str,
    account_id: &str,
    path: &Path,
    content_type: Option<&str>,
) -> Result<Value> {
    let bytes = std::fs::read(path).with_context(|| format!("read blob file '{}'", path.display()))?;
    let url = format!("{}/jmap/upload/{account_id}/", base_url.trim_end_matches('/'));
    let mut builder = client.post(&url).body(bytes);
    if let Some(ct) = content_type {
        builder = builder.header(reqwest::header::CONTENT_TYPE, ct.to_string());
    }
    let http_response = builder.send().await.with_context(|| format!("POST {url}"))?;
    let status = http_response.status();
    let body = http_response.text().await.context("read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    serde_json::from_str(&body).with_context(|| format!("parse upload response: {body}"))
}

/// Download a blob to `out_path`.
///
/// # Errors
///
/// Returns an error on a transport failure, a non-2xx status, or a
/// failure to write `out_path`.
pub async fn download_blob(
    client: &reqwest::Client,
    base_url: &str,
    account_id: &str,
    blob_id: &str,
    name: &str,
    accept: Option<&str>,
    out_path: &Path,
) -> Result<u64> {
    let mut url = format!(
        "{}/jmap/download/{account_id}/{blob_id}/{name}",
        base_url.trim_end_matches('/')
    );
    if let Some(accept) = accept {
        url.push_str(&format!("?accept={}", urlencoding_minimal(accept)));
    }
    let http_response = client.get(&url).send().await.with_context(|| format!("GET {url}"))?;
    let status = http_response.status();
    if !status.is_success() {
        let body = http_response.text().await.unwrap_or_default();
        bail!("server returned {status}: {body}");
    }
    let bytes = http_response.bytes().await.context("read blob body")?;
    let len = bytes.len() as u64;
    std::fs::write(out_path, &bytes).with_context(|| format!("write '{}'", out_path.display()))?;
    Ok(len)
}

/// Percent-encode the handful of characters that matter in a MIME type
/// query parameter (`/`, `;`, `=`, space) without pulling in a full URL
/// encoding crate for one call site.
fn urlencoding_minimal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '/' => out.push_str("%2F"),
            ';' => out.push_str("%3B"),
            '=' => out.push_str("%3D"),
            ' ' => out.push_str("%20"),
            _ => out.push(ch),
        }
    }
    out
}

/// Summarize accounts in a [`jmap_core::Session`] as `(id, name, is_personal)` tuples,
/// sorted by id, for tabular display.
#[must_use]
pub fn summarize_accounts(accounts: &BTreeMap<String, Account>) -> Vec<(String, String, bool)> {
    accounts
        .values()
        .map(|a| (a.id.clone(), a.name.clone(), a.is_personal))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_call_request_builds_one_method_call() {
        let req = single_call_request(vec!["urn:ietf:params:jmap:core".to_string()], "Core/echo", json!({"a": 1}), "c0");
        assert_eq!(req.method_calls.len(), 1);
        assert_eq!(req.method_calls[0].name(), "Core/echo");
        assert_eq!(req.method_calls[0].client_id(), "c0");
    }

    #[test]
    fn load_request_file_roundtrips_a_written_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.json");
        let req = single_call_request(vec!["urn:ietf:params:jmap:core".to_string()], "Core/echo", json!({}), "c0");
        std::fs::write(&path, serde_json::to_string(&req).unwrap()).unwrap();
        let loaded = load_request_file(&path).unwrap();
        assert_eq!(loaded.method_calls[0].name(), "Core/echo");
    }

    #[test]
    fn load_request_file_reports_missing_file() {
        let err = load_request_file(Path::new("/nonexistent/req.json")).unwrap_err();
        assert!(err.to_string().contains("read envelope file"));
    }

    #[test]
    fn urlencoding_minimal_escapes_mime_separators() {
        assert_eq!(urlencoding_minimal("text/plain; charset=utf-8"), "text%2Fplain%3B%20charset%3Dutf-8");
    }

    #[test]
    fn summarize_accounts_sorts_by_id() {
        let mut accounts = BTreeMap::new();
        accounts.insert(
            "u2".to_string(),
            Account {
                id: "u2".into(),
                name: "Second".into(),
                is_personal: false,
                is_read_only: false,
                account_capabilities: BTreeMap::new(),
            },
        );
        accounts.insert(
            "u1".to_string(),
            Account {
                id: "u1".into(),
                name: "First".into(),
                is_personal: true,
                is_read_only: false,
                account_capabilities: BTreeMap::new(),
            },
        );
        let rows = summarize_accounts(&accounts);
        assert_eq!(rows, vec![("u1".to_string(), "First".to_string(), true), ("u2".to_string(), "Second".to_string(), false)]);
    }
}

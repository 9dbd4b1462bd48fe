// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! `jmap-httpd` — the HTTP front-end binary wiring `jmap-config`,
//! `jmap-registry`, `jmap-capability`, and `jmap_http::build_app` together
//! into one listening process.
//!
//! This binary owns exactly what a process entry point should: load and
//! validate settings, freeze a method registry, build the blob store the
//! config points at, and serve. Everything it calls into is a library.

use anyhow::{Context, Result};
use clap::Parser;
use jmap_capability::CapabilityTable;
use jmap_config::{self, ConfigWarning, Settings};
use jmap_core::Account;
use jmap_dispatch::RequestContext;
use jmap_http::blob::{BlobStore, FsBlobStore, InMemoryBlobStore};
use jmap_http::middleware::{CorsConfig, RateLimiter, request_id_middleware, RequestLogger};
use jmap_http::{build_app, AppState};
use jmap_limits::Limits;
use jmap_registry::MethodRegistry;
use jmap_state::ModseqTable;
use jmap_telemetry::MetricsCollector;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jmap-httpd", version, about = "JMAP (RFC 8620) dispatch core HTTP front-end")]
struct Args {
    /// Path to a TOML settings file; see `jmap_config::Settings` for the shape.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `listen_addr` from the config file.
    #[arg(long)]
    listen: Option<String>,

    /// Absolute base URL this server is reachable at (used to build the
    /// Session resource's `apiUrl`/`downloadUrl`/`uploadUrl`).
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = jmap_config::load_config(args.config.as_deref())
        .with_context(|| "loading jmap-httpd settings")?;
    if let Some(listen) = args.listen {
        settings.listen_addr = listen;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(settings.log_level.clone()))
        .init();

    for warning in validate_or_exit(&settings)? {
        warn!(%warning, "configuration warning");
    }

    let capabilities = build_capability_table(&settings);
    let blobs = build_blob_store(&settings);
    let registry = build_registry(Arc::clone(&blobs));
    let accounts = demo_accounts();

    let state: &'static AppState = Box::leak(Box::new(AppState {
        registry,
        capabilities,
        limits: Limits::from_raw(settings.limits),
        accounts,
        modseq: ModseqTable::new(),
        blobs,
        metrics: MetricsCollector::new(),
        base_url: args.base_url,
        cors: CorsConfig::new(settings.cors_allowed_origins.clone()),
        rate_limiter: RateLimiter::new(
            settings.rate_limit_max_requests,
            std::time::Duration::from_secs(settings.rate_limit_window_secs),
        ),
    }));

    let app = build_app(state)
        .layer(axum::middleware::from_fn(RequestLogger::layer))
        .layer(axum::middleware::from_fn(request_id_middleware));

    let listener = tokio::net::TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("bind {}", settings.listen_addr))?;
    info!(listen_addr = %settings.listen_addr, "jmap-httpd listening");

    axum::serve(listener, app).await.context("serve")
}

fn validate_or_exit(settings: &Settings) -> Result<Vec<ConfigWarning>> {
    jmap_config::validate_config(settings).map_err(|e| anyhow::anyhow!("{e}"))
}

fn build_capability_table(settings: &Settings) -> CapabilityTable {
    let mut capabilities = CapabilityTable::new();
    for uri in &settings.capabilities {
        capabilities.advertise(uri.clone());
    }
    capabilities.declare_method("Core/echo", jmap_capability::uri::CORE);
    capabilities.declare_method("Blob/get", jmap_capability::uri::CORE);
    capabilities.declare_method("Blob/copy", jmap_capability::uri::CORE);
    capabilities
}

fn build_registry(blobs: Arc<dyn BlobStore>) -> Arc<MethodRegistry<RequestContext<'static>>> {
    let mut registry: MethodRegistry<RequestContext<'static>> = MethodRegistry::new();
    jmap_http::core_methods::register(&mut registry, blobs);
    registry.freeze()
}

fn build_blob_store(settings: &Settings) -> Arc<dyn BlobStore> {
    match &settings.blob_dir {
        Some(dir) => Arc::new(FsBlobStore::new(dir.clone())),
        None => Arc::new(InMemoryBlobStore::new()),
    }
}

/// A single personal account for the authenticated caller.
///
/// Account directory and authentication are out of this crate's scope
/// (§1 Non-goals); a deployment backed by a real account store replaces
/// this with one read from its own collaborator.
fn demo_accounts() -> BTreeMap<String, Account> {
    let mut accounts = BTreeMap::new();
    accounts.insert(
        "u1".to_string(),
        Account {
            id: "u1".to_string(),
            name: "Primary".to_string(),
            is_personal: true,
            is_read_only: false,
            account_capabilities: BTreeMap::new(),
        },
    );
    accounts
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! `jmap` — an operator CLI for a running JMAP dispatch core.
//!
//! It is a thin `reqwest` client over the same wire types
//! (`jmap-core::{Request,Response,Session}`) the core itself uses: every
//! subcommand builds or parses one of those shapes and prints it back in
//! a human- or machine-readable form. It does not implement any part of
//! the dispatch protocol itself.

mod commands;
mod config;
mod format;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "jmap", version, about = "Operator CLI for a JMAP dispatch core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the running `jmap-httpd` instance.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Load connection defaults from a TOML profile file.
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a single `[name, arguments, clientId]` method call.
    Call {
        /// Method name, e.g. `Core/echo` or `Email/get`.
        method: String,
        /// JSON-encoded arguments object.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Capability URI(s) to send in `using`; repeatable.
        #[arg(long = "using")]
        using: Vec<String>,
        /// Client id to tag the call with; a random one is used if omitted.
        #[arg(long)]
        client_id: Option<String>,
    },

    /// POST a complete Request envelope read from a JSON file.
    Send {
        /// Path to a JSON file containing a full Request envelope.
        file: PathBuf,
    },

    /// Fetch and print the `GET /jmap/` Session resource.
    Session,

    /// Upload a file's bytes to an account's blob store.
    Upload {
        /// Account to upload into.
        #[arg(long)]
        account_id: Option<String>,
        /// File whose bytes to upload.
        file: PathBuf,
        /// `Content-Type` to send; defaults to `application/octet-stream`.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Download a blob by id to a local file.
    Download {
        /// Account the blob belongs to.
        #[arg(long)]
        account_id: Option<String>,
        /// The blob id, e.g. `Gdeadbeef...`.
        blob_id: String,
        /// The `name` path segment (informational; usually the filename).
        #[arg(long, default_value = "blob")]
        name: String,
        /// `Accept` MIME type to request.
        #[arg(long)]
        accept: Option<String>,
        /// Where to write the downloaded bytes.
        #[arg(long)]
        out: PathBuf,
    },

    /// Print the JSON Schema for the server's `Settings` config shape.
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "jmap_cli=debug" } else { "jmap_cli=info" };
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).init();

    let profile = match &cli.profile {
        Some(path) => config::load_profile(path)?,
        None => config::Profile::default(),
    };
    let base_url = cli.base_url.unwrap_or(profile.base_url);
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Call {
            method,
            args,
            using,
            client_id,
        } => {
            let args: serde_json::Value = serde_json::from_str(&args).context("parse --args as JSON")?;
            let using = if using.is_empty() { profile.default_using } else { using };
            let client_id = client_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let request = commands::single_call_request(using, &method, args, &client_id);
            let response = commands::post_envelope(&client, &base_url, &request).await?;
            println!("{}", format::summarize_response(&response));
            println!("{}", format::pretty_json(&response)?);
        }

        Commands::Send { file } => {
            let request = commands::load_request_file(&file)?;
            let response = commands::post_envelope(&client, &base_url, &request).await?;
            println!("{}", format::summarize_response(&response));
            println!("{}", format::pretty_json(&response)?);
        }

        Commands::Session => {
            let session = commands::fetch_session(&client, &base_url).await?;
            let rows = commands::summarize_accounts(&session.accounts);
            println!("{}", format::table_accounts(&rows));
            println!("{}", format::pretty_json(&session)?);
        }

        Commands::Upload {
            account_id,
            file,
            content_type,
        } => {
            let account_id = account_id
                .or(profile.default_account_id)
                .context("no --account-id given and no default_account_id in profile")?;
            let reply = commands::upload_blob(&client, &base_url, &account_id, &file, content_type.as_deref()).await?;
            println!("{}", format::pretty_json(&reply)?);
        }

        Commands::Download {
            account_id,
            blob_id,
            name,
            accept,
            out,
        } => {
            let account_id = account_id
                .or(profile.default_account_id)
                .context("no --account-id given and no default_account_id in profile")?;
            let bytes = commands::download_blob(&client, &base_url, &account_id, &blob_id, &name, accept.as_deref(), &out)
                .await?;
            println!("wrote {bytes} bytes to {}", out.display());
        }

        Commands::Schema => {
            let schema = schema_for!(jmap_config::Settings);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

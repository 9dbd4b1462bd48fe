// SPDX-License-Identifier: MIT OR Apache-2.0
//! Profile configuration for the `jmap` CLI: which server to talk to and
//! what to assume when a subcommand's flags don't say.

use serde::Deserialize;
use std::path::Path;

/// A named connection profile, loadable from a TOML file via
/// `--profile path/to/file.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    /// Base URL of the running `jmap-httpd` instance, e.g. `http://127.0.0.1:8080`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Account id used when a subcommand omits `--account-id`.
    #[serde(default)]
    pub default_account_id: Option<String>,
    /// Capability URIs to send in `using` when a subcommand omits `--using`.
    #[serde(default = "default_using")]
    pub default_using: Vec<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_using() -> Vec<String> {
    vec!["urn:ietf:params:jmap:core".to_string()]
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_account_id: None,
            default_using: default_using(),
        }
    }
}

/// Load a [`Profile`] from `path`.
///
/// # Errors
///
/// Returns an error if the file can't be read or isn't valid TOML for
/// this shape.
pub fn load_profile(path: &Path) -> anyhow::Result<Profile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read profile '{}': {e}", path.display()))?;
    toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse profile '{}': {e}", path.display()))
}

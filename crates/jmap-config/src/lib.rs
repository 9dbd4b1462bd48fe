// SPDX-License-Identifier: MIT OR Apache-2.0
//! Settings loading, validation, and env overlay for the JMAP dispatch core.
//!
//! This crate provides [`Settings`] — the top-level runtime configuration —
//! together with helpers for loading it from a TOML file, overlaying
//! environment variables, and producing advisory [`ConfigWarning`]s. It
//! does not interpret the settings in any way; that's `jmap-limits` (for
//! the resource caps) and `jmap-capability` (for the advertised
//! capability set) once [`Settings::limits`] and [`Settings::capabilities`]
//! have been read out.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use jmap_limits::RawLimits;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or validating [`Settings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more hard problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent startup but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A resource limit was configured at `<= 0`, which disables the call
    /// it gates entirely (see `jmap_limits::Limits::from_raw`).
    LimitDisabled {
        /// The field name, e.g. `"max_calls_in_request"`.
        field: String,
    },
    /// A resource limit is set unusually high and may mask runaway clients.
    LimitUnusuallyHigh {
        /// The field name.
        field: String,
        /// The configured value.
        value: i64,
    },
    /// No capability URIs were configured as advertised; every request
    /// will fail capability negotiation.
    NoCapabilitiesAdvertised,
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LimitDisabled { field } => {
                write!(f, "limit '{field}' is <= 0; every call it gates will be rejected")
            }
            Self::LimitUnusuallyHigh { field, value } => {
                write!(f, "limit '{field}' is unusually high ({value})")
            }
            Self::NoCapabilitiesAdvertised => {
                write!(f, "no capabilities configured; every request will fail with unknownCapability")
            }
            Self::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Top-level runtime configuration for a JMAP front-end process.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Settings {
    /// `host:port` the HTTP surface binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// `tracing` log level filter (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory blobs are staged to on `POST /jmap/upload/{accountId}/`
    /// and served back from on download.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_dir: Option<String>,

    /// Capability URIs this server advertises in its Session resource and
    /// accepts in a request's `using` array.
    #[serde(default = "default_capabilities")]
    pub capabilities: BTreeSet<String>,

    /// Origins allowed to make cross-origin requests to the JMAP endpoints.
    /// Empty (the default) means no origin is allowed; a deployer opts in
    /// by listing its front-end's origins here.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,

    /// Requests a single worker accepts within [`Self::rate_limit_window_secs`]
    /// before the HTTP surface's sliding-window rate limiter starts
    /// answering `429 Too Many Requests`.
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,

    /// The sliding window, in seconds, [`Self::rate_limit_max_requests`] is
    /// measured over.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// The `MAX_*` resource caps; see [`jmap_limits::RawLimits`].
    #[serde(flatten)]
    pub limits: RawLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            blob_dir: None,
            capabilities: default_capabilities(),
            cors_allowed_origins: Vec::new(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            limits: default_limits(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_capabilities() -> BTreeSet<String> {
    [jmap_capability::uri::CORE.to_string()].into_iter().collect()
}

fn default_rate_limit_max_requests() -> u32 {
    120
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_limits() -> RawLimits {
    RawLimits {
        max_size_upload: 50_000_000,
        max_concurrent_upload: 4,
        max_size_request: 10_000_000,
        max_concurrent_requests: 10,
        max_calls_in_request: 16,
        max_objects_in_get: 500,
        max_objects_in_set: 500,
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Limits above this are almost certainly a typo (an extra zero) rather
/// than an intentional cap; flagged as an advisory warning, not an error.
const SUSPICIOUSLY_HIGH_LIMIT: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load [`Settings`] from an optional TOML file path, applying environment
/// variable overrides on top.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, starts from [`Settings::default`].
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` is given but unreadable,
/// or [`ConfigError::ParseError`] if its contents aren't valid TOML for
/// this shape.
pub fn load_config(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Parse a TOML string into [`Settings`].
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if `content` is not valid TOML, or
/// is valid TOML that doesn't match the [`Settings`] shape.
pub fn parse_toml(content: &str) -> Result<Settings, ConfigError> {
    toml::from_str::<Settings>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides on top of an already-loaded
/// [`Settings`].
///
/// Recognised variables:
/// - `JMAP_LISTEN_ADDR`
/// - `JMAP_LOG_LEVEL`
/// - `JMAP_BLOB_DIR`
/// - `JMAP_MAX_SIZE_REQUEST`
/// - `JMAP_MAX_CALLS_IN_REQUEST`
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("JMAP_LISTEN_ADDR") {
        settings.listen_addr = val;
    }
    if let Ok(val) = std::env::var("JMAP_LOG_LEVEL") {
        settings.log_level = val;
    }
    if let Ok(val) = std::env::var("JMAP_BLOB_DIR") {
        settings.blob_dir = Some(val);
    }
    if let Ok(val) = std::env::var("JMAP_MAX_SIZE_REQUEST") {
        if let Ok(n) = val.parse() {
            settings.limits.max_size_request = n;
        }
    }
    if let Ok(val) = std::env::var("JMAP_MAX_CALLS_IN_REQUEST") {
        if let Ok(n) = val.parse() {
            settings.limits.max_calls_in_request = n;
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a loaded [`Settings`], returning advisory warnings.
///
/// Hard errors (an unrecognized log level, an unparseable listen address)
/// come back as [`ConfigError::ValidationError`]; soft issues (a disabled
/// limit, no advertised capabilities) come back as warnings the caller may
/// log and continue past.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if any hard check fails.
pub fn validate_config(settings: &Settings) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !VALID_LOG_LEVELS.contains(&settings.log_level.as_str()) {
        errors.push(format!("invalid log_level '{}'", settings.log_level));
    }

    if settings.listen_addr.parse::<std::net::SocketAddr>().is_err() {
        errors.push(format!("invalid listen_addr '{}'", settings.listen_addr));
    }

    if settings.capabilities.is_empty() {
        warnings.push(ConfigWarning::NoCapabilitiesAdvertised);
    }

    for (field, value) in limit_fields(&settings.limits) {
        if value <= 0 {
            warnings.push(ConfigWarning::LimitDisabled { field: field.to_string() });
        } else if value > SUSPICIOUSLY_HIGH_LIMIT {
            warnings.push(ConfigWarning::LimitUnusuallyHigh {
                field: field.to_string(),
                value,
            });
        }
    }

    if settings.blob_dir.is_none() {
        warnings.push(ConfigWarning::MissingOptionalField {
            field: "blob_dir".into(),
            hint: "uploaded blobs will be rejected until a blob_dir is configured".into(),
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

fn limit_fields(limits: &RawLimits) -> [(&'static str, i64); 7] {
    [
        ("max_size_upload", limits.max_size_upload),
        ("max_concurrent_upload", limits.max_concurrent_upload),
        ("max_size_request", limits.max_size_request),
        ("max_concurrent_requests", limits.max_concurrent_requests),
        ("max_calls_in_request", limits.max_calls_in_request),
        ("max_objects_in_get", limits.max_objects_in_get),
        ("max_objects_in_set", limits.max_objects_in_set),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_settings_are_valid_but_warn_about_missing_blob_dir() {
        let settings = Settings::default();
        let warnings = validate_config(&settings).expect("default settings should be valid");
        assert!(warnings.contains(&ConfigWarning::MissingOptionalField {
            field: "blob_dir".into(),
            hint: "uploaded blobs will be rejected until a blob_dir is configured".into(),
        }));
    }

    #[test]
    fn default_settings_have_sensible_values() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert!(settings.capabilities.contains(jmap_capability::uri::CORE));
        assert_eq!(settings.limits.max_calls_in_request, 16);
    }

    #[test]
    fn parse_valid_toml_string() {
        let toml = r#"
            listen_addr = "0.0.0.0:9000"
            log_level = "debug"
            blob_dir = "/var/jmap/blobs"
            capabilities = ["urn:ietf:params:jmap:core", "urn:ietf:params:jmap:mail"]
            max_size_upload = 1000000
            max_concurrent_upload = 4
            max_size_request = 1000000
            max_concurrent_requests = 10
            max_calls_in_request = 16
            max_objects_in_get = 500
            max_objects_in_set = 500
        "#;
        let settings = parse_toml(toml).unwrap();
        assert_eq!(settings.listen_addr, "0.0.0.0:9000");
        assert_eq!(settings.capabilities.len(), 2);
    }

    #[test]
    fn parse_invalid_toml_gives_parse_error() {
        let err = parse_toml("this is [not valid toml =").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn parse_missing_required_limit_field_gives_parse_error() {
        let err = parse_toml(r#"listen_addr = "127.0.0.1:1""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn validation_catches_invalid_log_level() {
        let settings = Settings {
            log_level: "verbose".into(),
            ..Settings::default()
        };
        let err = validate_config(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_catches_unparseable_listen_addr() {
        let settings = Settings {
            listen_addr: "not-an-addr".into(),
            ..Settings::default()
        };
        let err = validate_config(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_warns_about_disabled_limits() {
        let mut settings = Settings::default();
        settings.limits.max_calls_in_request = 0;
        let warnings = validate_config(&settings).unwrap();
        assert!(warnings.contains(&ConfigWarning::LimitDisabled {
            field: "max_calls_in_request".into()
        }));
    }

    #[test]
    fn validation_warns_about_unusually_high_limits() {
        let mut settings = Settings::default();
        settings.limits.max_size_request = 5_000_000_000;
        let warnings = validate_config(&settings).unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::LimitUnusuallyHigh { field, .. } if field == "max_size_request"
        )));
    }

    #[test]
    fn validation_warns_about_empty_capability_set() {
        let mut settings = Settings::default();
        settings.capabilities.clear();
        let warnings = validate_config(&settings).unwrap();
        assert!(warnings.contains(&ConfigWarning::NoCapabilitiesAdvertised));
    }

    #[test]
    fn load_config_applies_env_overrides_on_top_of_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, r#"log_level = "warn""#).unwrap();
        writeln!(f, r#"max_size_upload = 1"#).unwrap();
        writeln!(f, r#"max_concurrent_upload = 1"#).unwrap();
        writeln!(f, r#"max_size_request = 1"#).unwrap();
        writeln!(f, r#"max_concurrent_requests = 1"#).unwrap();
        writeln!(f, r#"max_calls_in_request = 1"#).unwrap();
        writeln!(f, r#"max_objects_in_get = 1"#).unwrap();
        writeln!(f, r#"max_objects_in_set = 1"#).unwrap();
        drop(f);

        // SAFETY-free: tests in this crate don't run the env-mutating cases
        // concurrently with each other thanks to the default single-threaded
        // test harness per process; this crate sets no other env vars.
        unsafe {
            std::env::set_var("JMAP_LOG_LEVEL", "trace");
        }
        let settings = load_config(Some(&path)).unwrap();
        unsafe {
            std::env::remove_var("JMAP_LOG_LEVEL");
        }
        assert_eq!(settings.log_level, "trace");
    }

    #[test]
    fn load_config_without_a_path_returns_defaults() {
        let settings = load_config(None).unwrap();
        assert_eq!(settings.listen_addr, default_listen_addr());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = Settings::default();
        let serialized = toml::to_string(&settings).unwrap();
        let deserialized: Settings = toml::from_str(&serialized).unwrap();
        assert_eq!(settings, deserialized);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/settings.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}

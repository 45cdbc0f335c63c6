//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use marketfeed_config::ConfigError;
use marketfeed_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Feed at {url} is unreachable")]
    #[diagnostic(
        code(marketfeed::unreachable),
        help(
            "Reconnection gave up: {reason}\n\
             Check that the feed server is running, or raise --max-attempts."
        )
    )]
    Unreachable { url: String, reason: String },

    #[error("Feed connection failed: {reason}")]
    #[diagnostic(code(marketfeed::connection_failed))]
    ConnectionFailed { reason: String },

    #[error("Cannot send: the feed is not connected")]
    #[diagnostic(
        code(marketfeed::not_connected),
        help("The link dropped before the command could be written. Try again.")
    )]
    NotConnected,

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s waiting for {waiting_for}")]
    #[diagnostic(
        code(marketfeed::timeout),
        help("Increase the wait with --timeout or check that the feed is publishing.")
    )]
    Timeout { seconds: u64, waiting_for: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Section '{name}' is not in the snapshot")]
    #[diagnostic(code(marketfeed::no_section), help("Sections present: {available}"))]
    SectionNotFound { name: String, available: String },

    #[error("Feed data error: {message}")]
    #[diagnostic(code(marketfeed::data))]
    Data { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(marketfeed::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(marketfeed::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create a config with: marketfeed config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Config file already exists at {path}")]
    #[diagnostic(
        code(marketfeed::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(marketfeed::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(marketfeed::json), help("Pass a JSON object, e.g. --data '{{\"symbols\":[\"btc\"]}}'"))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(marketfeed::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } | Self::ConnectionFailed { .. } | Self::NotConnected => {
                exit_code::CONNECTION
            }
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Transport { reason } => CliError::ConnectionFailed { reason },

            CoreError::ExhaustedRetries { attempts } => CliError::Unreachable {
                url: "(feed)".into(),
                reason: format!("{attempts} reconnection attempts failed"),
            },

            CoreError::SendWhileDisconnected => CliError::NotConnected,

            CoreError::MalformedMessage { reason } => CliError::Data { message: reason },

            CoreError::SectionDecode { section, reason } => CliError::Data {
                message: format!("section '{section}': {reason}"),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

//! Shared configuration for marketfeed tools.
//!
//! TOML profiles merged with `MARKETFEED_` environment variables, and
//! translation to `marketfeed_core::FeedConfig`. The CLI layers its own
//! flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use marketfeed_core::{DEFAULT_FEED_URL, FeedConfig, ReconnectConfig, SectionLayout, SectionRule};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named feed profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// A starter config with one `default` profile pointing at the local feed.
    pub fn starter() -> Self {
        let mut cfg = Self::default();
        cfg.profiles.insert("default".into(), Profile::default());
        cfg
    }

    /// Resolve which profile to use: explicit name, then `default_profile`,
    /// then `"default"`.
    pub fn profile_name<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    /// Look up a profile. A missing `default` profile resolves to the
    /// built-in defaults so the tools work without any config file.
    pub fn profile(&self, name: &str) -> Result<Profile, ConfigError> {
        match self.profiles.get(name) {
            Some(profile) => Ok(profile.clone()),
            None if name == "default" => Ok(Profile::default()),
            None => Err(ConfigError::UnknownProfile { name: name.into() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds to wait for a first snapshot or an open link.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named feed profile. Unset knobs fall back to the core defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Feed WebSocket URL (e.g., "ws://localhost:8001/ws").
    #[serde(default = "default_url")]
    pub url: String,

    /// Base reconnect delay in milliseconds.
    pub initial_delay_ms: Option<u64>,

    /// Upper bound on any reconnect delay in milliseconds.
    pub max_delay_ms: Option<u64>,

    /// Consecutive failed reconnects before giving up.
    pub max_attempts: Option<u32>,

    /// How long a disconnect right after fresh data stays hidden.
    pub debounce_window_ms: Option<u64>,

    /// WebSocket ping interval in seconds.
    pub keepalive_secs: Option<u64>,

    /// Section rules replacing the dashboard layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<SectionRule>>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            url: default_url(),
            initial_delay_ms: None,
            max_delay_ms: None,
            max_attempts: None,
            debounce_window_ms: None,
            keepalive_secs: None,
            sections: None,
        }
    }
}

fn default_url() -> String {
    DEFAULT_FEED_URL.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "marketfeed", "marketfeed").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("marketfeed");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + environment. A missing file is not an error.
///
/// Environment keys nest with `__`, e.g. `MARKETFEED_DEFAULTS__TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("MARKETFEED_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core config ──────────────────────────────────────

/// Build a `FeedConfig` from a profile, no CLI flag overrides.
pub fn profile_to_feed_config(profile: &Profile) -> Result<FeedConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let mut cfg = FeedConfig::new(url);
    let defaults = ReconnectConfig::default();
    cfg.reconnect = ReconnectConfig {
        initial_delay: profile
            .initial_delay_ms
            .map_or(defaults.initial_delay, Duration::from_millis),
        max_delay: profile
            .max_delay_ms
            .map_or(defaults.max_delay, Duration::from_millis),
        max_attempts: profile.max_attempts.unwrap_or(defaults.max_attempts),
    };
    if let Some(ms) = profile.debounce_window_ms {
        cfg.debounce_window = Duration::from_millis(ms);
    }
    cfg.keepalive_interval = profile.keepalive_secs.map(Duration::from_secs);
    if let Some(rules) = &profile.sections {
        cfg.layout = SectionLayout::new(rules.clone());
    }

    cfg.validate().map_err(|e| ConfigError::Validation {
        field: "profile".into(),
        reason: e.to_string(),
    })?;
    Ok(cfg)
}

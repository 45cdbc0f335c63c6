//! CLI configuration -- thin wrapper around `marketfeed_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--url, --max-attempts, etc.).

use std::path::PathBuf;
use std::time::Duration;

use marketfeed_core::FeedConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use marketfeed_config::{Config, Profile, load_config_from, profile_to_feed_config, save_config_to};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Config file in effect: `--config`, else the platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(marketfeed_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config_from(&config_path(global))?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.profile_name(global.profile.as_deref()).to_owned()
}

/// Build a `FeedConfig` from the config file, active profile, and flags.
///
/// CLI flag overrides take priority over profile values.
pub fn build_feed_config(global: &GlobalOpts) -> Result<FeedConfig, CliError> {
    let cfg = load_config(global)?;
    let name = active_profile_name(global, &cfg);
    let mut profile = cfg.profile(&name).map_err(|_| CliError::ProfileNotFound {
        available: available_profiles(&cfg),
        name: name.clone(),
    })?;

    apply_overrides(&mut profile, global);
    let feed = profile_to_feed_config(&profile)?;
    tracing::debug!(profile = %name, url = %feed.url, "resolved feed config");
    Ok(feed)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(url) = &global.url {
        profile.url.clone_from(url);
    }
    if global.initial_delay_ms.is_some() {
        profile.initial_delay_ms = global.initial_delay_ms;
    }
    if global.max_delay_ms.is_some() {
        profile.max_delay_ms = global.max_delay_ms;
    }
    if global.max_attempts.is_some() {
        profile.max_attempts = global.max_attempts;
    }
    if global.debounce_ms.is_some() {
        profile.debounce_window_ms = global.debounce_ms;
    }
}

fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// The `--timeout` flag as a duration.
pub fn wait_timeout(global: &GlobalOpts) -> Duration {
    Duration::from_secs(global.timeout)
}

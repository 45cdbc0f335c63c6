//! Clap derive structures for the `marketfeed` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// marketfeed -- follow a reconnecting market-data WebSocket feed
#[derive(Debug, Parser)]
#[command(
    name = "marketfeed",
    version,
    about = "Follow a market-data WebSocket feed from the command line",
    long_about = "Connects to a market-data WebSocket feed, reconnects with bounded\n\
        exponential backoff, and consolidates partial updates into one snapshot.\n\n\
        Slow-changing sections (like macro indicators) keep their last valid value\n\
        when an update omits them or carries an invalid one.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Feed profile to use
    #[arg(long, short = 'p', env = "MARKETFEED_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "MARKETFEED_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Feed WebSocket URL (overrides profile)
    #[arg(long, short = 'u', env = "MARKETFEED_URL", global = true)]
    pub url: Option<String>,

    /// Base reconnect delay in milliseconds (overrides profile)
    #[arg(long, global = true)]
    pub initial_delay_ms: Option<u64>,

    /// Maximum reconnect delay in milliseconds (overrides profile)
    #[arg(long, global = true)]
    pub max_delay_ms: Option<u64>,

    /// Reconnect attempts before giving up (overrides profile)
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Disconnect grace period in milliseconds (overrides profile)
    #[arg(long, global = true)]
    pub debounce_ms: Option<u64>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "MARKETFEED_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for a snapshot or an open link
    #[arg(long, env = "MARKETFEED_TIMEOUT", default_value = "30", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary (default, interactive)
    Table,
    /// Pretty-printed JSON (one compact object per line when streaming)
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the feed and print status changes and snapshot updates
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Wait for the first snapshot and print it
    #[command(alias = "snap")]
    Snapshot(SnapshotArgs),

    /// Send one command upstream once the link is open
    Send(SendArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Feed commands ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only print these sections (repeatable)
    #[arg(long = "section", short = 's', value_name = "NAME")]
    pub sections: Vec<String>,

    /// Print status transitions only, no snapshot updates
    #[arg(long)]
    pub status_only: bool,

    /// Stop after this many snapshot updates
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Print only this section's raw value
    #[arg(long, short = 's', value_name = "NAME", conflicts_with = "dashboard")]
    pub section: Option<String>,

    /// Decode the dashboard sections: markets, macro indicators, liquidations, trades
    #[arg(long, short = 'D')]
    pub dashboard: bool,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Command kind (the envelope's `kind` field)
    #[arg(long, short = 'k')]
    pub kind: String,

    /// JSON payload for the `data` field
    #[arg(long, short = 'd', default_value = "{}")]
    pub data: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the resolved configuration
    Show,

    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}

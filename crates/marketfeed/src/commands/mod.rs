//! Command dispatch: bridges CLI args -> feed lifecycle -> output formatting.

pub mod config_cmd;
pub mod send;
pub mod snapshot;
pub mod util;
pub mod watch;

use marketfeed_core::Feed;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a feed-bound command to the appropriate handler.
///
/// The feed is stopped before returning, whatever the outcome.
pub async fn dispatch(cmd: Command, feed: &Feed, global: &GlobalOpts) -> Result<(), CliError> {
    feed.start().await?;
    let result = match cmd {
        Command::Watch(args) => watch::handle(feed, args, global).await,
        Command::Snapshot(args) => snapshot::handle(feed, args, global).await,
        Command::Send(args) => send::handle(feed, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    };
    feed.stop().await;
    result
}

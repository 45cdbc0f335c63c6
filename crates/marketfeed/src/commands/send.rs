//! `send`: deliver one command upstream once the link is open.

use std::time::Duration;

use serde_json::Value;

use marketfeed_core::{Command, Feed};

use crate::cli::{GlobalOpts, OutputFormat, SendArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

/// The socket task writes asynchronously; give it this long before teardown.
const FLUSH_GRACE: Duration = Duration::from_millis(250);

pub async fn handle(feed: &Feed, args: SendArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let data: Value = serde_json::from_str(&args.data)?;
    if args.kind.trim().is_empty() {
        return Err(CliError::Validation {
            field: "kind".into(),
            reason: "must not be empty".into(),
        });
    }
    let command = Command::new(args.kind, data);

    super::util::wait_for_open(feed, config::wait_timeout(global)).await?;
    feed.send(&command)?;
    tokio::time::sleep(FLUSH_GRACE).await;
    tracing::info!(kind = %command.kind, "command sent");

    if global.output == OutputFormat::Table {
        if !global.quiet {
            eprintln!("✓ Sent '{}' to {}", command.kind, feed.config().url);
        }
    } else {
        let out = output::render_single(global.output, &command, |_| String::new());
        output::print_output(&out, global.quiet);
    }
    Ok(())
}

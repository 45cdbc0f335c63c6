//! Shared helpers for command handlers.

use std::sync::Arc;
use std::time::Duration;

use marketfeed_core::{Feed, Snapshot};

use crate::error::CliError;

/// The error reported when the feed gave up reconnecting.
pub fn unreachable_error(feed: &Feed) -> CliError {
    CliError::Unreachable {
        url: feed.config().url.to_string(),
        reason: feed
            .last_error()
            .map_or_else(|| "retries exhausted".into(), |e| e.to_string()),
    }
}

/// Wait for the first snapshot, failing fast if the feed gives up.
pub async fn wait_for_snapshot(feed: &Feed, timeout: Duration) -> Result<Arc<Snapshot>, CliError> {
    let mut snapshots = feed.subscribe_snapshot();
    let mut link = feed.subscribe_link_state();

    let wait = async {
        loop {
            if let Some(snapshot) = snapshots.latest() {
                return Ok(snapshot);
            }
            if link.borrow_and_update().is_failed() {
                return Err(unreachable_error(feed));
            }
            tokio::select! {
                snapshot = snapshots.changed() => {
                    return snapshot.ok_or_else(|| CliError::Internal("snapshot store closed".into()));
                }
                changed = link.changed() => {
                    if changed.is_err() {
                        return Err(CliError::Internal("feed closed".into()));
                    }
                }
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| CliError::Timeout {
            seconds: timeout.as_secs(),
            waiting_for: "the first snapshot".into(),
        })?
}

/// Wait until the link is open, failing fast if the feed gives up.
pub async fn wait_for_open(feed: &Feed, timeout: Duration) -> Result<(), CliError> {
    let mut link = feed.subscribe_link_state();

    let wait = async {
        loop {
            let state = *link.borrow_and_update();
            if state.is_open() {
                return Ok(());
            }
            if state.is_failed() {
                return Err(unreachable_error(feed));
            }
            if link.changed().await.is_err() {
                return Err(CliError::Internal("feed closed".into()));
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| CliError::Timeout {
            seconds: timeout.as_secs(),
            waiting_for: "the feed connection".into(),
        })?
}

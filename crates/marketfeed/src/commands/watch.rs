//! `watch`: follow the feed, printing status transitions and snapshots.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use marketfeed_core::{Feed, LinkState, Snapshot, Status};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent<'a> {
    Status {
        status: Status,
        link: LinkState,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Snapshot {
        sequence: u64,
        kind: &'a str,
        updated_at: DateTime<Utc>,
        sections: BTreeMap<&'a str, &'a Value>,
    },
}

fn status_event(feed: &Feed, status: Status) -> WatchEvent<'static> {
    WatchEvent::Status {
        status,
        link: feed.link_state(),
        error: feed.last_error().map(|e| e.to_string()),
    }
}

fn snapshot_event<'a>(snapshot: &'a Snapshot, filter: &[String]) -> WatchEvent<'a> {
    WatchEvent::Snapshot {
        sequence: snapshot.sequence,
        kind: &snapshot.kind,
        updated_at: snapshot.updated_at,
        sections: snapshot
            .sections
            .iter()
            .filter(|(name, _)| filter.is_empty() || filter.iter().any(|f| f == *name))
            .map(|(name, value)| (name.as_str(), value))
            .collect(),
    }
}

fn summary(event: &WatchEvent<'_>, color: bool) -> String {
    match event {
        WatchEvent::Status {
            status,
            link,
            error,
        } => {
            let mut line = format!("status {} (link {link})", output::paint_status(*status, color));
            if let Some(error) = error {
                line.push_str(" -- ");
                line.push_str(error);
            }
            line
        }
        WatchEvent::Snapshot {
            sequence,
            kind,
            updated_at,
            sections,
        } => {
            let parts: Vec<String> = sections
                .iter()
                .map(|(name, value)| format!("{name}={}", output::summarize_value(value)))
                .collect();
            format!(
                "{} #{sequence} {kind} {}",
                updated_at.format("%H:%M:%S%.3f"),
                parts.join(" ")
            )
        }
    }
}

fn emit(event: &WatchEvent<'_>, global: &GlobalOpts, color: bool) {
    let out = output::render_stream_item(global.output, event, |e| summary(e, color));
    output::print_output(&out, global.quiet);
}

pub async fn handle(feed: &Feed, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);

    let mut status = feed.subscribe_status();
    let mut snapshots = feed.subscribe_snapshot();
    let mut printed: u64 = 0;

    let initial = *status.borrow_and_update();
    emit(&status_event(feed, initial), global, color);
    if initial == Status::Error {
        return Err(super::util::unreachable_error(feed));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::debug!("interrupted");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                emit(&status_event(feed, current), global, color);
                if current == Status::Error {
                    return Err(super::util::unreachable_error(feed));
                }
            }
            snapshot = snapshots.changed(), if !args.status_only => {
                let Some(snapshot) = snapshot else {
                    return Ok(());
                };
                emit(&snapshot_event(&snapshot, &args.sections), global, color);
                printed += 1;
                if args.count.is_some_and(|n| printed >= n) {
                    return Ok(());
                }
            }
        }
    }
}

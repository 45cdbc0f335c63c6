// ── Connection-state debouncer ──
//
// Computes the externally visible feed status from the last snapshot
// update, the current link phase, and the current time. No timers live
// here: `evaluate` also reports when its answer would next change, and
// the supervisor arms a single re-check for that instant.

use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::time::Instant;

/// Externally visible status of the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// No usable data yet, or reconnecting outside the grace window.
    #[default]
    Loading,
    /// Connected, or briefly disconnected right after fresh data.
    Ready,
    /// Retries exhausted; needs a manual retry.
    Error,
}

/// Link phase as the debouncer sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Up,
    /// Disconnected since the first close of the current outage.
    Down { since: Instant },
    /// Retries exhausted. `since` is still the start of the outage.
    Failed { since: Instant },
}

/// Result of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub status: Status,
    /// When the status would change without any further events.
    pub recheck_at: Option<Instant>,
}

/// Status as a pure function of its inputs.
///
/// An outage that begins less than `window` after the last update is
/// hidden until `since + window`, whether the link is still retrying or
/// has given up. Past that point a retrying link shows `Loading` and an
/// exhausted one shows `Error`. Without any snapshot there is nothing to
/// protect, so the outage shows immediately.
pub fn evaluate(
    last_update: Option<Instant>,
    phase: LinkPhase,
    now: Instant,
    window: Duration,
) -> Evaluation {
    let (since, exposed) = match phase {
        LinkPhase::Up => {
            return Evaluation {
                status: Status::Ready,
                recheck_at: None,
            };
        }
        LinkPhase::Down { since } => (since, Status::Loading),
        LinkPhase::Failed { since } => (since, Status::Error),
    };

    let deadline = since + window;
    let fresh =
        last_update.is_some_and(|updated| since.saturating_duration_since(updated) < window);
    if fresh && now < deadline {
        Evaluation {
            status: Status::Ready,
            recheck_at: Some(deadline),
        }
    } else {
        Evaluation {
            status: exposed,
            recheck_at: None,
        }
    }
}

/// Inputs to [`evaluate`], maintained from lifecycle events.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    window: Duration,
    last_update: Option<Instant>,
    phase: LinkPhase,
}

impl StatusTracker {
    /// A tracker for a link that is not up yet.
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            last_update: None,
            phase: LinkPhase::Down { since: now },
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn link_up(&mut self) {
        self.phase = LinkPhase::Up;
    }

    /// Record a close or error. Only the first one of an outage counts,
    /// so repeated failures never extend the grace period.
    pub fn link_down(&mut self, now: Instant) {
        if self.phase == LinkPhase::Up {
            self.phase = LinkPhase::Down { since: now };
        }
    }

    /// Retries exhausted. Keeps the outage start so the grace period
    /// still applies; a link that was up fails as of `now`.
    pub fn link_failed(&mut self, now: Instant) {
        self.phase = match self.phase {
            LinkPhase::Up => LinkPhase::Failed { since: now },
            LinkPhase::Down { since } | LinkPhase::Failed { since } => {
                LinkPhase::Failed { since }
            }
        };
    }

    /// Manual retry after failure starts a fresh outage.
    pub fn link_retrying(&mut self, now: Instant) {
        if matches!(self.phase, LinkPhase::Failed { .. }) {
            self.phase = LinkPhase::Down { since: now };
        }
    }

    /// A valid snapshot update was folded.
    pub fn record_update(&mut self, now: Instant) {
        self.last_update = Some(now);
    }

    pub fn evaluate(&self, now: Instant) -> Evaluation {
        evaluate(self.last_update, self.phase, now, self.window)
    }
}

// ── Reconnection policy ──
//
// Pure state machine deciding whether and when to re-open the feed.
// Owns no timers and performs no IO: the feed supervisor feeds it
// transport events and arms the timers it asks for.
//
//   Idle → Connecting → Open → Closed → Connecting (retry) → … → Failed

use std::time::Duration;

use serde::Serialize;
use strum::Display;

use crate::config::ReconnectConfig;

/// Lifecycle of the feed connection as seen by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    /// Not started, or torn down.
    Idle,
    /// A connection attempt is in flight. `attempt` 0 is the initial connect.
    Connecting { attempt: u32 },
    /// Connected and receiving.
    Open,
    /// Disconnected; retry `attempt` is scheduled.
    Closed { attempt: u32 },
    /// Retries exhausted. Terminal until [`ReconnectPolicy::reset`].
    Failed,
}

impl LinkState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// What to do after a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Schedule retry number `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Stop retrying; surface a persistent error.
    GiveUp { attempts: u32 },
    /// The close did not apply to the current state (stale or duplicate).
    Ignore,
}

/// Bounded exponential backoff state machine.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    state: LinkState,
    /// Consecutive retries since the last successful open.
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            state: LinkState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// `Idle → Connecting`. Returns `true` if a connection should be opened.
    pub fn start(&mut self) -> bool {
        if self.state != LinkState::Idle {
            return false;
        }
        self.attempts = 0;
        self.state = LinkState::Connecting { attempt: 0 };
        true
    }

    /// `Connecting → Open`; resets the retry counter.
    pub fn on_open(&mut self) -> bool {
        if !matches!(self.state, LinkState::Connecting { .. }) {
            return false;
        }
        self.attempts = 0;
        self.state = LinkState::Open;
        true
    }

    /// Handle a close or error on the current connection.
    ///
    /// A failure while `Connecting` counts the same as losing an open link.
    pub fn on_close(&mut self) -> CloseDecision {
        if !matches!(self.state, LinkState::Open | LinkState::Connecting { .. }) {
            return CloseDecision::Ignore;
        }

        if self.attempts >= self.config.max_attempts {
            self.state = LinkState::Failed;
            return CloseDecision::GiveUp {
                attempts: self.attempts,
            };
        }

        let attempt = self.attempts + 1;
        self.state = LinkState::Closed { attempt };
        CloseDecision::Retry {
            attempt,
            delay: backoff_delay(attempt, &self.config),
        }
    }

    /// The retry timer fired: `Closed → Connecting`, counter incremented.
    ///
    /// Returns the attempt number to open, or `None` if no retry is pending.
    pub fn on_retry_due(&mut self) -> Option<u32> {
        let LinkState::Closed { attempt } = self.state else {
            return None;
        };
        self.attempts = attempt;
        self.state = LinkState::Connecting { attempt };
        Some(attempt)
    }

    /// Teardown: drop any pending retry and return to `Idle`.
    pub fn stop(&mut self) {
        self.state = LinkState::Idle;
        self.attempts = 0;
    }

    /// Manual retry after `Failed`: zero the counter and reconnect.
    ///
    /// Returns `true` if a connection should be opened.
    pub fn reset(&mut self) -> bool {
        if self.state != LinkState::Failed {
            return false;
        }
        self.attempts = 0;
        self.state = LinkState::Connecting { attempt: 0 };
        true
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// `min(initial_delay * 2^attempt, max_delay)`, saturating on overflow.
pub fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| config.initial_delay.checked_mul(factor))
        .map_or(config.max_delay, |delay| delay.min(config.max_delay))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts,
        })
    }

    #[test]
    fn backoff_follows_capped_doubling() {
        let config = ReconnectConfig::default();
        let delays: Vec<u128> = (0..8)
            .map(|a| backoff_delay(a, &config).as_millis())
            .collect();
        assert_eq!(
            delays,
            vec![1000, 2000, 4000, 8000, 16_000, 30_000, 30_000, 30_000]
        );
    }

    #[test]
    fn backoff_saturates_on_huge_attempts() {
        let config = ReconnectConfig::default();
        assert_eq!(backoff_delay(40, &config), config.max_delay);
        assert_eq!(backoff_delay(u32::MAX, &config), config.max_delay);
    }

    #[test]
    fn start_only_from_idle() {
        let mut p = policy(5);
        assert!(p.start());
        assert_eq!(p.state(), LinkState::Connecting { attempt: 0 });
        assert!(!p.start());
    }

    #[test]
    fn open_resets_counter() {
        let mut p = policy(5);
        p.start();
        p.on_close();
        p.on_retry_due();
        assert_eq!(p.attempts(), 1);

        assert!(p.on_open());
        assert_eq!(p.state(), LinkState::Open);
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn three_failures_then_success() {
        let mut p = policy(5);
        p.start();

        let mut delays = Vec::new();
        for _ in 0..3 {
            match p.on_close() {
                CloseDecision::Retry { delay, .. } => delays.push(delay.as_millis()),
                other => panic!("expected retry, got {other:?}"),
            }
            p.on_retry_due();
        }
        assert_eq!(delays, vec![2000, 4000, 8000]);
        assert_eq!(p.state(), LinkState::Connecting { attempt: 3 });

        assert!(p.on_open());
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn exhaustion_is_terminal() {
        let mut p = policy(2);
        p.start();

        assert!(matches!(p.on_close(), CloseDecision::Retry { attempt: 1, .. }));
        p.on_retry_due();
        assert!(matches!(p.on_close(), CloseDecision::Retry { attempt: 2, .. }));
        p.on_retry_due();
        assert_eq!(p.on_close(), CloseDecision::GiveUp { attempts: 2 });
        assert_eq!(p.state(), LinkState::Failed);

        // No further retries from the terminal state.
        assert_eq!(p.on_close(), CloseDecision::Ignore);
        assert_eq!(p.on_retry_due(), None);
        assert!(!p.on_open());
    }

    #[test]
    fn zero_max_attempts_fails_on_first_close() {
        let mut p = policy(0);
        p.start();
        assert_eq!(p.on_close(), CloseDecision::GiveUp { attempts: 0 });
    }

    #[test]
    fn open_then_close_schedules_first_retry() {
        let mut p = policy(5);
        p.start();
        p.on_open();
        assert_eq!(
            p.on_close(),
            CloseDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(2000)
            }
        );
        assert_eq!(p.state(), LinkState::Closed { attempt: 1 });
    }

    #[test]
    fn duplicate_close_is_ignored() {
        let mut p = policy(5);
        p.start();
        p.on_close();
        assert_eq!(p.on_close(), CloseDecision::Ignore);
    }

    #[test]
    fn stop_cancels_pending_retry() {
        let mut p = policy(5);
        p.start();
        p.on_close();
        p.stop();
        assert_eq!(p.state(), LinkState::Idle);
        assert_eq!(p.on_retry_due(), None);
    }

    #[test]
    fn reset_only_from_failed() {
        let mut p = policy(0);
        assert!(!p.reset());
        p.start();
        p.on_close();
        assert!(p.reset());
        assert_eq!(p.state(), LinkState::Connecting { attempt: 0 });
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn link_state_display() {
        assert_eq!(LinkState::Idle.to_string(), "idle");
        assert_eq!(LinkState::Connecting { attempt: 2 }.to_string(), "connecting");
        assert_eq!(LinkState::Failed.to_string(), "failed");
    }
}

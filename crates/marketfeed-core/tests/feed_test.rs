// Service-level tests for `Feed` driven by a scripted in-memory connector.
//
// Every test runs on a paused clock: timers fire exactly at their deadline
// once the runtime is otherwise idle, so backoff and debounce timing can be
// asserted to the millisecond without real waiting.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::{Instant, sleep, sleep_until};
use url::Url;

use marketfeed_api::{ConnectionDriver, ConnectionHandle, EventSink, TransportEvent};
use marketfeed_core::{
    Command, Connector, CoreError, Feed, FeedConfig, LinkState, ReconnectConfig, SectionLayout,
    SectionRule, Status, Validity,
};

// ── Scripted connector ──────────────────────────────────────────────

/// One connection opened by the feed, scripted by the test.
struct Conn {
    sink: EventSink,
    driver: Mutex<ConnectionDriver>,
    opened_at: Instant,
    failed_at: Mutex<Option<Instant>>,
}

impl Conn {
    fn open(&self) {
        self.driver.lock().unwrap().mark_open();
        self.sink.emit(TransportEvent::Opened);
    }

    fn message(&self, raw: &Value) {
        self.sink.emit(TransportEvent::Message(raw.to_string()));
    }

    fn raw(&self, text: &str) {
        self.sink.emit(TransportEvent::Message(text.to_owned()));
    }

    fn fail(&self) {
        self.driver.lock().unwrap().mark_closed();
        *self.failed_at.lock().unwrap() = Some(Instant::now());
        self.sink
            .emit(TransportEvent::Error("connection refused".into()));
    }

    fn close(&self) {
        self.driver.lock().unwrap().mark_closed();
        *self.failed_at.lock().unwrap() = Some(Instant::now());
        self.sink.emit(TransportEvent::Closed {
            code: Some(1006),
            reason: "abnormal closure".into(),
        });
    }

    fn is_cancelled(&self) -> bool {
        self.driver.lock().unwrap().is_cancelled()
    }

    fn sent(&self) -> Vec<String> {
        let mut driver = self.driver.lock().unwrap();
        std::iter::from_fn(|| driver.try_next_outbound()).collect()
    }
}

struct ScriptedConnector {
    conns: Mutex<Vec<Arc<Conn>>>,
    opened: watch::Sender<usize>,
}

impl ScriptedConnector {
    fn new() -> Arc<Self> {
        let (opened, _) = watch::channel(0);
        Arc::new(Self {
            conns: Mutex::new(Vec::new()),
            opened,
        })
    }

    fn count(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    fn conn(&self, index: usize) -> Arc<Conn> {
        Arc::clone(&self.conns.lock().unwrap()[index])
    }

    /// Wait (advancing the paused clock as needed) until `n` connections
    /// have been opened, and return the newest.
    async fn wait_for(&self, n: usize) -> Arc<Conn> {
        let mut rx = self.opened.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
        settle().await;
        self.conn(n - 1)
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _url: &Url, sink: EventSink) -> ConnectionHandle {
        let (handle, driver) = ConnectionHandle::pair(sink.generation());
        self.conns.lock().unwrap().push(Arc::new(Conn {
            sink,
            driver: Mutex::new(driver),
            opened_at: Instant::now(),
            failed_at: Mutex::new(None),
        }));
        self.opened.send_modify(|n| *n += 1);
        handle
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Let the supervisor drain everything queued without moving the clock.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn config(max_attempts: u32) -> FeedConfig {
    let mut cfg = FeedConfig::new(Url::parse("ws://feed.test/ws").unwrap());
    cfg.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(1000),
        max_delay: Duration::from_millis(30_000),
        max_attempts,
    };
    cfg
}

fn generic_config() -> FeedConfig {
    let mut cfg = config(5);
    cfg.layout = SectionLayout::new(vec![
        SectionRule::fast("fast"),
        SectionRule::slow("slow", Validity::NonNull),
    ]);
    cfg
}

async fn started(cfg: FeedConfig) -> (Feed, Arc<ScriptedConnector>) {
    let connector = ScriptedConnector::new();
    let feed = Feed::with_connector(cfg, Arc::clone(&connector) as Arc<dyn Connector>);
    feed.start().await.unwrap();
    settle().await;
    (feed, connector)
}

fn tick(n: u64) -> Value {
    json!({ "kind": "dashboard_update", "data": { "market_data": { "btc": { "n": n } } } })
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_start_opens_one_connection_and_is_idempotent() {
    let (feed, connector) = started(config(5)).await;
    assert_eq!(connector.count(), 1);
    assert_eq!(feed.link_state(), LinkState::Connecting { attempt: 0 });
    assert_eq!(feed.status(), Status::Loading);

    feed.start().await.unwrap();
    settle().await;
    assert_eq!(connector.count(), 1);

    connector.conn(0).open();
    settle().await;
    assert_eq!(feed.link_state(), LinkState::Open);
    assert_eq!(feed.status(), Status::Ready);
    assert_eq!(feed.stats().connections_opened, 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_rejects_invalid_config() {
    let mut cfg = config(5);
    cfg.url = Url::parse("http://feed.test/ws").unwrap();
    let feed = Feed::with_connector(cfg, ScriptedConnector::new());
    assert!(matches!(feed.start().await, Err(CoreError::Config { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_retry_and_closes_connection() {
    let (feed, connector) = started(config(5)).await;
    let conn = connector.conn(0);
    conn.open();
    settle().await;

    feed.stop().await;
    assert!(conn.is_cancelled());
    assert_eq!(feed.link_state(), LinkState::Idle);
    assert_eq!(feed.status(), Status::Loading);

    // A late close from the dead connection schedules nothing.
    conn.close();
    sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_prevents_reconnect() {
    let (feed, connector) = started(config(5)).await;
    connector.conn(0).fail();
    settle().await;
    assert_eq!(feed.link_state(), LinkState::Closed { attempt: 1 });

    feed.stop().await;
    sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_survives_restart() {
    let (feed, connector) = started(config(5)).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&tick(1));
    settle().await;

    assert_eq!(feed.status(), Status::Ready);
    feed.stop().await;
    assert_eq!(feed.status(), Status::Loading);
    assert_eq!(feed.snapshot().unwrap().sequence, 1);

    feed.start().await.unwrap();
    settle().await;

    assert_eq!(connector.count(), 2);
    assert_eq!(feed.snapshot().unwrap().sequence, 1);
}

// ── Reconnection ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_three_failures_then_success_backs_off_exponentially() {
    let (feed, connector) = started(config(5)).await;

    for n in 1..=3 {
        connector.conn(n - 1).fail();
        connector.wait_for(n + 1).await;
    }

    let delays: Vec<u128> = (1..=3)
        .map(|n| {
            let failed = connector.conn(n - 1).failed_at.lock().unwrap().unwrap();
            (connector.conn(n).opened_at - failed).as_millis()
        })
        .collect();
    assert_eq!(delays, vec![2000, 4000, 8000]);
    assert_eq!(feed.link_state(), LinkState::Connecting { attempt: 3 });

    connector.conn(3).open();
    settle().await;
    assert_eq!(feed.status(), Status::Ready);
    assert_eq!(feed.link_state(), LinkState::Open);
    assert_eq!(feed.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_backoff() {
    let (_feed, connector) = started(config(5)).await;
    connector.conn(0).fail();
    let conn = connector.wait_for(2).await;
    conn.open();
    settle().await;

    conn.close();
    let next = connector.wait_for(3).await;
    let failed = conn.failed_at.lock().unwrap().unwrap();
    assert_eq!((next.opened_at - failed).as_millis(), 2000);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_is_terminal_until_manual_retry() {
    let (feed, connector) = started(config(2)).await;

    connector.conn(0).fail();
    connector.wait_for(2).await.fail();
    connector.wait_for(3).await.fail();
    settle().await;

    assert_eq!(feed.link_state(), LinkState::Failed);
    assert_eq!(feed.status(), Status::Error);
    assert_eq!(
        feed.last_error(),
        Some(CoreError::ExhaustedRetries { attempts: 2 })
    );

    // No retry ever fires on its own.
    sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.count(), 3);
    assert_eq!(feed.status(), Status::Error);

    feed.retry().await;
    let conn = connector.wait_for(4).await;
    assert_eq!(feed.status(), Status::Loading);
    assert_eq!(feed.last_error(), None);

    conn.open();
    settle().await;
    assert_eq!(feed.status(), Status::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_retry_is_ignored_unless_failed() {
    let (feed, connector) = started(config(5)).await;
    connector.conn(0).open();
    settle().await;

    feed.retry().await;
    settle().await;
    assert_eq!(connector.count(), 1);
    assert_eq!(feed.link_state(), LinkState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_events_from_superseded_connection_are_dropped() {
    let (feed, connector) = started(generic_config()).await;
    let old = connector.conn(0);
    old.open();
    old.message(&json!({ "kind": "update", "data": { "fast": 1 } }));
    old.close();
    let current = connector.wait_for(2).await;
    current.open();
    settle().await;

    old.message(&json!({ "kind": "update", "data": { "fast": 99 } }));
    old.close();
    settle().await;

    let snap = feed.snapshot().unwrap();
    assert_eq!(snap.section("fast"), Some(&json!(1)));
    assert_eq!(feed.link_state(), LinkState::Open);
    assert_eq!(feed.stats().stale_events, 2);
}

// ── Status debouncing ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_close_then_quick_reconnect_never_shows_loading() {
    let (feed, connector) = started(config(5)).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&tick(1));
    settle().await;

    let mut status = feed.subscribe_status();
    status.mark_unchanged();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            while status.changed().await.is_ok() {
                seen.lock().unwrap().push(*status.borrow_and_update());
            }
        })
    };

    sleep(Duration::from_secs(1)).await;
    conn.close();
    settle().await;
    assert_eq!(feed.status(), Status::Ready);

    // Retry lands 2s after the close, inside the 5s window.
    connector.wait_for(2).await.open();
    settle().await;
    sleep(Duration::from_secs(30)).await;

    assert_eq!(feed.status(), Status::Ready);
    assert!(!seen.lock().unwrap().contains(&Status::Loading));
    recorder.abort();
}

#[tokio::test(start_paused = true)]
async fn test_close_after_fresh_data_shows_loading_after_window() {
    let mut cfg = config(5);
    cfg.reconnect.initial_delay = Duration::from_secs(10);
    cfg.reconnect.max_delay = Duration::from_secs(60);
    let (feed, connector) = started(cfg).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&tick(1));
    settle().await;

    sleep(Duration::from_secs(1)).await;
    conn.close();
    settle().await;
    assert_eq!(feed.status(), Status::Ready);

    sleep(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(feed.status(), Status::Ready);

    sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(feed.status(), Status::Loading);
    // Still retrying: not an error.
    assert_eq!(connector.count(), 1);
    assert!(feed.snapshot().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_close_long_after_data_shows_loading_immediately() {
    let (feed, connector) = started(config(5)).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&tick(1));
    settle().await;

    sleep(Duration::from_secs(10)).await;
    conn.close();
    settle().await;
    assert_eq!(feed.status(), Status::Loading);
}

#[tokio::test(start_paused = true)]
async fn test_close_without_snapshot_shows_loading_immediately() {
    let (feed, connector) = started(config(5)).await;
    let conn = connector.conn(0);
    conn.open();
    settle().await;
    assert_eq!(feed.status(), Status::Ready);

    conn.close();
    settle().await;
    assert_eq!(feed.status(), Status::Loading);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_right_after_fresh_data_waits_out_the_window() {
    let mut cfg = config(1);
    cfg.reconnect.initial_delay = Duration::from_millis(100);
    let (feed, connector) = started(cfg).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&tick(1));
    settle().await;

    conn.close();
    settle().await;
    let closed_at = Instant::now();

    // The single retry fails 200ms into the outage.
    connector.wait_for(2).await.fail();
    settle().await;
    assert_eq!(feed.link_state(), LinkState::Failed);
    assert_eq!(
        feed.last_error(),
        Some(CoreError::ExhaustedRetries { attempts: 1 })
    );
    assert_eq!(feed.status(), Status::Ready);

    // Error shows once the window measured from the first close expires.
    sleep_until(closed_at + Duration::from_millis(4900)).await;
    settle().await;
    assert_eq!(feed.status(), Status::Ready);

    sleep_until(closed_at + Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(feed.status(), Status::Error);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(feed.status(), Status::Error);
    assert_eq!(connector.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_long_after_data_shows_error_immediately() {
    let (feed, connector) = started(config(0)).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&tick(1));
    settle().await;

    sleep(Duration::from_secs(10)).await;
    conn.close();
    settle().await;
    assert_eq!(feed.status(), Status::Error);
}

// ── Consolidation through the service ───────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_fast_replaced_and_slow_retained() {
    let (feed, connector) = started(generic_config()).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&json!({ "kind": "update", "data": { "fast": { "x": 1 }, "slow": null } }));
    conn.message(&json!({ "kind": "update", "data": { "fast": { "x": 2 } } }));
    settle().await;

    let snap = feed.snapshot().unwrap();
    assert_eq!(snap.section("fast"), Some(&json!({ "x": 2 })));
    assert_eq!(snap.section("slow"), None);
    assert_eq!(feed.stats().sections_rejected, 1);

    conn.message(&json!({ "kind": "update", "data": { "slow": { "v": 7 } } }));
    conn.message(&json!({ "kind": "update", "data": { "slow": null, "fast": 3 } }));
    conn.message(&json!({ "kind": "update", "data": { "fast": 4 } }));
    settle().await;

    let snap = feed.snapshot().unwrap();
    assert_eq!(snap.section("slow"), Some(&json!({ "v": 7 })));
    assert_eq!(snap.section("fast"), Some(&json!(4)));
    assert_eq!(feed.stats().envelopes_applied, 5);
}

#[tokio::test(start_paused = true)]
async fn test_macro_data_kept_until_cpi_has_value() {
    let (feed, connector) = started(config(5)).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&json!({ "type": "dashboard_update", "data": {
        "macro_data": {
            "cpi": { "name": "CPI", "value": "3.1" },
            "fed_rate": { "name": "Fed", "value": "5.3" },
            "unemployment": { "name": "U3", "value": "3.9" }
        }
    } }));
    conn.message(&json!({ "type": "dashboard_update", "data": {
        "macro_data": { "cpi": { "name": "CPI", "value": null } },
        "market_data": { "btc": { "price": 1.0, "volume_24h": 0.0, "open_interest": 0.0,
                                  "funding_rate": 0.0, "price_change_percent": 0.0 } }
    } }));
    settle().await;

    let dash = feed.snapshot().unwrap().dashboard().unwrap();
    assert_eq!(dash.macro_data.unwrap().cpi.value.as_deref(), Some("3.1"));
    assert_eq!(dash.market_data.unwrap()["btc"].price, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_message_leaves_snapshot_untouched() {
    let (feed, connector) = started(generic_config()).await;
    let conn = connector.conn(0);
    conn.open();
    conn.message(&json!({ "kind": "update", "data": { "fast": 1 } }));
    settle().await;
    let before = feed.snapshot().unwrap();
    let mut errors = feed.subscribe_errors();

    conn.raw("{not json");
    conn.message(&json!({ "data": { "fast": 2 } }));
    conn.message(&json!({ "kind": "update", "data": [1, 2] }));
    settle().await;

    let after = feed.snapshot().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(matches!(
        feed.last_error(),
        Some(CoreError::MalformedMessage { .. })
    ));
    assert_eq!(feed.stats().malformed_messages, 3);
    assert!(errors.has_changed().unwrap());
    assert!(errors.borrow_and_update().is_some());
    assert_eq!(feed.link_state(), LinkState::Open);
    assert_eq!(feed.status(), Status::Ready);

    conn.message(&json!({ "kind": "update", "data": { "fast": 3 } }));
    settle().await;
    assert_eq!(feed.last_error(), None);
    assert_eq!(feed.snapshot().unwrap().sequence, 2);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_subscription_sees_updates() {
    let (feed, connector) = started(config(5)).await;
    let mut stream = feed.subscribe_snapshot();
    assert!(stream.current().is_none());

    let conn = connector.conn(0);
    conn.open();
    conn.message(&tick(1));

    let snap = stream.changed().await.unwrap();
    assert_eq!(snap.sequence, 1);
}

// ── Sending ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_send_requires_open_connection() {
    let (feed, connector) = started(config(5)).await;
    let command = Command::new("subscribe", json!({ "symbols": ["btc"] }));

    assert_eq!(feed.send(&command), Err(CoreError::SendWhileDisconnected));

    let conn = connector.conn(0);
    conn.open();
    settle().await;
    feed.send(&command).unwrap();

    let sent = conn.sent();
    assert_eq!(sent.len(), 1);
    let frame: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(frame["kind"], "subscribe");
    assert_eq!(frame["data"]["symbols"][0], "btc");

    conn.close();
    settle().await;
    assert_eq!(feed.send(&command), Err(CoreError::SendWhileDisconnected));
}

// ── Isolation ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_independent_feeds_do_not_share_state() {
    let (a, conns_a) = started(config(5)).await;
    let (b, conns_b) = started(config(5)).await;

    conns_a.conn(0).open();
    conns_a.conn(0).message(&tick(1));
    conns_b.conn(0).fail();
    settle().await;

    assert!(a.snapshot().is_some());
    assert!(b.snapshot().is_none());
    assert_eq!(a.link_state(), LinkState::Open);
    assert_eq!(b.link_state(), LinkState::Closed { attempt: 1 });
}

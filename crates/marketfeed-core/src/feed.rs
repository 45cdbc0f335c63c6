// ── Feed service ──
//
// Owns one logical feed: a supervisor task drives the connector, folds
// inbound envelopes into the snapshot store, and publishes link state,
// status and errors through `watch` channels. All transitions happen on
// the supervisor's single select loop, so they are strictly ordered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use marketfeed_api::envelope::normalize_at;
use marketfeed_api::{
    Command, ConnectionHandle, Connector, EventSink, Generation, TaggedEvent, TransportEvent,
    WebSocketConnector,
};

use crate::config::FeedConfig;
use crate::error::CoreError;
use crate::reconnect::{CloseDecision, LinkState, ReconnectPolicy};
use crate::status::{Status, StatusTracker};
use crate::store::{Snapshot, SnapshotStore};
use crate::stream::SnapshotStream;

// ── Stats ────────────────────────────────────────────────────────────

/// Point-in-time counters for one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedStats {
    pub connections_opened: u64,
    pub envelopes_applied: u64,
    pub malformed_messages: u64,
    pub sections_rejected: u64,
    pub stale_events: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connections_opened: AtomicU64,
    envelopes_applied: AtomicU64,
    malformed_messages: AtomicU64,
    sections_rejected: AtomicU64,
    stale_events: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn load(&self) -> FeedStats {
        FeedStats {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            envelopes_applied: self.envelopes_applied.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            sections_rejected: self.sections_rejected.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
        }
    }
}

// ── Feed ─────────────────────────────────────────────────────────────

/// Requests from the consumer to the running supervisor.
#[derive(Debug)]
enum Control {
    Retry,
}

/// State shared between the consumer-facing handle and the supervisor.
struct Shared {
    config: FeedConfig,
    connector: Arc<dyn Connector>,
    store: SnapshotStore,
    status: watch::Sender<Status>,
    link_state: watch::Sender<LinkState>,
    last_error: watch::Sender<Option<CoreError>>,
    active: ArcSwapOption<ConnectionHandle>,
    counters: Counters,
}

struct Running {
    cancel: CancellationToken,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

struct FeedInner {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

/// A reconnecting, snapshot-consolidating market-data feed.
///
/// Cheaply cloneable via `Arc`. Independent instances never share state.
/// Dropping the last clone without calling [`stop()`](Self::stop) ends the
/// supervisor at its next wake-up.
#[derive(Clone)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

impl Feed {
    /// Create a feed backed by the WebSocket connector. Does NOT connect --
    /// call [`start()`](Self::start).
    pub fn new(config: FeedConfig) -> Self {
        let connector = WebSocketConnector::with_keepalive(config.keepalive_interval);
        Self::with_connector(config, Arc::new(connector))
    }

    /// Create a feed backed by a custom connector.
    pub fn with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(Status::Loading);
        let (link_state, _) = watch::channel(LinkState::Idle);
        let (last_error, _) = watch::channel(None);
        let store = SnapshotStore::new(config.layout.clone());

        Self {
            inner: Arc::new(FeedInner {
                shared: Arc::new(Shared {
                    config,
                    connector,
                    store,
                    status,
                    link_state,
                    last_error,
                    active: ArcSwapOption::empty(),
                    counters: Counters::default(),
                }),
                running: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.shared.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the supervisor and open the first connection.
    ///
    /// Idempotent while running. Fails only on invalid configuration.
    pub async fn start(&self) -> Result<(), CoreError> {
        let mut running = self.inner.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("feed already running");
            return Ok(());
        }
        self.inner.shared.config.validate()?;

        let cancel = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor::new(Arc::clone(&self.inner.shared), control_rx, cancel.clone());

        info!(url = %self.inner.shared.config.url, "starting feed");
        *running = Some(Running {
            cancel,
            control: control_tx,
            task: tokio::spawn(supervisor.run()),
        });
        Ok(())
    }

    /// Tear down: cancel pending timers, close the active connection, and
    /// wait for the supervisor to exit. The snapshot is kept, but the link
    /// reads `Idle` and the status `Loading` until the next `start`.
    pub async fn stop(&self) {
        let Some(running) = self.inner.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Some(handle) = self.inner.shared.active.swap(None) {
            handle.close();
        }
        if let Err(e) = running.task.await {
            warn!(error = %e, "feed supervisor ended abnormally");
        }
        self.inner.shared.link_state.send_replace(LinkState::Idle);
        self.inner.shared.status.send_replace(Status::Loading);
        debug!("feed stopped");
    }

    /// Manual retry after the policy gave up. No-op in any other state.
    pub async fn retry(&self) {
        if let Some(running) = self.inner.running.lock().await.as_ref() {
            let _ = running.control.send(Control::Retry);
        }
    }

    // ── Consumer API ─────────────────────────────────────────────

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.shared.store.snapshot()
    }

    pub fn status(&self) -> Status {
        *self.inner.shared.status.borrow()
    }

    pub fn link_state(&self) -> LinkState {
        *self.inner.shared.link_state.borrow()
    }

    pub fn last_error(&self) -> Option<CoreError> {
        self.inner.shared.last_error.borrow().clone()
    }

    /// Send a command over the active connection.
    ///
    /// Fails with [`CoreError::SendWhileDisconnected`] unless a connection
    /// is currently open. Never queues for later delivery.
    pub fn send(&self, command: &Command) -> Result<(), CoreError> {
        let active = self.inner.shared.active.load_full();
        let handle = active
            .as_deref()
            .filter(|h| h.is_open())
            .ok_or(CoreError::SendWhileDisconnected)?;
        let payload = command.encode()?;
        handle.send(payload)?;
        trace!(kind = %command.kind, "command sent");
        Ok(())
    }

    pub fn subscribe_snapshot(&self) -> SnapshotStream {
        self.inner.shared.store.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.inner.shared.status.subscribe()
    }

    pub fn subscribe_link_state(&self) -> watch::Receiver<LinkState> {
        self.inner.shared.link_state.subscribe()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<CoreError>> {
        self.inner.shared.last_error.subscribe()
    }

    pub fn stats(&self) -> FeedStats {
        self.inner.shared.counters.load()
    }
}

// ── Supervisor ───────────────────────────────────────────────────────

struct Supervisor {
    shared: Arc<Shared>,
    policy: ReconnectPolicy,
    tracker: StatusTracker,
    generation: Generation,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    cancel: CancellationToken,
    retry_at: Option<Instant>,
    recheck_at: Option<Instant>,
}

impl Supervisor {
    fn new(
        shared: Arc<Shared>,
        control_rx: mpsc::UnboundedReceiver<Control>,
        cancel: CancellationToken,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::new(shared.config.reconnect.clone());
        let tracker = StatusTracker::new(shared.config.debounce_window, Instant::now());

        Self {
            shared,
            policy,
            tracker,
            generation: 0,
            events_tx,
            events_rx,
            control_rx,
            cancel,
            retry_at: None,
            recheck_at: None,
        }
    }

    async fn run(mut self) {
        if self.policy.start() {
            self.open_connection(0);
        }
        self.refresh_status();

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                ctrl = self.control_rx.recv() => match ctrl {
                    Some(Control::Retry) => self.on_manual_retry(),
                    // Every Feed handle is gone.
                    None => break,
                },

                Some(tagged) = self.events_rx.recv() => self.on_event(tagged),

                () = sleep_until_opt(self.retry_at) => {
                    self.retry_at = None;
                    if let Some(attempt) = self.policy.on_retry_due() {
                        self.open_connection(attempt);
                    }
                }

                () = sleep_until_opt(self.recheck_at) => {
                    self.recheck_at = None;
                    self.refresh_status();
                }
            }
        }

        self.policy.stop();
        if let Some(handle) = self.shared.active.swap(None) {
            handle.close();
        }
        debug!(generation = self.generation, "feed supervisor exited");
    }

    // ── Connection management ────────────────────────────────────

    fn open_connection(&mut self, attempt: u32) {
        self.generation += 1;
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        let handle = self.shared.connector.open(&self.shared.config.url, sink);

        if let Some(previous) = self.shared.active.swap(Some(Arc::new(handle))) {
            previous.close();
        }
        self.shared
            .link_state
            .send_replace(LinkState::Connecting { attempt });
        debug!(generation = self.generation, attempt, "opening feed connection");
    }

    fn on_event(&mut self, tagged: TaggedEvent) {
        if tagged.generation != self.generation {
            Counters::bump(&self.shared.counters.stale_events, 1);
            trace!(
                generation = tagged.generation,
                current = self.generation,
                "dropping event from superseded connection"
            );
            return;
        }

        match tagged.event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Closed { code, reason } => {
                let reason = match code {
                    Some(code) => format!("closed (code {code}): {reason}"),
                    None => format!("closed: {reason}"),
                };
                self.on_disconnect(reason);
            }
            TransportEvent::Error(reason) => self.on_disconnect(reason),
        }
    }

    fn on_open(&mut self) {
        if !self.policy.on_open() {
            return;
        }
        self.tracker.link_up();
        self.shared.link_state.send_replace(LinkState::Open);
        Counters::bump(&self.shared.counters.connections_opened, 1);
        self.clear_error();
        info!(generation = self.generation, "feed connected");
        self.refresh_status();
    }

    fn on_message(&mut self, text: &str) {
        match normalize_at(text, Utc::now()) {
            Ok(envelope) => {
                let outcome = self.shared.store.apply(&envelope);
                let counters = &self.shared.counters;
                Counters::bump(&counters.envelopes_applied, 1);
                if !outcome.rejected.is_empty() {
                    debug!(
                        kind = %envelope.kind,
                        sections = ?outcome.rejected,
                        "retaining last valid value for slow sections"
                    );
                    let rejected = u64::try_from(outcome.rejected.len()).unwrap_or(u64::MAX);
                    Counters::bump(&counters.sections_rejected, rejected);
                }
                self.tracker.record_update(Instant::now());
                self.clear_error();
                self.refresh_status();
            }
            Err(e) => {
                Counters::bump(&self.shared.counters.malformed_messages, 1);
                warn!(generation = self.generation, error = %e, "discarding malformed message");
                self.set_error(CoreError::from(e));
            }
        }
    }

    fn on_disconnect(&mut self, reason: String) {
        let now = Instant::now();
        match self.policy.on_close() {
            CloseDecision::Retry { attempt, delay } => {
                self.drop_active();
                self.tracker.link_down(now);
                self.retry_at = Some(now + delay);
                self.shared
                    .link_state
                    .send_replace(LinkState::Closed { attempt });
                info!(
                    generation = self.generation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason = %reason,
                    "feed disconnected, scheduling reconnect"
                );
                self.set_error(CoreError::Transport { reason });
            }
            CloseDecision::GiveUp { attempts } => {
                self.drop_active();
                self.tracker.link_failed(now);
                self.retry_at = None;
                self.shared.link_state.send_replace(LinkState::Failed);
                error!(attempts, reason = %reason, "feed reconnection attempts exhausted");
                self.set_error(CoreError::ExhaustedRetries { attempts });
            }
            CloseDecision::Ignore => {
                trace!(generation = self.generation, "ignoring duplicate close");
                return;
            }
        }
        self.refresh_status();
    }

    fn on_manual_retry(&mut self) {
        if !self.policy.reset() {
            debug!(state = %self.policy.state(), "manual retry ignored");
            return;
        }
        info!("manual retry requested");
        self.tracker.link_retrying(Instant::now());
        self.shared.last_error.send_replace(None);
        self.open_connection(0);
        self.refresh_status();
    }

    fn drop_active(&self) {
        if let Some(handle) = self.shared.active.swap(None) {
            handle.close();
        }
    }

    // ── Published state ──────────────────────────────────────────

    fn refresh_status(&mut self) {
        let eval = self.tracker.evaluate(Instant::now());
        self.recheck_at = eval.recheck_at;
        self.shared.status.send_if_modified(|status| {
            if *status == eval.status {
                return false;
            }
            debug!(from = %status, to = %eval.status, "feed status changed");
            *status = eval.status;
            true
        });
    }

    fn set_error(&self, err: CoreError) {
        self.shared.last_error.send_replace(Some(err));
    }

    /// Clear any recoverable error; exhaustion persists until a manual retry.
    fn clear_error(&self) {
        self.shared.last_error.send_if_modified(|current| {
            if current.as_ref().is_some_and(|e| !e.is_terminal()) {
                *current = None;
                return true;
            }
            false
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

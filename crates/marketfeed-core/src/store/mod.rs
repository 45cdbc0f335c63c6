// ── Snapshot store ──
//
// Consolidates normalized envelopes into one published snapshot.
// Readers get an `Arc<Snapshot>` that never changes underneath them.

mod layout;
mod snapshot;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::trace;

use marketfeed_api::Envelope;

use crate::stream::SnapshotStream;

pub use layout::{SectionKind, SectionLayout, SectionRule, Validity};
pub use snapshot::Snapshot;

/// Result of folding one envelope.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub snapshot: Arc<Snapshot>,
    /// Slow sections that were present but failed their validity check.
    pub rejected: Vec<String>,
}

/// Holds the current snapshot and folds envelopes into it.
///
/// Callers must serialize `apply` (the feed supervisor is the only writer).
/// Each fold becomes visible to readers as a single atomic swap.
pub struct SnapshotStore {
    layout: SectionLayout,
    current: watch::Sender<Option<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new(layout: SectionLayout) -> Self {
        let (current, _) = watch::channel(None);
        Self { layout, current }
    }

    pub fn layout(&self) -> &SectionLayout {
        &self.layout
    }

    /// Fold `envelope` over the current snapshot and publish the result.
    pub fn apply(&self, envelope: &Envelope) -> ApplyOutcome {
        let previous = self.current.borrow().clone();
        let (next, rejected) = snapshot::fold(previous.as_deref(), envelope, &self.layout);
        let next = Arc::new(next);
        trace!(
            kind = %envelope.kind,
            sequence = next.sequence,
            sections = envelope.data.len(),
            rejected = rejected.len(),
            "envelope folded"
        );
        self.current.send_replace(Some(Arc::clone(&next)));
        ApplyOutcome {
            snapshot: next,
            rejected,
        }
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.current.subscribe())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(SectionLayout::dashboard())
    }
}

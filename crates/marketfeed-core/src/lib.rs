// marketfeed-core: Reconnecting feed service between marketfeed-api and consumers (CLI).

pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod reconnect;
pub mod status;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{DEFAULT_FEED_URL, FeedConfig, ReconnectConfig};
pub use error::CoreError;
pub use feed::{Feed, FeedStats};
pub use reconnect::{CloseDecision, LinkState, ReconnectPolicy, backoff_delay};
pub use status::{Evaluation, LinkPhase, Status, StatusTracker};
pub use store::{
    ApplyOutcome, SectionKind, SectionLayout, SectionRule, Snapshot, SnapshotStore, Validity,
};
pub use stream::{SnapshotStream, SnapshotWatchStream};

// Transport types consumers need to drive or fake a feed.
pub use marketfeed_api::{Command, Connector, Envelope};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Dashboard, LiquidationPosition, MacroData, MacroDataPoint, MarketData, MarketMetric,
    PositionSide, RecentLiquidation, RecentTrade, TradeSide,
};

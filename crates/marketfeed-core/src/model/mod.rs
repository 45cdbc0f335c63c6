// ── Dashboard domain model ──
//
// Typed views over the sections of a market dashboard snapshot. The
// consolidator stores sections as raw JSON; these types are decoded on
// demand via `Snapshot::section_as` so unknown upstream fields never
// break the merge path.

pub mod liquidation;
pub mod macro_data;
pub mod market;
pub mod trade;

/// Section names carried by the dashboard feed.
pub mod sections {
    pub const MARKET_DATA: &str = "market_data";
    pub const LIQUIDATION_POSITIONS: &str = "liquidation_positions";
    pub const RECENT_LIQUIDATIONS: &str = "recent_liquidations";
    pub const RECENT_LARGE_TRADES: &str = "recent_large_trades";
    pub const MACRO_DATA: &str = "macro_data";
}

// ── Re-exports ──────────────────────────────────────────────────────

pub use liquidation::{LiquidationPosition, PositionSide, RecentLiquidation};
pub use macro_data::{MacroData, MacroDataPoint};
pub use market::{MarketData, MarketMetric};
pub use trade::{RecentTrade, TradeSide};

use serde::{Deserialize, Serialize};

/// All dashboard sections decoded at once. Absent sections are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub market_data: Option<MarketData>,
    pub liquidation_positions: Option<Vec<LiquidationPosition>>,
    pub recent_liquidations: Option<Vec<RecentLiquidation>>,
    pub recent_large_trades: Option<Vec<RecentTrade>>,
    pub macro_data: Option<MacroData>,
}

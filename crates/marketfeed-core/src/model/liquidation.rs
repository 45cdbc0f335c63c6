// ── Liquidation domain types ──

use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// An open leveraged position close to its liquidation price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationPosition {
    pub coin: String,
    pub value: f64,
    pub entry: f64,
    pub liquidation: f64,
    /// Distance from the current price to liquidation, in percent.
    pub distance: f64,
    pub leverage: f64,
}

/// A liquidation that already happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentLiquidation {
    pub coin: String,
    pub side: PositionSide,
    pub size: f64,
    pub price: f64,
    pub value_usd: f64,
    pub timestamp: String,
}

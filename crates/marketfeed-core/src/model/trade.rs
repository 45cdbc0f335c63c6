// ── Large trade prints ──

use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTrade {
    pub id: String,
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub side: TradeSide,
    pub timestamp: String,
    pub value_usd: f64,
}

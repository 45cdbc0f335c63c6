// ── Per-asset market metrics ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Market metrics keyed by lowercase asset symbol (`btc`, `eth`, ...).
pub type MarketData = BTreeMap<String, MarketMetric>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketMetric {
    pub price: f64,
    pub volume_24h: f64,
    pub open_interest: f64,
    pub funding_rate: f64,
    pub price_change_percent: f64,

    // Top of book
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_price: Option<f64>,
}

impl MarketMetric {
    /// Mid price from the top of book, when both sides are known.
    pub fn mid_price(&self) -> Option<f64> {
        Some(f64::midpoint(self.bid_price?, self.ask_price?))
    }
}

//! `snapshot`: wait for the first consolidated snapshot and print it.

use tabled::Tabled;

use marketfeed_core::{Dashboard, Feed, PositionSide, TradeSide};

use crate::cli::{GlobalOpts, SnapshotArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Dashboard view ───────────────────────────────────────────────────

#[derive(Tabled)]
struct MarketRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "24h")]
    change: String,
    #[tabled(rename = "Funding")]
    funding: String,
    #[tabled(rename = "Open Interest")]
    open_interest: String,
    #[tabled(rename = "Mid")]
    mid: String,
}

#[derive(Tabled)]
struct IndicatorRow {
    #[tabled(rename = "Indicator")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "As Of")]
    date: String,
}

/// Compact dollar amount: `$1.25M`, `$980.0K`, `$12`.
fn usd(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1e9 {
        format!("${:.2}B", value / 1e9)
    } else if abs >= 1e6 {
        format!("${:.2}M", value / 1e6)
    } else if abs >= 1e3 {
        format!("${:.1}K", value / 1e3)
    } else {
        format!("${value:.0}")
    }
}

fn dashboard_detail(dash: &Dashboard) -> String {
    let mut blocks = Vec::new();

    if let Some(markets) = dash.market_data.as_ref().filter(|m| !m.is_empty()) {
        let rows: Vec<MarketRow> = markets
            .iter()
            .map(|(asset, m)| MarketRow {
                asset: asset.to_uppercase(),
                price: format!("{:.2}", m.price),
                change: format!("{:+.2}%", m.price_change_percent),
                funding: format!("{:.4}%", m.funding_rate * 100.0),
                open_interest: usd(m.open_interest),
                mid: m.mid_price().map_or_else(|| "-".into(), |p| format!("{p:.2}")),
            })
            .collect();
        blocks.push(output::render_table(&rows));
    }

    if let Some(macro_data) = &dash.macro_data {
        let rows: Vec<IndicatorRow> = macro_data
            .indicators()
            .into_iter()
            .map(|point| IndicatorRow {
                name: point.name.clone(),
                value: if point.is_available() {
                    point.value.clone().unwrap_or_default()
                } else {
                    point.error.clone().unwrap_or_else(|| "n/a".into())
                },
                date: point.date.clone().unwrap_or_else(|| "-".into()),
            })
            .collect();
        blocks.push(output::render_table(&rows));
    }

    if let Some(positions) = &dash.liquidation_positions {
        let closest = positions.iter().min_by(|a, b| a.distance.total_cmp(&b.distance));
        let mut line = format!("Positions near liquidation: {}", positions.len());
        if let Some(p) = closest {
            line.push_str(&format!(
                " (closest {} {:.2}% away, {} at {:.0}x)",
                p.coin,
                p.distance,
                usd(p.value),
                p.leverage
            ));
        }
        blocks.push(line);
    }

    if let Some(liquidations) = &dash.recent_liquidations {
        let (long, short) = liquidations.iter().fold((0.0, 0.0), |(l, s), liq| match liq.side {
            PositionSide::Long => (l + liq.value_usd, s),
            PositionSide::Short => (l, s + liq.value_usd),
        });
        blocks.push(format!(
            "Recent liquidations: {} (long {}, short {})",
            liquidations.len(),
            usd(long),
            usd(short)
        ));
    }

    if let Some(trades) = &dash.recent_large_trades {
        let (buy, sell) = trades.iter().fold((0.0, 0.0), |(b, s), t| match t.side {
            TradeSide::Buy => (b + t.value_usd, s),
            TradeSide::Sell => (b, s + t.value_usd),
        });
        blocks.push(format!(
            "Large trades: {} (buy {}, sell {})",
            trades.len(),
            usd(buy),
            usd(sell)
        ));
    }

    if blocks.is_empty() {
        return "(no dashboard sections yet)".into();
    }
    blocks.join("\n\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(feed: &Feed, args: SnapshotArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let snapshot = super::util::wait_for_snapshot(feed, config::wait_timeout(global)).await?;

    let out = if args.dashboard {
        let dash = snapshot.dashboard()?;
        output::render_single(global.output, &dash, dashboard_detail)
    } else if let Some(name) = args.section {
        let value = snapshot
            .section(&name)
            .ok_or_else(|| CliError::SectionNotFound {
                available: snapshot
                    .sections
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
                name: name.clone(),
            })?;
        output::render_single(global.output, value, output::render_json_pretty)
    } else {
        output::render_single(global.output, &*snapshot, |s| {
            output::snapshot_table(s, &feed.config().layout)
        })
    };

    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Dashboard {
        serde_json::from_value(json!({
            "market_data": {
                "btc": {
                    "price": 64000.5, "volume_24h": 1.0e9, "open_interest": 2.5e9,
                    "funding_rate": 0.0001, "price_change_percent": 1.5,
                    "bid_price": 64000.0, "ask_price": 64001.0
                }
            },
            "macro_data": {
                "cpi": { "name": "CPI", "value": "3.1", "date": "2024-04" },
                "fed_rate": { "name": "Fed Funds", "value": null, "error": "rate limited" },
                "unemployment": { "name": "Unemployment", "value": "3.9" }
            },
            "liquidation_positions": [
                { "coin": "ETH", "value": 2.0e6, "entry": 3000.0, "liquidation": 2900.0,
                  "distance": 3.3, "leverage": 20.0 },
                { "coin": "BTC", "value": 1.2e6, "entry": 64000.0, "liquidation": 63000.0,
                  "distance": 1.6, "leverage": 50.0 }
            ],
            "recent_liquidations": [
                { "coin": "BTC", "side": "long", "size": 1.0, "price": 60000.0,
                  "value_usd": 60000.0, "timestamp": "t1" },
                { "coin": "ETH", "side": "short", "size": 10.0, "price": 3000.0,
                  "value_usd": 30000.0, "timestamp": "t2" }
            ],
            "recent_large_trades": [
                { "id": "1", "symbol": "BTC", "price": 64000.0, "size": 20.0, "side": "buy",
                  "timestamp": "t3", "value_usd": 1.28e6 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn usd_scales_units() {
        assert_eq!(usd(1_250_000.0), "$1.25M");
        assert_eq!(usd(980.0), "$980");
        assert_eq!(usd(45_500.0), "$45.5K");
        assert_eq!(usd(3.2e9), "$3.20B");
    }

    #[test]
    fn detail_renders_every_dashboard_block() {
        let text = dashboard_detail(&sample());
        assert!(text.contains("BTC"));
        assert!(text.contains("+1.50%"));
        assert!(text.contains("64000.50"));
        assert!(text.contains("rate limited"));
        assert!(text.contains("Positions near liquidation: 2 (closest BTC 1.60% away, $1.20M at 50x)"));
        assert!(text.contains("Recent liquidations: 2 (long $60.0K, short $30.0K)"));
        assert!(text.contains("Large trades: 1 (buy $1.28M, sell $0)"));
    }

    #[test]
    fn detail_without_sections() {
        assert_eq!(dashboard_detail(&Dashboard::default()), "(no dashboard sections yet)");
    }
}

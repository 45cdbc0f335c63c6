// ── Consolidated snapshot ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use marketfeed_api::Envelope;

use super::layout::{SectionKind, SectionLayout};
use crate::error::CoreError;
use crate::model::{Dashboard, sections};

/// Merged view of every section seen so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// `kind` of the envelope that produced this snapshot.
    pub kind: String,
    pub sections: BTreeMap<String, Value>,
    /// Receive time of the envelope that produced this snapshot.
    pub updated_at: DateTime<Utc>,
    /// Number of envelopes folded so far, starting at 1.
    pub sequence: u64,
}

impl Snapshot {
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }

    /// Decode a section into a typed model. Absent or `null` gives `Ok(None)`.
    pub fn section_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CoreError> {
        match self.sections.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value)
                .map(Some)
                .map_err(|e| CoreError::SectionDecode {
                    section: name.to_owned(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Decode every dashboard section.
    pub fn dashboard(&self) -> Result<Dashboard, CoreError> {
        Ok(Dashboard {
            market_data: self.section_as(sections::MARKET_DATA)?,
            liquidation_positions: self.section_as(sections::LIQUIDATION_POSITIONS)?,
            recent_liquidations: self.section_as(sections::RECENT_LIQUIDATIONS)?,
            recent_large_trades: self.section_as(sections::RECENT_LARGE_TRADES)?,
            macro_data: self.section_as(sections::MACRO_DATA)?,
        })
    }
}

/// Pure merge step: previous snapshot + envelope → next snapshot.
///
/// Returns the names of slow sections rejected by their validity rule.
pub(super) fn fold(
    previous: Option<&Snapshot>,
    envelope: &Envelope,
    layout: &SectionLayout,
) -> (Snapshot, Vec<String>) {
    let mut sections = previous.map(|s| s.sections.clone()).unwrap_or_default();
    let mut rejected = Vec::new();

    for (name, value) in &envelope.data {
        match layout.rule(name) {
            Some(rule) if rule.kind == SectionKind::Slow => {
                if rule.validity().accepts(value) {
                    sections.insert(name.clone(), value.clone());
                } else {
                    rejected.push(name.clone());
                }
            }
            _ => {
                sections.insert(name.clone(), value.clone());
            }
        }
    }

    let snapshot = Snapshot {
        kind: envelope.kind.clone(),
        sections,
        updated_at: envelope.received_at,
        sequence: previous.map_or(1, |s| s.sequence + 1),
    };
    (snapshot, rejected)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::MacroData;
    use crate::store::{SectionRule, Validity};
    use marketfeed_api::envelope::normalize_at;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn envelope(raw: Value) -> Envelope {
        normalize_at(&raw.to_string(), Utc::now()).unwrap()
    }

    fn fold_all(layout: &SectionLayout, raws: Vec<Value>) -> Snapshot {
        let mut current: Option<Snapshot> = None;
        for raw in raws {
            let (next, _) = fold(current.as_ref(), &envelope(raw), layout);
            current = Some(next);
        }
        current.unwrap()
    }

    fn generic_layout() -> SectionLayout {
        SectionLayout::new(vec![
            SectionRule::fast("fast"),
            SectionRule::slow("slow", Validity::NonNull),
        ])
    }

    #[test]
    fn fast_replaced_and_slow_never_observed_stays_absent() {
        let snap = fold_all(
            &generic_layout(),
            vec![
                json!({ "kind": "update", "data": { "fast": { "x": 1 }, "slow": null } }),
                json!({ "kind": "update", "data": { "fast": { "x": 2 } } }),
            ],
        );
        assert_eq!(snap.section("fast"), Some(&json!({ "x": 2 })));
        assert_eq!(snap.section("slow"), None);
        assert_eq!(snap.sequence, 2);
    }

    #[test]
    fn slow_retains_last_valid_value() {
        let snap = fold_all(
            &generic_layout(),
            vec![
                json!({ "kind": "update", "data": { "slow": { "v": 1 } } }),
                json!({ "kind": "update", "data": { "slow": null } }),
                json!({ "kind": "update", "data": { "fast": 3 } }),
                json!({ "kind": "update", "data": { "slow": null, "fast": 4 } }),
            ],
        );
        assert_eq!(snap.section("slow"), Some(&json!({ "v": 1 })));
        assert_eq!(snap.section("fast"), Some(&json!(4)));
    }

    #[test]
    fn slow_replaced_by_newer_valid_value() {
        let snap = fold_all(
            &generic_layout(),
            vec![
                json!({ "kind": "update", "data": { "slow": 1 } }),
                json!({ "kind": "update", "data": { "slow": 2 } }),
            ],
        );
        assert_eq!(snap.section("slow"), Some(&json!(2)));
    }

    #[test]
    fn unknown_section_merges_as_fast_and_is_retained() {
        let snap = fold_all(
            &generic_layout(),
            vec![
                json!({ "kind": "update", "data": { "extra": [1] } }),
                json!({ "kind": "update", "data": { "fast": 1 } }),
            ],
        );
        assert_eq!(snap.section("extra"), Some(&json!([1])));
    }

    #[test]
    fn macro_data_requires_cpi_value() {
        let layout = SectionLayout::dashboard();
        let valid = json!({
            "cpi": { "name": "CPI", "value": "3.1" },
            "fed_rate": { "name": "Fed", "value": "5.3" },
            "unemployment": { "name": "U3", "value": "3.9" }
        });
        let snap = fold_all(
            &layout,
            vec![
                json!({ "kind": "dashboard_update", "data": { "macro_data": valid.clone() } }),
                json!({ "kind": "dashboard_update", "data": {
                    "macro_data": { "cpi": { "name": "CPI", "value": null } }
                } }),
            ],
        );
        assert_eq!(snap.section("macro_data"), Some(&valid));

        let typed: MacroData = snap.section_as("macro_data").unwrap().unwrap();
        assert_eq!(typed.cpi.value.as_deref(), Some("3.1"));
    }

    #[test]
    fn kind_and_time_track_latest_envelope() {
        let snap = fold_all(
            &generic_layout(),
            vec![
                json!({ "kind": "initial", "data": {} }),
                json!({ "kind": "update", "data": {} }),
            ],
        );
        assert_eq!(snap.kind, "update");
    }

    #[test]
    fn section_as_reports_decode_errors() {
        let snap = fold_all(
            &SectionLayout::dashboard(),
            vec![json!({ "kind": "update", "data": { "recent_large_trades": "oops" } })],
        );
        let err = snap.dashboard().unwrap_err();
        assert!(matches!(err, CoreError::SectionDecode { section, .. } if section == "recent_large_trades"));
    }

    #[test]
    fn dashboard_decodes_present_sections() {
        let snap = fold_all(
            &SectionLayout::dashboard(),
            vec![json!({ "kind": "update", "data": {
                "recent_liquidations": [{
                    "coin": "BTC", "side": "long", "size": 1.5,
                    "price": 60000.0, "value_usd": 90000.0, "timestamp": "2024-05-01T00:00:00Z"
                }],
                "liquidation_positions": null
            } })],
        );
        let dash = snap.dashboard().unwrap();
        assert_eq!(dash.recent_liquidations.map(|l| l.len()), Some(1));
        assert!(dash.liquidation_positions.is_none());
        assert!(dash.market_data.is_none());
    }
}

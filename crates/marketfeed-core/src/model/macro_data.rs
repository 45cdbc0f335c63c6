// ── Macro-economic indicators ──
//
// Sourced from a slow upstream poll. Individual indicators may carry an
// `error` instead of a value; the section as a whole only counts as valid
// once CPI has a value (see `SectionLayout::dashboard`).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDataPoint {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MacroDataPoint {
    pub fn is_available(&self) -> bool {
        self.value.is_some() && self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroData {
    pub cpi: MacroDataPoint,
    pub fed_rate: MacroDataPoint,
    pub unemployment: MacroDataPoint,

    // Commodities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wti_oil: Option<MacroDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brent_oil: Option<MacroDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_gas: Option<MacroDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copper: Option<MacroDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corn: Option<MacroDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheat: Option<MacroDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coffee: Option<MacroDataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar: Option<MacroDataPoint>,
}

impl MacroData {
    /// All present indicators in display order.
    pub fn indicators(&self) -> Vec<&MacroDataPoint> {
        let mut out = vec![&self.cpi, &self.fed_rate, &self.unemployment];
        out.extend(
            [
                &self.wti_oil,
                &self.brent_oil,
                &self.natural_gas,
                &self.copper,
                &self.corn,
                &self.wheat,
                &self.coffee,
                &self.sugar,
            ]
            .into_iter()
            .flatten(),
        );
        out
    }
}

/// Upstream sends indicator values as strings, but numbers show up too.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

// ── Section layout ──
//
// Declares which top-level payload sections are fast-changing (replaced
// whenever present) and which are slow-changing (retained until a new
// *valid* value arrives). Sections not named here are treated as fast.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::model::sections;

/// How a section merges into the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Replaced unconditionally whenever the payload includes it.
    Fast,
    /// Replaced only by a valid value; retained when absent or invalid.
    Slow,
}

/// Validity predicate for a slow section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Validity {
    /// Any value, including `null`.
    Always,
    /// Anything but `null`.
    #[default]
    NonNull,
    /// The JSON pointer must resolve to a non-null value,
    /// e.g. `/cpi/value` for macro indicators.
    RequireField { pointer: String },
}

impl Validity {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Always => true,
            Self::NonNull => !value.is_null(),
            Self::RequireField { pointer } => value.pointer(pointer).is_some_and(|v| !v.is_null()),
        }
    }
}

/// Merge rule for one named section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRule {
    pub name: String,
    pub kind: SectionKind,
    /// Only meaningful for slow sections; defaults to [`Validity::NonNull`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<Validity>,
}

impl SectionRule {
    pub fn fast(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SectionKind::Fast,
            validity: None,
        }
    }

    pub fn slow(name: impl Into<String>, validity: Validity) -> Self {
        Self {
            name: name.into(),
            kind: SectionKind::Slow,
            validity: Some(validity),
        }
    }

    /// Effective validity predicate (slow sections only).
    pub fn validity(&self) -> Validity {
        self.validity.clone().unwrap_or_default()
    }
}

/// The full set of section rules for a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionLayout {
    rules: Vec<SectionRule>,
}

impl SectionLayout {
    pub fn new(rules: Vec<SectionRule>) -> Self {
        Self { rules }
    }

    /// Layout of the market dashboard feed.
    ///
    /// Trading sections refresh on every tick. Macro indicators come from a
    /// low-frequency upstream poll and are only trusted once CPI has a value.
    pub fn dashboard() -> Self {
        Self::new(vec![
            SectionRule::fast(sections::MARKET_DATA),
            SectionRule::fast(sections::LIQUIDATION_POSITIONS),
            SectionRule::fast(sections::RECENT_LIQUIDATIONS),
            SectionRule::fast(sections::RECENT_LARGE_TRADES),
            SectionRule::slow(
                sections::MACRO_DATA,
                Validity::RequireField {
                    pointer: "/cpi/value".into(),
                },
            ),
        ])
    }

    pub fn rules(&self) -> &[SectionRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&SectionRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn kind_of(&self, name: &str) -> SectionKind {
        self.rule(name).map_or(SectionKind::Fast, |r| r.kind)
    }

    /// Names of all slow sections, in declaration order.
    pub fn slow_sections(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|r| r.kind == SectionKind::Slow)
            .map(|r| r.name.as_str())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(layout_error("section name must not be empty"));
            }
            if self.rules[..i].iter().any(|r| r.name == rule.name) {
                return Err(layout_error(&format!(
                    "section '{}' is declared more than once",
                    rule.name
                )));
            }
            if rule.kind == SectionKind::Fast && rule.validity.is_some() {
                return Err(layout_error(&format!(
                    "fast section '{}' cannot have a validity rule",
                    rule.name
                )));
            }
            if let Some(Validity::RequireField { pointer }) = &rule.validity {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    return Err(layout_error(&format!(
                        "validity pointer '{pointer}' for section '{}' must start with '/'",
                        rule.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn layout_error(message: &str) -> CoreError {
    CoreError::Config {
        message: format!("invalid section layout: {message}"),
    }
}

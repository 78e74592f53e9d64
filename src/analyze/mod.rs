// src/analyze/mod.rs
//! Structured analysis record and its tolerant construction from decoded model output.
//!
//! The model is asked for a fixed JSON schema but answers are only loosely trusted:
//! every field is read through a defaulting accessor so the resulting `Analysis` is
//! always complete (string sentinel `"N/A"`, empty lists, importance 5, urgency monitoring).

pub mod ai_adapter;
pub mod analyzer;
pub mod cache_gate;
pub mod repair;
pub mod translate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::item::DEFAULT_IMPORTANCE;

pub use analyzer::ItemAnalyzer;
pub use cache_gate::{AnalysisLookup, GateDecision};
pub use repair::repair_response;
pub use translate::Translator;

/// Sentinel for text fields the model left out.
pub const NOT_AVAILABLE: &str = "N/A";

/// Fixed urgency scale. Declaration order is ranking order (most urgent first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Urgency {
    #[serde(rename = "immediate")]
    Immediate,
    #[serde(rename = "within-24h")]
    Within24h,
    #[serde(rename = "within-1-week")]
    Within1Week,
    #[default]
    #[serde(rename = "monitoring")]
    Monitoring,
}

impl Urgency {
    /// Lower rank = higher priority.
    pub fn rank(self) -> u8 {
        match self {
            Urgency::Immediate => 0,
            Urgency::Within24h => 1,
            Urgency::Within1Week => 2,
            Urgency::Monitoring => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Urgency::Immediate => "immediate",
            Urgency::Within24h => "within-24h",
            Urgency::Within1Week => "within-1-week",
            Urgency::Monitoring => "monitoring",
        }
    }

    /// Accepts the canonical labels and the localized ones the prompt offers
    /// (`azonnali`, `24h`, `1hét`, ...). Separators, case and spacing are ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let norm: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect();
        match norm.as_str() {
            "immediate" | "immediately" | "urgent" | "azonnali" | "azonnal" => {
                Some(Urgency::Immediate)
            }
            "within24h" | "24h" | "within24hours" | "24hours" | "24óránbelül" => {
                Some(Urgency::Within24h)
            }
            "within1week" | "withinaweek" | "1week" | "1hét" | "1hétenbelül" | "1hetenbelul" => {
                Some(Urgency::Within1Week)
            }
            "monitoring" | "monitor" | "watch" => Some(Urgency::Monitoring),
            _ => None,
        }
    }

    /// Unknown or empty labels fall back to `Monitoring`.
    pub fn parse_or_default(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_default()
    }
}

impl From<String> for Urgency {
    fn from(raw: String) -> Self {
        Urgency::parse_or_default(&raw)
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroImpacts {
    pub gdp_effect: String,
    pub inflation_effect: String,
    pub budget_effect: String,
    pub currency_effect: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectoralAnalysis {
    pub affected_sectors: Vec<String>,
    pub company_examples: Vec<String>,
    pub employment_impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeopoliticalContext {
    pub eu_relevance: String,
    pub regional_impact: String,
    pub global_trends: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RisksOpportunities {
    pub main_risks: Vec<String>,
    pub opportunities: Vec<String>,
    pub time_horizon: String,
}

/// Structured judgment attached to one item. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(alias = "hungarian_title")]
    pub localized_title: String,
    pub executive_summary: String,
    pub importance_score: u8,
    pub urgency: Urgency,
    pub macro_impacts: MacroImpacts,
    pub sectoral_analysis: SectoralAnalysis,
    pub geopolitical_context: GeopoliticalContext,
    pub risks_opportunities: RisksOpportunities,
    pub policy_considerations: Vec<String>,
    pub monitoring_points: Vec<String>,
    #[serde(alias = "keywords_hu")]
    pub keywords: Vec<String>,
}

impl Analysis {
    /// Minimal record: the given summary, neutral scores, sentinels everywhere else.
    pub fn from_summary(summary: impl Into<String>) -> Self {
        let empty = Map::new();
        let mut a = Self::from_object(&empty);
        a.executive_summary = summary.into();
        a
    }

    /// Reads a decoded JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(Self::from_object)
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let macro_obj = sub_object(obj, "macro_impacts");
        let sect_obj = sub_object(obj, "sectoral_analysis");
        let geo_obj = sub_object(obj, "geopolitical_context");
        let risk_obj = sub_object(obj, "risks_opportunities");

        Self {
            localized_title: text(obj, &["localized_title", "hungarian_title"]),
            executive_summary: text(obj, &["executive_summary", "summary"]),
            importance_score: importance(first(obj, &["importance_score", "importance"])),
            urgency: first(obj, &["urgency"])
                .and_then(Value::as_str)
                .map(Urgency::parse_or_default)
                .unwrap_or_default(),
            macro_impacts: MacroImpacts {
                gdp_effect: text(&macro_obj, &["gdp_effect"]),
                inflation_effect: text(&macro_obj, &["inflation_effect"]),
                budget_effect: text(&macro_obj, &["budget_effect"]),
                currency_effect: text(&macro_obj, &["currency_effect"]),
            },
            sectoral_analysis: SectoralAnalysis {
                affected_sectors: list(&sect_obj, &["affected_sectors"]),
                company_examples: list(&sect_obj, &["company_examples"]),
                employment_impact: text(&sect_obj, &["employment_impact"]),
            },
            geopolitical_context: GeopoliticalContext {
                eu_relevance: text(&geo_obj, &["eu_relevance"]),
                regional_impact: text(&geo_obj, &["regional_impact"]),
                global_trends: text(&geo_obj, &["global_trends"]),
            },
            risks_opportunities: RisksOpportunities {
                main_risks: list(&risk_obj, &["main_risks"]),
                opportunities: list(&risk_obj, &["opportunities"]),
                time_horizon: text(&risk_obj, &["time_horizon"]),
            },
            policy_considerations: list(obj, &["policy_considerations"]),
            monitoring_points: list(obj, &["monitoring_points"]),
            keywords: list(obj, &["keywords", "keywords_hu"]),
        }
    }

    pub fn has_localized_title(&self) -> bool {
        let t = self.localized_title.trim();
        !t.is_empty() && t != NOT_AVAILABLE
    }
}

// ------------------------------------------------------------
// Tolerant field readers
// ------------------------------------------------------------

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn sub_object(obj: &Map<String, Value>, key: &str) -> Map<String, Value> {
    obj.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    first(obj, keys)
        .and_then(scalar_to_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn list(obj: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    match first(obj, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::Object(_) | Value::Array(_) => Some(v.to_string()),
                other => scalar_to_string(other),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Integer 1..=10. Numbers are rounded and clamped; strings like `"8"` or `"8/10"` use the
/// leading digits. Anything else is the neutral default.
fn importance(v: Option<&Value>) -> u8 {
    let raw = match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<f64>().ok()
        }
        _ => None,
    };
    match raw {
        Some(x) if x.is_finite() => x.round().clamp(1.0, 10.0) as u8,
        _ => DEFAULT_IMPORTANCE,
    }
}

//! Digest synthesizer: top-ranked analyzed items -> one natural-language report.
//!
//! The prompt carries only data taken from the supplied items and instructs the model
//! not to add facts; that constraint is not checked programmatically.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyze::ai_adapter::DynCompletion;
use crate::analyze::NOT_AVAILABLE;
use crate::item::AnalyzedItem;
use crate::ranking;

/// Shown on the read surface when a run produced no digest.
pub const NO_DIGEST: &str = "No digest available";

/// Characters of description quoted per item.
const DESCRIPTION_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub text: String,
    /// Number of items fed into the digest prompt.
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DigestSynthesizer {
    client: DynCompletion,
    language: String,
    top_n: usize,
}

impl DigestSynthesizer {
    pub fn new(client: DynCompletion, language: impl Into<String>, top_n: usize) -> Self {
        Self {
            client,
            language: language.into(),
            top_n,
        }
    }

    /// Items that qualify for the digest: analyzed ones only, ranked, top N.
    pub fn select_inputs(&self, items: &[AnalyzedItem]) -> Vec<AnalyzedItem> {
        let analyzed: Vec<AnalyzedItem> =
            items.iter().filter(|i| i.has_analysis()).cloned().collect();
        ranking::ranked_top(&analyzed, self.top_n)
    }

    /// `None` when nothing qualifies (no call is made) or the service fails.
    pub async fn synthesize(&self, items: &[AnalyzedItem]) -> Option<Digest> {
        let inputs = self.select_inputs(items);
        if inputs.is_empty() {
            info!(target: "digest", "no analyzed items; digest skipped");
            return None;
        }

        let now = Utc::now();
        let prompt = digest_prompt(&inputs, &self.language, now);
        let system = format!(
            "You are a senior economic adviser writing a daily international economic press review in {}.",
            self.language
        );
        match self.client.complete(Some(&system), &prompt).await {
            Ok(raw) => {
                let text = strip_code_fences(&raw).to_string();
                if text.is_empty() {
                    counter!("digest_failures_total").increment(1);
                    warn!(target: "digest", "digest came back empty");
                    return None;
                }
                info!(target: "digest", items = inputs.len(), chars = text.len(), "digest ready");
                Some(Digest {
                    text,
                    item_count: inputs.len(),
                    created_at: now,
                })
            }
            Err(e) => {
                counter!("digest_failures_total").increment(1);
                warn!(target: "digest", provider = self.client.provider_name(), error = %e, "digest call failed");
                None
            }
        }
    }
}

/// Removes a surrounding markdown fence (```html ... ```), if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let t = raw.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // Drop the language tag line.
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn item_block(idx: usize, it: &AnalyzedItem) -> String {
    let Some(a) = it.analysis.as_ref() else {
        return String::new();
    };
    let desc: String = it.item.localized_body().chars().take(DESCRIPTION_CHARS).collect();
    let title = it
        .item
        .translation
        .as_ref()
        .map_or(it.item.title.as_str(), |t| t.title.as_str());
    let join = |v: &[String]| {
        if v.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            v.join(", ")
        }
    };
    format!(
        "[{n}] {title} (importance: {imp}/10, urgency: {urg})\n\
         Original title: {original}\n\
         Source: {source} | Category: {cat}\n\
         Content: {desc}\n\
         Summary: {summary}\n\
         Macro impacts: GDP: {gdp}; inflation: {infl}; currency: {fx}\n\
         Affected sectors: {sectors}\n\
         Risks: {risks}\n",
        n = idx + 1,
        title = title,
        original = it.item.title,
        imp = it.importance_score,
        urg = it.urgency,
        source = it.item.source,
        cat = it.item.category,
        desc = desc,
        summary = a.executive_summary,
        gdp = a.macro_impacts.gdp_effect,
        infl = a.macro_impacts.inflation_effect,
        fx = a.macro_impacts.currency_effect,
        sectors = join(&a.sectoral_analysis.affected_sectors),
        risks = join(&a.risks_opportunities.main_risks),
    )
}

pub fn digest_prompt(inputs: &[AnalyzedItem], language: &str, now: DateTime<Utc>) -> String {
    let date = now.format("%Y-%m-%d");
    let items: Vec<String> = inputs
        .iter()
        .enumerate()
        .map(|(i, it)| item_block(i, it))
        .collect();
    format!(
        r#"Date: {date}

INTERNATIONAL ECONOMIC NEWS (with analysis):
{items}

Write a detailed executive press review in {language}, formatted as HTML (h3, h4, ul, ol, strong, em), with these sections:
- Issues needing immediate attention
- Global economic movements and trends
- Effects on the domestic economy
- International economic environment
- Areas suggested for consideration
- Indicators to watch

Requirements:
- Work ONLY from the news above. Do not invent new information, numbers, deadlines, ministries or measures.
- If an item has no concrete data, do not make up figures.
- Suggest directions and considerations, not decisions.
- Analyst perspective, 800-1000 words."#,
        items = items.join("\n"),
    )
}

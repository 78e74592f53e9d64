// src/analyze/analyzer.rs
//! One item -> one model call -> repaired `Analysis` (or nothing). Single attempt, no retry.

use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{debug, warn};

use super::ai_adapter::DynCompletion;
use super::repair::{repair_with_strategy, Strategy};
use super::Analysis;
use crate::item::Item;

/// Characters of body text embedded in the prompt.
const BODY_PROMPT_CHARS: usize = 2000;

const SYSTEM_PROMPT: &str = "You are a senior economic analyst writing briefings for government \
decision makers. Answer with a single JSON object and nothing else.";

#[derive(Clone)]
pub struct ItemAnalyzer {
    client: DynCompletion,
    language: String,
}

impl ItemAnalyzer {
    pub fn new(client: DynCompletion, language: impl Into<String>) -> Self {
        Self {
            client,
            language: language.into(),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.client.provider_name()
    }

    /// Returns `None` on service failure or when repair recovers nothing.
    pub async fn analyze(&self, item: &Item) -> Option<Analysis> {
        let prompt = analysis_prompt(item, &self.language);
        counter!("analysis_service_calls_total").increment(1);
        let started = Instant::now();
        let result = self.client.complete(Some(SYSTEM_PROMPT), &prompt).await;
        histogram!("analysis_call_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                warn!(target: "batch", id = item.id(), provider = self.provider_name(), error = %e, "analysis call failed");
                return None;
            }
        };

        match repair_with_strategy(&raw) {
            Some((analysis, strategy)) => {
                if strategy == Strategy::SummaryOnly {
                    counter!("analysis_repair_fallback_total").increment(1);
                }
                debug!(target: "repair", id = item.id(), strategy = strategy.as_str(), "analysis recovered");
                Some(analysis)
            }
            None => {
                counter!("analysis_unrecoverable_total").increment(1);
                warn!(target: "repair", id = item.id(), len = raw.len(), "no usable record in model output");
                None
            }
        }
    }
}

/// Fixed analysis template filled with the item's fields.
pub fn analysis_prompt(item: &Item, language: &str) -> String {
    let body: String = item.body.chars().take(BODY_PROMPT_CHARS).collect();
    let translated = item
        .translation
        .as_ref()
        .map(|t| {
            let desc: String = t.description.chars().take(BODY_PROMPT_CHARS).collect();
            format!("\nTranslated title: {}\nTranslated content: {}", t.title, desc)
        })
        .unwrap_or_default();
    format!(
        r#"Write a detailed policy-level analysis of the following economic news item.

Title: {title}
Source: {source}
Category: {category}
Published: {published}
Link: {link}
Content: {body}{translated}

Cover, in {language}:
0. A short, informative title in {language} (max 80 characters).
1. Executive summary (3-5 sentences): the core of the news and why decision makers need it now.
2. Macroeconomic impacts: GDP, inflation, budget and currency effects.
3. Sectoral analysis: affected sectors, company examples where relevant, labour market impact.
4. Geopolitical context: EU relevance, regional (V4, CEE) impact, fit with global trends.
5. Risks and opportunities with their time horizon.
6. Policy considerations: response options, regulatory challenges, coordination needs.
7. Monitoring points: indicators and thresholds to watch.
8. Importance on a 1-10 scale (10 = critical) and urgency: immediate / within-24h / within-1-week / monitoring.

Answer in JSON with exactly these keys:
{{
  "hungarian_title": "title in {language}",
  "executive_summary": "summary",
  "importance_score": 1-10,
  "urgency": "immediate|within-24h|within-1-week|monitoring",
  "macro_impacts": {{"gdp_effect": "", "inflation_effect": "", "budget_effect": "", "currency_effect": ""}},
  "sectoral_analysis": {{"affected_sectors": [], "company_examples": [], "employment_impact": ""}},
  "geopolitical_context": {{"eu_relevance": "", "regional_impact": "", "global_trends": ""}},
  "risks_opportunities": {{"main_risks": [], "opportunities": [], "time_horizon": ""}},
  "policy_considerations": [],
  "monitoring_points": [],
  "keywords_hu": []
}}"#,
        title = item.title,
        source = item.source,
        category = item.category,
        published = item.published_at.to_rfc3339(),
        link = item.link,
        body = body,
        translated = translated,
        language = language,
    )
}

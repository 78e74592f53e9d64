// src/analyze/translate.rs
//! Best-effort translation of feed titles and descriptions into the output language.
//! A failed or empty answer leaves the feed text in place.

use metrics::counter;
use tracing::{debug, warn};

use super::ai_adapter::DynCompletion;
use crate::item::{Item, Translation};

#[derive(Clone)]
pub struct Translator {
    client: DynCompletion,
    language: String,
}

impl Translator {
    pub fn new(client: DynCompletion, language: impl Into<String>) -> Self {
        Self {
            client,
            language: language.into(),
        }
    }

    /// One call per non-empty text. `None` on failure or an empty answer.
    pub async fn translate(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let prompt = format!(
            "Translate to {lang} (output ONLY the {lang} translation, no explanations): {text}",
            lang = self.language
        );
        counter!("translation_calls_total").increment(1);
        match self.client.complete(None, &prompt).await {
            Ok(raw) => clean_translation(&raw),
            Err(e) => {
                counter!("translation_failures_total").increment(1);
                warn!(target: "ingest", provider = self.client.provider_name(), error = %e, "translation failed");
                None
            }
        }
    }

    /// Attaches a translation to each item. An item whose title cannot be translated
    /// stays untranslated; a failed description falls back to the feed text.
    pub async fn localize(&self, items: &mut [Item]) {
        let mut done = 0usize;
        for item in items.iter_mut() {
            let Some(title) = self.translate(&item.title).await else {
                continue;
            };
            let description = self
                .translate(&item.body)
                .await
                .unwrap_or_else(|| item.body.clone());
            item.translation = Some(Translation { title, description });
            done += 1;
        }
        debug!(target: "ingest", items = items.len(), translated = done, "translation pass finished");
    }
}

/// Trims the answer and drops reasoning lines some models prepend.
pub fn clean_translation(raw: &str) -> Option<String> {
    let t = raw.trim();
    let out = if t.contains("THOUGHT:") {
        t.lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with("THOUGHT:") && !l.starts_with('*'))?
    } else {
        t
    };
    (!out.is_empty()).then(|| out.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::{CompletionService, LlmError, LlmFuture};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Prefixes the text after the instruction; fails when it sees "FAIL".
    struct Prefixer {
        calls: AtomicUsize,
    }

    impl CompletionService for Prefixer {
        fn complete<'a>(&'a self, _system: Option<&'a str>, prompt: &'a str) -> LlmFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = prompt.rsplit_once(": ").map(|(_, t)| t).unwrap_or(prompt);
            let out = if text.contains("FAIL") {
                Err(LlmError::Timeout)
            } else {
                Ok(format!("HU {text}\n"))
            };
            Box::pin(async move { out })
        }
        fn provider_name(&self) -> &'static str {
            "prefixer"
        }
    }

    fn translator() -> (Translator, Arc<Prefixer>) {
        let svc = Arc::new(Prefixer {
            calls: AtomicUsize::new(0),
        });
        (Translator::new(svc.clone(), "Hungarian"), svc)
    }

    fn item(title: &str, body: &str) -> Item {
        Item::new(title, "Wire", "Markets", body, Utc::now(), "")
    }

    #[tokio::test]
    async fn title_and_description_are_translated() {
        let (t, svc) = translator();
        let mut items = vec![item("Rates hold", "The bank held rates.")];
        t.localize(&mut items).await;
        let tr = items[0].translation.as_ref().unwrap();
        assert_eq!(tr.title, "HU Rates hold");
        assert_eq!(tr.description, "HU The bank held rates.");
        assert_eq!(items[0].title, "Rates hold");
        assert_eq!(svc.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_fall_back_to_feed_text() {
        let (t, svc) = translator();
        let mut items = vec![item("FAIL title", "body"), item("Oil", "FAIL body"), item("Gold", "")];
        t.localize(&mut items).await;
        assert!(items[0].translation.is_none());
        assert_eq!(items[1].translation.as_ref().unwrap().description, "FAIL body");
        // Empty description is not sent.
        assert_eq!(items[2].translation.as_ref().unwrap().description, "");
        assert_eq!(svc.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn reasoning_lines_are_dropped() {
        assert_eq!(
            clean_translation("THOUGHT: short title\n* note\n\nEsik az olaj\nmore").as_deref(),
            Some("Esik az olaj")
        );
        assert_eq!(clean_translation("  Esik az olaj \n").as_deref(), Some("Esik az olaj"));
        assert!(clean_translation("   ").is_none());
    }
}

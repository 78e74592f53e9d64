// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

use anyhow::Context;

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";

fn default_daily_limit() -> u32 {
    500
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_language() -> String {
    "Hungarian".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}

/// One model endpoint (analysis or digest).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// "openai" | "gemini" | "mock" (case-insensitive)
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// "ENV" means: read from OPENAI_API_KEY / GEMINI_API_KEY (by provider)
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    fn mock() -> Self {
        Self {
            provider: "mock".to_string(),
            model: None,
            api_key: String::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    fn normalize(&mut self) {
        self.provider = self.provider.trim().to_lowercase();
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            let var = match self.provider.as_str() {
                "openai" => Some("OPENAI_API_KEY"),
                "gemini" => Some("GEMINI_API_KEY"),
                _ => None,
            };
            // Missing key is reported per call, so the service still boots.
            self.api_key = var.and_then(|v| env::var(v).ok()).unwrap_or_default();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    pub analysis: ProviderConfig,
    pub digest: ProviderConfig,
    /// Real calls allowed per client per UTC day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Output language for localized titles and the digest.
    #[serde(default = "default_language")]
    pub language: String,
    /// Translate feed titles and descriptions with the analysis client before a run.
    #[serde(default)]
    pub translate: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            analysis: ProviderConfig::mock(),
            digest: ProviderConfig::mock(),
            daily_limit: default_daily_limit(),
            timeout_secs: default_timeout_secs(),
            language: default_language(),
            translate: false,
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading AI config from {}", path.display()))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let mut cfg: AiConfig = serde_json::from_str(data).context("parsing AI config")?;
        cfg.analysis.normalize();
        cfg.digest.normalize();
        if cfg.language.trim().is_empty() {
            cfg.language = default_language();
        }
        Ok(cfg)
    }

    /// `AI_CONFIG_PATH` or `config/ai.json`; a missing/broken file means AI disabled.
    pub fn load_default() -> Self {
        let path =
            env::var("AI_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_AI_CONFIG_PATH.to_string());
        match Self::load_from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "AI config unavailable; model calls disabled");
                Self::default()
            }
        }
    }
}

//! Model-service adapter: provider abstraction + daily call budget.
//! One prompt in, one free-text answer out. Failures are classified in `LlmError`
//! and never escape the analyzer / digest synthesizer.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ai::{AiConfig, ProviderConfig};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Service-level failure of one model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("model service disabled")]
    Disabled,
    #[error("missing API key for {0}")]
    MissingApiKey(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("authentication rejected")]
    Auth,
    #[error("quota exhausted")]
    Quota,
    #[error("unexpected HTTP status {status}")]
    Http { status: u16 },
    #[error("empty response")]
    EmptyResponse,
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl LlmError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }

    fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::Auth,
            429 => LlmError::Quota,
            s => LlmError::Http { status: s },
        }
    }
}

pub type LlmFuture<'a> = Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;

/// Trait object used by the analyzer and the digest synthesizer.
pub trait CompletionService: Send + Sync {
    /// Sends one prompt (plus optional system instruction) and returns the raw answer text.
    fn complete<'a>(&'a self, system: Option<&'a str>, prompt: &'a str) -> LlmFuture<'a>;
    /// Provider name for diagnostics/logs.
    fn provider_name(&self) -> &'static str;
}

pub type DynCompletion = Arc<dyn CompletionService>;

/// Which call site a client serves. Mock answers differ per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Analysis,
    Digest,
}

impl ServiceRole {
    fn label(self) -> &'static str {
        match self {
            ServiceRole::Analysis => "analysis",
            ServiceRole::Digest => "digest",
        }
    }
}

/// Factory: build a client for `role` according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the configured provider wrapped with the daily budget.
pub fn build_client(config: &AiConfig, role: ServiceRole) -> DynCompletion {
    let pcfg = match role {
        ServiceRole::Analysis => &config.analysis,
        ServiceRole::Digest => &config.digest,
    };
    let mock_mode = std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false);

    if mock_mode || (config.enabled && pcfg.provider == "mock") {
        let mock = MockProvider::for_role(role);
        return Arc::new(BudgetedClient::in_memory(mock, config.daily_limit));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let built: anyhow::Result<DynCompletion> = match pcfg.provider.as_str() {
        "openai" => OpenAiProvider::new(pcfg, timeout).map(|p| {
            Arc::new(BudgetedClient::new(
                p,
                default_counter_dir(),
                role.label(),
                config.daily_limit,
            )) as DynCompletion
        }),
        "gemini" => GeminiProvider::new(pcfg, timeout).map(|p| {
            Arc::new(BudgetedClient::new(
                p,
                default_counter_dir(),
                role.label(),
                config.daily_limit,
            )) as DynCompletion
        }),
        other => Err(anyhow::anyhow!("unsupported provider: {other}")),
    };

    match built {
        Ok(client) => {
            info!(role = role.label(), provider = client.provider_name(), "model client ready");
            client
        }
        Err(e) => {
            warn!(role = role.label(), error = %e, "model client unavailable; disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the same budget
/// wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, system: Option<&'a str>, prompt: &'a str) -> LlmFuture<'a>;
    fn name(&self) -> &'static str;
}

fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("econ-newsletter/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(timeout)
        .build()
        .context("building HTTP client")
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(cfg: &ProviderConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: cfg.temperature.unwrap_or(0.3),
            max_tokens: cfg.max_tokens.unwrap_or(2000),
        })
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(&'a self, system: Option<&'a str>, prompt: &'a str) -> LlmFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(LlmError::MissingApiKey("openai"));
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: Option<String>,
            }

            let mut messages = Vec::with_capacity(2);
            if let Some(sys) = system {
                messages.push(Msg {
                    role: "system",
                    content: sys,
                });
            }
            messages.push(Msg {
                role: "user",
                content: prompt,
            });
            let req = Req {
                model: &self.model,
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(LlmError::from_reqwest)?;

            if !resp.status().is_success() {
                return Err(LlmError::from_status(resp.status()));
            }
            let body: Resp = resp.json().await.map_err(LlmError::from_reqwest)?;
            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            non_empty(content)
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Google Gemini provider (`generateContent` REST endpoint).
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiProvider {
    pub fn new(cfg: &ProviderConfig, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            api_key: cfg.api_key.clone(),
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            temperature: cfg.temperature.unwrap_or(0.3),
            max_tokens: cfg.max_tokens.unwrap_or(4096),
        })
    }
}

impl Provider for GeminiProvider {
    fn fetch<'a>(&'a self, system: Option<&'a str>, prompt: &'a str) -> LlmFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(LlmError::MissingApiKey("gemini"));
            }

            #[derive(Serialize)]
            struct Part<'a> {
                text: &'a str,
            }
            #[derive(Serialize)]
            struct Content<'a> {
                role: &'a str,
                parts: Vec<Part<'a>>,
            }
            #[derive(Serialize)]
            struct SystemInstruction<'a> {
                parts: Vec<Part<'a>>,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct GenerationConfig {
                temperature: f32,
                max_output_tokens: u32,
            }
            #[derive(Serialize)]
            #[serde(rename_all = "camelCase")]
            struct Req<'a> {
                contents: Vec<Content<'a>>,
                #[serde(skip_serializing_if = "Option::is_none")]
                system_instruction: Option<SystemInstruction<'a>>,
                generation_config: GenerationConfig,
            }
            #[derive(Deserialize)]
            struct Resp {
                #[serde(default)]
                candidates: Vec<Candidate>,
            }
            #[derive(Deserialize)]
            struct Candidate {
                content: Option<CandidateContent>,
            }
            #[derive(Deserialize)]
            struct CandidateContent {
                #[serde(default)]
                parts: Vec<CandidatePart>,
            }
            #[derive(Deserialize)]
            struct CandidatePart {
                text: Option<String>,
            }

            let req = Req {
                contents: vec![Content {
                    role: "user",
                    parts: vec![Part { text: prompt }],
                }],
                system_instruction: system.map(|s| SystemInstruction {
                    parts: vec![Part { text: s }],
                }),
                generation_config: GenerationConfig {
                    temperature: self.temperature,
                    max_output_tokens: self.max_tokens,
                },
            };

            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
                self.model
            );
            let resp = self
                .http
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(LlmError::from_reqwest)?;

            if !resp.status().is_success() {
                return Err(LlmError::from_status(resp.status()));
            }
            let body: Resp = resp.json().await.map_err(LlmError::from_reqwest)?;
            let text: String = body
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default();
            non_empty(text)
        })
    }
    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn non_empty(text: String) -> Result<String, LlmError> {
    if text.trim().is_empty() {
        Err(LlmError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// Always fails with `Disabled`; used when AI is switched off.
pub struct DisabledClient;

impl CompletionService for DisabledClient {
    fn complete<'a>(&'a self, _system: Option<&'a str>, _prompt: &'a str) -> LlmFuture<'a> {
        Box::pin(async { Err(LlmError::Disabled) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn for_role(role: ServiceRole) -> Self {
        let fixed = match role {
            ServiceRole::Analysis => serde_json::json!({
                "hungarian_title": "Teszt gazdasági hír",
                "executive_summary": "Mock analysis: no material change expected.",
                "importance_score": 5,
                "urgency": "monitoring",
                "keywords_hu": ["teszt"]
            })
            .to_string(),
            ServiceRole::Digest => {
                "<h3>Digest (mock)</h3><p>Summary of the supplied items.</p>".to_string()
            }
        };
        Self { fixed }
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, _system: Option<&'a str>, _prompt: &'a str) -> LlmFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Budget wrapper (daily limit)
// ------------------------------------------------------------

/// Counts real calls per day; once the limit is hit every call fails with `Quota`
/// until the day rolls over. Counter state is guarded by a `Mutex` and, when a
/// directory is given, persisted best-effort across restarts.
pub struct BudgetedClient<P: Provider> {
    inner: P,
    counter_file: Option<PathBuf>,
    daily_limit_max: u32,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> BudgetedClient<P> {
    pub fn new(inner: P, counter_dir: PathBuf, label: &str, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&counter_dir); // best-effort
        let file = counter_path(&counter_dir, label);
        let counter = load_daily_counter(&file).unwrap_or_default();
        Self {
            inner,
            counter_file: Some(file),
            daily_limit_max,
            counter: Mutex::new(counter),
        }
    }

    pub fn in_memory(inner: P, daily_limit_max: u32) -> Self {
        Self {
            inner,
            counter_file: None,
            daily_limit_max,
            counter: Mutex::new(DailyCounter::default()),
        }
    }

    fn persist(&self, dc: &DailyCounter) {
        if let Some(path) = &self.counter_file {
            let _ = save_daily_counter(path, dc);
        }
    }

    async fn complete_impl(&self, system: Option<&str>, prompt: &str) -> Result<String, LlmError> {
        {
            let mut g = self.counter.lock().unwrap_or_else(|e| e.into_inner());
            if g.is_expired() {
                g.reset_to_today();
                self.persist(&g);
            }
            if g.count >= self.daily_limit_max {
                return Err(LlmError::Quota);
            }
        }

        let out = self.inner.fetch(system, prompt).await?;

        let mut g = self.counter.lock().unwrap_or_else(|e| e.into_inner());
        g.count = g.count.saturating_add(1);
        self.persist(&g);
        Ok(out)
    }
}

impl<P: Provider> CompletionService for BudgetedClient<P> {
    fn complete<'a>(&'a self, system: Option<&'a str>, prompt: &'a str) -> LlmFuture<'a> {
        Box::pin(self.complete_impl(system, prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

fn default_counter_dir() -> PathBuf {
    std::env::var("AI_COUNTER_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("cache/ai"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path, label: &str) -> PathBuf {
    dir.join(format!("daily_count_{label}.json"))
}

fn load_daily_counter(path: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(path)?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(path: &Path, dc: &DailyCounter) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

//! LLM oracle
//!
//! Optional judge used by the dream engine for contradiction and
//! consolidation calls. Provider-agnostic surface: `complete` plus a
//! cheap `is_available` probe. Concrete providers cover a local Ollama
//! server, any OpenAI-compatible endpoint (LM Studio, OpenAI proper,
//! OpenRouter) and the Anthropic API; a factory picks one from config.
//!
//! The oracle is never load-bearing: when it is absent or the probe
//! fails, callers fall back to heuristics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{MemoryError, Result};

/// Probe timeout; generation calls get a longer budget
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// Generation timeout
const COMPLETE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

/// A completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// The user prompt
    pub prompt: String,
    /// Optional system prompt
    pub system_prompt: Option<String>,
    /// Token cap for the response
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Ask the provider for strict-JSON output
    pub json_mode: bool,
}

impl CompletionRequest {
    /// Build a request with just a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Attach a system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    /// Request strict-JSON output
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text
    pub content: String,
    /// Model that produced it
    pub model: String,
    /// Token usage when the provider reports it
    pub tokens_used: Option<u32>,
}

// ============================================================================
// CONFIG
// ============================================================================

/// Which provider backs the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    /// No oracle; heuristics only
    #[default]
    None,
    /// Local Ollama server
    Ollama,
    /// Local LM Studio server (OpenAI-compatible)
    Lmstudio,
    /// OpenAI API
    Openai,
    /// Anthropic API
    Anthropic,
    /// OpenRouter API
    Openrouter,
}

/// Oracle configuration, from the settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Provider selection
    pub provider: OracleProvider,
    /// Override the provider's default base URL
    pub base_url: Option<String>,
    /// API key for hosted providers
    pub api_key: Option<String>,
    /// Model name
    pub model: Option<String>,
}

// ============================================================================
// TRAIT & FACTORY
// ============================================================================

/// The judge interface the dream engine consumes
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Run a completion
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Cheap availability probe; false routes callers to heuristics
    async fn is_available(&self) -> bool;

    /// Provider label for logs
    fn name(&self) -> &'static str;
}

/// Build the oracle selected by `config`; `None` yields the null oracle
pub fn build_oracle(config: &OracleConfig) -> Result<Arc<dyn Oracle>> {
    let oracle: Arc<dyn Oracle> = match config.provider {
        OracleProvider::None => Arc::new(NullOracle),
        OracleProvider::Ollama => Arc::new(OllamaOracle::new(config)?),
        OracleProvider::Lmstudio => Arc::new(OpenAiCompatOracle::lmstudio(config)?),
        OracleProvider::Openai => Arc::new(OpenAiCompatOracle::openai(config)?),
        OracleProvider::Openrouter => Arc::new(OpenAiCompatOracle::openrouter(config)?),
        OracleProvider::Anthropic => Arc::new(AnthropicOracle::new(config)?),
    };
    Ok(oracle)
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(COMPLETE_TIMEOUT)
        .connect_timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| MemoryError::database(format!("http client init: {}", e)))
}

// ============================================================================
// NULL ORACLE
// ============================================================================

/// The default oracle: always unavailable
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOracle;

#[async_trait]
impl Oracle for NullOracle {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        Err(MemoryError::database_with_transience(
            "no oracle configured",
            false,
        ))
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

// ============================================================================
// OLLAMA
// ============================================================================

/// Native Ollama `/api/generate` client
pub struct OllamaOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaOracle {
    /// Build from config; defaults to `http://localhost:11434`
    pub fn new(config: &OracleConfig) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "llama3.2".to_string()),
        })
    }
}

#[async_trait]
impl Oracle for OllamaOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = json!(system);
        }
        if request.json_mode {
            body["format"] = json!("json");
        }
        let mut options = serde_json::Map::new();
        if let Some(temperature) = request.temperature {
            options.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".into(), json!(max_tokens));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;
        let value: Value = check_status(response).await?;
        Ok(Completion {
            content: value
                .get("response")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            model: self.model.clone(),
            tokens_used: value
                .get("eval_count")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
        })
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        matches!(probe, Ok(r) if r.status().is_success())
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

// ============================================================================
// OPENAI-COMPATIBLE (OpenAI, LM Studio, OpenRouter)
// ============================================================================

/// `/chat/completions` client for any OpenAI-compatible endpoint
pub struct OpenAiCompatOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    label: &'static str,
}

impl OpenAiCompatOracle {
    fn build(
        config: &OracleConfig,
        default_base: &str,
        default_model: &str,
        label: &'static str,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| default_base.to_string()),
            api_key: config.api_key.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            label,
        })
    }

    /// OpenAI proper
    pub fn openai(config: &OracleConfig) -> Result<Self> {
        Self::build(config, "https://api.openai.com/v1", "gpt-4o-mini", "openai")
    }

    /// Local LM Studio server
    pub fn lmstudio(config: &OracleConfig) -> Result<Self> {
        Self::build(config, "http://localhost:1234/v1", "local-model", "lmstudio")
    }

    /// OpenRouter
    pub fn openrouter(config: &OracleConfig) -> Result<Self> {
        Self::build(
            config,
            "https://openrouter.ai/api/v1",
            "openai/gpt-4o-mini",
            "openrouter",
        )
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl Oracle for OpenAiCompatOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut messages = vec![];
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/chat/completions", self.base_url)),
            )
            .json(&body)
            .send()
            .await?;
        let value: Value = check_status(response).await?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Completion {
            content,
            model: value
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&self.model)
                .to_string(),
            tokens_used: value
                .pointer("/usage/total_tokens")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
        })
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .authorized(self.client.get(format!("{}/models", self.base_url)))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        matches!(probe, Ok(r) if r.status().is_success())
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

// ============================================================================
// ANTHROPIC
// ============================================================================

/// Anthropic `/v1/messages` client
pub struct AnthropicOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicOracle {
    /// Build from config; requires an API key
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| MemoryError::invalid_field("llm.api_key", "required for anthropic"))?;
        Ok(Self {
            client: http_client()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
        })
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(1024),
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system_prompt {
            body["system"] = json!(system);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;
        let value: Value = check_status(response).await?;
        let content = value
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tokens = value
            .pointer("/usage/input_tokens")
            .and_then(Value::as_u64)
            .zip(value.pointer("/usage/output_tokens").and_then(Value::as_u64))
            .map(|(input, output)| (input + output) as u32);
        Ok(Completion {
            content,
            model: self.model.clone(),
            tokens_used: tokens,
        })
    }

    async fn is_available(&self) -> bool {
        let probe = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        matches!(probe, Ok(r) if r.status().is_success())
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

async fn check_status(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| MemoryError::database(format!("malformed oracle response: {}", e)));
    }
    let transient = status.as_u16() == 502 || status.as_u16() == 503 || status.as_u16() == 429;
    let body = response.text().await.unwrap_or_default();
    Err(MemoryError::database_with_transience(
        format!("oracle returned {}: {}", status, body),
        transient,
    ))
}

// ============================================================================
// TESTS
// ============================================================================

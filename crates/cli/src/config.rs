use extract::{ExtractionOracle, OllamaClient, OpenAiClient, RetryPolicy};
use index::Neo4jConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub neo4j: Neo4jConfig,
    pub llm: LlmConfig,
    pub chunking: ChunkingConfig,
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown LLM provider {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_concurrent_llm_calls: usize,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub write_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_words: 1000 }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_llm_calls: 3,
            request_timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: index::DEFAULT_BATCH_SIZE,
            write_timeout_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_backoff_ms, self.max_backoff_ms)
    }
}

fn parsed<T: FromStr>(name: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable setting");
            None
        }
    }
}

impl AppConfig {
    /// Defaults overridden by process environment (after `.env` is loaded).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(uri) = lookup("NEO4J_URI") {
            self.neo4j.uri = uri;
        }
        if let Some(user) = lookup("NEO4J_USER") {
            self.neo4j.user = user;
        }
        if let Some(password) = lookup("NEO4J_PASSWORD") {
            self.neo4j.password = password;
        }

        if let Some(provider) = parsed("LLM_PROVIDER", lookup("LLM_PROVIDER")) {
            self.llm.provider = provider;
            if provider == LlmProvider::Ollama {
                self.llm.base_url = "http://localhost:11434".to_string();
                self.llm.model = "llama3.1".to_string();
            }
        }
        if let Some(base_url) = lookup("LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(api_key);
        }

        if let Some(max_words) = parsed("CHUNK_MAX_WORDS", lookup("CHUNK_MAX_WORDS")) {
            self.chunking.max_words = max_words;
        }
        if let Some(calls) = parsed("LLM_CONCURRENCY", lookup("LLM_CONCURRENCY")) {
            self.concurrency.max_concurrent_llm_calls = calls;
        }
        if let Some(secs) = parsed("LLM_TIMEOUT_SECS", lookup("LLM_TIMEOUT_SECS")) {
            self.concurrency.request_timeout_secs = secs;
        }
        if let Some(retries) = parsed("MAX_RETRIES", lookup("MAX_RETRIES")) {
            self.retry.max_retries = retries;
        }
        if let Some(batch_size) = parsed("INGEST_BATCH_SIZE", lookup("INGEST_BATCH_SIZE")) {
            self.ingest.batch_size = batch_size;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.concurrency.request_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.write_timeout_secs)
    }

    /// The configured extraction backend.
    pub fn oracle(&self) -> anyhow::Result<Box<dyn ExtractionOracle>> {
        let llm = &self.llm;
        Ok(match llm.provider {
            LlmProvider::Ollama => Box::new(OllamaClient::new(
                llm.base_url.clone(),
                llm.model.clone(),
                self.request_timeout(),
            )?),
            LlmProvider::OpenAi => {
                let api_key = llm
                    .api_key
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
                Box::new(OpenAiClient::new(
                    llm.base_url.clone(),
                    llm.model.clone(),
                    api_key,
                    self.request_timeout(),
                )?)
            }
        })
    }
}

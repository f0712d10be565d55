use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A black-box model that turns instructions plus input text into a reply.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String>;
}

#[async_trait]
impl<T: ExtractionOracle + ?Sized> ExtractionOracle for Box<T> {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String> {
        (**self).complete(instructions, input).await
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    system: String,
    prompt: String,
    stream: bool,
    format: String, // "json" for structured output
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url,
            model,
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ExtractionOracle for OllamaClient {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));

        let request = OllamaRequest {
            model: self.model.clone(),
            system: instructions.to_string(),
            prompt: input.to_string(),
            stream: false,
            format: "json".to_string(), // Force JSON output
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: String, model: String, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url,
            model,
            api_key,
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ExtractionOracle for OpenAiClient {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: instructions },
                ChatMessage { role: "user", content: input },
            ],
            temperature: 0.0,
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        if !response.status().is_success() {
            anyhow::bail!("Chat completion request failed: {}", response.status());
        }

        let chat: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .context("Chat completion returned no content")
    }
}

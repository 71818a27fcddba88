//! HTTP LLM backends (OpenAI-compatible and Gemini)

use crate::core::config::LlmConfig;
use crate::llm::{render_messages, PromptBackend, PromptError, PromptMessage};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn build_http_client(timeout_secs: u64) -> Result<HttpClient, PromptError> {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PromptError::Internal(format!("Failed to build HTTP client: {}", e)))
}

fn read_api_key(var: &str) -> Result<String, PromptError> {
    std::env::var(var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| PromptError::MissingApiKey(var.to_string()))
}

/// OpenAI-compatible chat completions backend
pub struct OpenAiBackend {
    http_client: HttpClient,
    base_url: String,
    model: String,
    api_key_env: String,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, PromptError> {
        Ok(Self {
            http_client: build_http_client(config.timeout_secs)?,
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl PromptBackend for OpenAiBackend {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PromptError> {
        let api_key = read_api_key(&self.api_key_env)?;
        let url = format!("{}/chat/completions", self.base_url);
        debug!("Sending {} messages to {}", messages.len(), url);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&OpenAiRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await
            .map_err(|e| PromptError::Api(format!("request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PromptError::Api(format!("{}: {}", status, body.trim())));
        }

        let body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| PromptError::Malformed(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PromptError::Malformed("no choices in response".to_string()))
    }
}

/// Google Generative AI backend
pub struct GeminiBackend {
    http_client: HttpClient,
    base_url: String,
    model: String,
    api_key_env: String,
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiBackend {
    pub fn new(config: &LlmConfig) -> Result<Self, PromptError> {
        Ok(Self {
            http_client: build_http_client(config.timeout_secs)?,
            base_url: config
                .endpoint
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl PromptBackend for GeminiBackend {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, PromptError> {
        let api_key = read_api_key(&self.api_key_env)?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: render_messages(messages),
                }],
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| PromptError::Api(format!("request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PromptError::Api(format!("{}: {}", status, body.trim())));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| PromptError::Malformed(e.to_string()))?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| PromptError::Malformed("no candidates in response".to_string()))
    }
}

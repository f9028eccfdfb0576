//! Remote answer generation client (OpenAI `/chat/completions` wire format).

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::QaConfig;
use crate::retry::{RetryPolicy, post_json_with_retries};

/// Boundary to the answer synthesis model.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces the answer text for an assembled prompt. May fail; no
    /// streaming.
    async fn generate(&self, prompt: &str) -> Result<String>;
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
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiGenerator {
    pub fn new(config: &QaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.api_base_url),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
            temperature: config.temperature,
            request_timeout: config.request_timeout,
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = post_json_with_retries(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.request_timeout,
            &self.retry,
            "completion request",
        )
        .await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("invalid completion response body")?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("completion response contained no choices"))?;

        let answer = choice.message.content.trim().to_string();
        if answer.is_empty() {
            bail!("model returned an empty completion");
        }
        Ok(answer)
    }
}

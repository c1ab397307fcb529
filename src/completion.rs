//! Chat completion client used by the summarizer.
//!
//! [`Completer`] is a single `complete(system, user, options)` call with no
//! retry. [`OpenAIChatCompleter`] speaks the OpenAI-compatible
//! `POST {url}/chat/completions` API, so any compatible gateway works by
//! changing `summary.url`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SummaryConfig;

/// Sampling options for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionOptions {
    pub fn from_config(config: &SummaryConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, system: &str, user: &str, options: &CompletionOptions) -> Result<String>;
}

/// Build the completer selected by `summary.provider`, or `None` when disabled.
pub fn create_completer(config: &SummaryConfig) -> Result<Option<Arc<dyn Completer>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Arc::new(OpenAIChatCompleter::new(config)?))),
        other => bail!("Unknown summary provider: {}", other),
    }
}

pub struct OpenAIChatCompleter {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl OpenAIChatCompleter {
    pub fn new(config: &SummaryConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice_text(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| anyhow!("completion response has no message content"))
}

#[async_trait]
impl Completer for OpenAIChatCompleter {
    async fn complete(&self, system: &str, user: &str, options: &CompletionOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": options.model,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat completion failed with {}: {}", status, text);
        }

        let parsed: ChatResponse = response.json().await?;
        first_choice_text(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_choice_text() {
        let parsed: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "A backend engineer." } }]
        }))
        .unwrap();
        assert_eq!(first_choice_text(parsed).unwrap(), "A backend engineer.");
    }

    #[test]
    fn test_missing_content_is_error() {
        let parsed: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        }))
        .unwrap();
        assert!(first_choice_text(parsed).is_err());

        let empty: ChatResponse = serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        assert!(first_choice_text(empty).is_err());
    }

    #[test]
    fn test_disabled_completer() {
        assert!(create_completer(&SummaryConfig::default()).unwrap().is_none());
    }
}

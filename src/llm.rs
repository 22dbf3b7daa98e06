//! Language-model clients.
//!
//! [`LanguageModel`] is the seam the orchestrator calls through. The
//! production implementation, [`HttpModel`], speaks the OpenAI-compatible
//! REST dialect served by most hosted and self-hosted inference servers:
//!
//! - [`Prompt::Messages`] → `POST {endpoint}/chat/completions`
//! - [`Prompt::Text`] → `POST {endpoint}/completions`
//!
//! Token usage comes from the response's `usage` object. When the server
//! omits it, both sides are estimated with the summarizer's token counter.
//! Cost is the server's `estimated_cost` when present, otherwise
//! `(prompt + output tokens) × cost_per_token`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use summary_harness_core::models::Usage;
use summary_harness_core::tokens::TokenCounter;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::error::InferenceError;
use crate::prompt::Prompt;

/// Sampling options for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// A model response and what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Completion, InferenceError>;
}

/// OpenAI-compatible HTTP model.
pub struct HttpModel {
    name: String,
    endpoint: String,
    model: String,
    api_key_env: Option<String>,
    timeout: Duration,
    cost_per_token: f64,
    counter: Arc<dyn TokenCounter>,
    client: reqwest::Client,
}

impl HttpModel {
    /// Build a client for the summarizer `name`.
    pub fn new(
        name: &str,
        config: &SummarizerConfig,
        counter: Arc<dyn TokenCounter>,
        timeout: Duration,
    ) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            bail!("summarizers.{}.endpoint must not be empty", name);
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            name: name.to_string(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            timeout,
            cost_per_token: config.cost_per_token,
            counter,
            client,
        })
    }

    fn request_body(&self, prompt: &Prompt, options: &GenerationOptions) -> serde_json::Value {
        let mut body = match prompt {
            Prompt::Messages(messages) => serde_json::json!({
                "model": self.model,
                "messages": messages,
            }),
            Prompt::Text(text) => serde_json::json!({
                "model": self.model,
                "prompt": text,
            }),
        };
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = temperature.into();
        }
        if let Some(top_p) = options.top_p {
            body["top_p"] = top_p.into();
        }
        body
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Completion, InferenceError> {
        let api_key = match &self.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| InferenceError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };
        let path = match prompt {
            Prompt::Messages(_) => "chat/completions",
            Prompt::Text(_) => "completions",
        };
        let url = format!("{}/{}", self.endpoint, path);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt, options));
        if let Some(key) = api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout(self.timeout)
            } else {
                InferenceError::Transport(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;
        debug!(provider = %self.name, url = %url, "completion received");

        let prompt_text = prompt.flatten();
        parse_completion(&json, self.cost_per_token, |which| match which {
            TokenSide::Prompt => self.counter.count(&prompt_text),
            TokenSide::Output(text) => self.counter.count(text),
        })
    }
}

/// Which side of a call to estimate when the server reports no usage.
pub enum TokenSide<'a> {
    Prompt,
    Output(&'a str),
}

/// Extract text and usage from a chat or text completion response.
pub fn parse_completion<F>(
    json: &serde_json::Value,
    cost_per_token: f64,
    estimate: F,
) -> Result<Completion, InferenceError>
where
    F: Fn(TokenSide<'_>) -> usize,
{
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| InferenceError::MalformedResponse("missing choices".to_string()))?;

    let text = choice
        .pointer("/message/content")
        .or_else(|| choice.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| InferenceError::MalformedResponse("missing completion text".to_string()))?
        .trim()
        .to_string();
    if text.is_empty() {
        return Err(InferenceError::EmptyResponse);
    }

    let usage = json.get("usage");
    let reported = |field: &str| usage.and_then(|u| u.get(field)).and_then(|v| v.as_u64());
    let prompt_tokens = reported("prompt_tokens").unwrap_or_else(|| estimate(TokenSide::Prompt) as u64);
    let output_tokens =
        reported("completion_tokens").unwrap_or_else(|| estimate(TokenSide::Output(&text)) as u64);
    let cost = usage
        .and_then(|u| u.get("estimated_cost"))
        .and_then(|v| v.as_f64())
        .unwrap_or((prompt_tokens + output_tokens) as f64 * cost_per_token);

    Ok(Completion {
        text,
        usage: Usage {
            prompt_tokens,
            output_tokens,
            cost,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ChatMessage;
    use serde_json::json;

    fn no_estimate(_: TokenSide<'_>) -> usize {
        panic!("usage was reported")
    }

    #[test]
    fn test_parse_chat_completion_with_reported_cost() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": " The answer. "}}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 30, "estimated_cost": 0.002}
        });
        let completion = parse_completion(&body, 1.0, no_estimate).unwrap();
        assert_eq!(completion.text, "The answer.");
        assert_eq!(completion.usage.prompt_tokens, 120);
        assert_eq!(completion.usage.output_tokens, 30);
        assert!((completion.usage.cost - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_parse_text_completion_cost_fallback() {
        let body = json!({
            "choices": [{"text": "Done."}],
            "usage": {"prompt_tokens": 900, "completion_tokens": 100}
        });
        let completion = parse_completion(&body, 0.001, no_estimate).unwrap();
        assert_eq!(completion.text, "Done.");
        assert!((completion.usage.cost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_estimates_missing_usage() {
        let body = json!({"choices": [{"text": "Short."}]});
        let completion = parse_completion(&body, 0.0, |side| match side {
            TokenSide::Prompt => 40,
            TokenSide::Output(text) => text.len(),
        })
        .unwrap();
        assert_eq!(completion.usage.prompt_tokens, 40);
        assert_eq!(completion.usage.output_tokens, 6);
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        let empty = json!({"choices": [{"message": {"content": "  "}}]});
        assert!(matches!(
            parse_completion(&empty, 0.0, |_| 0),
            Err(InferenceError::EmptyResponse)
        ));
        let malformed = json!({"choices": []});
        assert!(matches!(
            parse_completion(&malformed, 0.0, |_| 0),
            Err(InferenceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_body_shapes() {
        let config = SummarizerConfig {
            style: Default::default(),
            endpoint: "http://localhost:8080/v1/".into(),
            model: "mixtral".into(),
            api_key_env: None,
            context_window: 1000,
            chunk_length: 800,
            max_new_tokens: 100,
            cost_per_token: 0.0,
            tokenizer: Default::default(),
            temperature: None,
            top_p: None,
        };
        let model = HttpModel::new(
            "local",
            &config,
            Arc::new(summary_harness_core::tokens::HeuristicCounter),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(model.endpoint, "http://localhost:8080/v1");

        let options = GenerationOptions {
            max_tokens: Some(64),
            temperature: Some(0.5),
            top_p: None,
        };
        let chat = model.request_body(
            &Prompt::Messages(vec![ChatMessage::user("hi")]),
            &options,
        );
        assert_eq!(chat["messages"][0]["content"], "hi");
        assert_eq!(chat["max_tokens"], 64);
        assert!(chat.get("top_p").is_none());

        let text = model.request_body(&Prompt::Text("hi".into()), &GenerationOptions::default());
        assert_eq!(text["prompt"], "hi");
        assert!(text.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_sending() {
        let config = SummarizerConfig {
            style: Default::default(),
            endpoint: "http://127.0.0.1:9".into(),
            model: "m".into(),
            api_key_env: Some("SUMM_TEST_KEY_THAT_IS_NOT_SET".into()),
            context_window: 1000,
            chunk_length: 800,
            max_new_tokens: 100,
            cost_per_token: 0.0,
            tokenizer: Default::default(),
            temperature: None,
            top_p: None,
        };
        let model = HttpModel::new(
            "remote",
            &config,
            Arc::new(summary_harness_core::tokens::HeuristicCounter),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = model
            .generate(&Prompt::Text("hi".into()), &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::MissingApiKey(ref var) if var == "SUMM_TEST_KEY_THAT_IS_NOT_SET"));
        assert!(!err.is_retryable());
    }
}

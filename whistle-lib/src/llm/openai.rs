use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;
use crate::llm::LlmClient;
use crate::{Error, Result};

/// Client for OpenAI-compatible chat completion servers.
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build LLM HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            api_key: settings
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Full URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl LlmClient for OpenAiClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request.send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::Connectivity(format!("LLM endpoint {} unreachable: {e}", self.endpoint))
            } else {
                Error::Llm(format!("failed to call chat completions: {e}"))
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(status_error(status, &text));
        }

        let parsed: ChatResponse = resp
            .json()
            .map_err(|e| Error::Llm(format!("failed to parse chat response: {e}")))?;

        if let Some(usage) = &parsed.usage {
            tracing::info!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "llm usage"
            );
        }

        let answer = parsed.into_content()?;
        tracing::info!(
            preview = %answer.chars().take(300).collect::<String>(),
            "got llm response"
        );
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Connectivity(format!("LLM endpoint rejected credentials ({status}): {body}"))
        }
        _ => Error::Llm(format!("LLM endpoint returned {status}: {body}")),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

impl ChatResponse {
    fn into_content(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Llm("chat response has no message content".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_and_key_normalisation() {
        let settings = LlmSettings {
            base_url: "http://localhost:11434/v1/".to_string(),
            api_key: Some("  ".to_string()),
            ..LlmSettings::default()
        };
        let client = OpenAiClient::new(&settings).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert!(client.api_key.is_none());
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_request_omits_unset_max_tokens() {
        let body = ChatRequest {
            model: "m",
            temperature: 0.0,
            max_tokens: None,
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_content_and_usage() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{
                "choices": [{"message": {"role": "assistant", "content": "Ten players."}}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            }"#,
        )
        .unwrap();
        assert_eq!(parsed.usage.as_ref().unwrap().total_tokens, 15);
        assert_eq!(parsed.into_content().unwrap(), "Ten players.");
    }

    #[test]
    fn test_response_without_choices_is_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(parsed.into_content(), Err(Error::Llm(_))));
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "").is_connectivity());
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Error::Llm(_)
        ));
    }

    #[test]
    fn test_unreachable_endpoint_is_connectivity_failure() {
        let settings = LlmSettings {
            base_url: "http://127.0.0.1:9/v1".to_string(),
            timeout_secs: 2,
            ..LlmSettings::default()
        };
        let client = OpenAiClient::new(&settings).unwrap();
        assert!(client.complete("hello").unwrap_err().is_connectivity());
    }
}

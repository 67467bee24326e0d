//! Language model completion
//!
//! The pipeline treats the model as a plain capability: given a prompt,
//! return text. [`OpenAiClient`] speaks the OpenAI-compatible
//! `/chat/completions` protocol, which also covers Ollama, vLLM and most
//! proxies.
//!
//! Models are asked for prose but sometimes reply with JSON. Both shapes are
//! valid, see [`LlmAnswer`].

use std::fmt;

use serde_json::Value;

use crate::Result;

/// Trait for language model backends
pub trait LlmClient: Send + Sync {
    /// Send one prompt, return the raw completion text
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Returns the model name/identifier
    fn model_name(&self) -> &str;
}

/// A completion, parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmAnswer {
    Json(Value),
    Text(String),
}

impl LlmAnswer {
    /// Try JSON first, fall back to the raw text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw.trim()) {
            Ok(value) => LlmAnswer::Json(value),
            Err(_) => LlmAnswer::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for LlmAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmAnswer::Json(Value::String(s)) => f.write_str(s),
            LlmAnswer::Json(value) => write!(f, "{value}"),
            LlmAnswer::Text(text) => f.write_str(text),
        }
    }
}

mod openai;
pub mod prompt;

pub use openai::*;

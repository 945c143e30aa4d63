//! Dialogue provider abstraction and request/response types.
//!
//! This module defines the core abstractions for talking to a dialogue model.

use bastion_core::AppResult;
use serde::{Deserialize, Serialize};

/// Dialogue generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The user message
    pub prompt: String,

    /// Model identifier (ignored by providers that pick their own)
    pub model: String,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Temperature for sampling (0.0 - 2.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System prompt (directives and retrieved context)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl LlmRequest {
    /// Create a new request with required fields.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            system: None,
        }
    }

    /// Set the maximum tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the system prompt. Blank prompts are left out.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        if !system.trim().is_empty() {
            self.system = Some(system);
        }
        self
    }
}

/// Dialogue generation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated text
    pub content: String,

    /// Model that generated the response, when reported
    pub model: String,

    /// Usage statistics
    pub usage: LlmUsage,
}

/// Token usage statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LlmUsage {
    /// Tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,

    /// Total tokens used
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Create usage stats from prompt and completion token counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Trait for dialogue backends.
///
/// `generate` performs exactly one attempt. Transport failures map to
/// `AppError::DialogueUnavailable`, unusable replies to
/// `AppError::DialogueProtocol`.
#[async_trait::async_trait]
pub trait DialogueProvider: Send + Sync + std::fmt::Debug {
    /// Get the provider name (e.g., "http", "ollama").
    fn provider_name(&self) -> &str;

    /// Generate a reply for `request`.
    async fn generate(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

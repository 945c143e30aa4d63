//! Turns a built prompt into answer text.

use crate::client::{DialogueProvider, LlmRequest};
use bastion_core::config::DialogueConfig;
use bastion_core::{AppError, AppResult, RetryPolicy};
use bastion_prompt::BuiltPrompt;
use std::sync::Arc;

/// Dialogue generation with bounded retry.
#[derive(Debug, Clone)]
pub struct DialogueClient {
    provider: Arc<dyn DialogueProvider>,
    retry: RetryPolicy,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl DialogueClient {
    pub fn new(
        provider: Arc<dyn DialogueProvider>,
        config: &DialogueConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            retry,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Generate the raw answer for `prompt`.
    ///
    /// A transient failure is retried once; a second failure surfaces as
    /// `DialogueUnavailable`.
    pub async fn generate(&self, prompt: &BuiltPrompt) -> AppResult<String> {
        let request = LlmRequest::new(prompt.user.clone(), self.model.clone())
            .with_system(prompt.system.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        tracing::debug!(
            "Generating with {} ({} prompt chars)",
            self.provider.provider_name(),
            prompt.char_len()
        );

        let result = self
            .retry
            .run("dialogue", || self.provider.generate(&request))
            .await;

        match result {
            Ok(response) => {
                tracing::info!(
                    "Dialogue returned {} chars ({} tokens)",
                    response.content.chars().count(),
                    response.usage.total_tokens
                );
                Ok(response.content)
            }
            Err(e) => {
                if matches!(e, AppError::DialogueProtocol(_)) {
                    tracing::error!("Dialogue protocol fault: {}", e);
                } else {
                    tracing::warn!("Dialogue failed: {}", e);
                }
                Err(e)
            }
        }
    }
}

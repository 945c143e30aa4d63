//! Dialogue provider factory.
//!
//! Builds the provider selected by `dialogue.provider`.

use crate::client::DialogueProvider;
use crate::providers::ollama::DEFAULT_OLLAMA_URL;
use crate::providers::{HttpDialogueProvider, OllamaProvider};
use crate::types::ProviderType;
use bastion_core::config::{DialogueConfig, ServiceConfig};
use bastion_core::AppResult;
use std::sync::Arc;
use std::time::Duration;

/// Create a dialogue provider from configuration.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or its endpoint is invalid.
pub fn create_provider(
    dialogue: &DialogueConfig,
    service: &ServiceConfig,
) -> AppResult<Arc<dyn DialogueProvider>> {
    match ProviderType::resolve(&dialogue.provider)? {
        ProviderType::Http => Ok(Arc::new(HttpDialogueProvider::new(dialogue, service)?)),
        ProviderType::Ollama => {
            let base_url = dialogue.endpoint.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            let timeout = Duration::from_secs(service.timeout_secs);
            Ok(Arc::new(OllamaProvider::with_base_url(base_url, timeout)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::AppError;

    #[test]
    fn test_create_http_provider() {
        let provider =
            create_provider(&DialogueConfig::default(), &ServiceConfig::default()).unwrap();
        assert_eq!(provider.provider_name(), "http");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let dialogue = DialogueConfig {
            provider: "Ollama".to_string(),
            endpoint: Some("http://localhost:8080".to_string()),
            ..DialogueConfig::default()
        };
        let provider = create_provider(&dialogue, &ServiceConfig::default()).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
    }

    #[test]
    fn test_unknown_provider() {
        let dialogue = DialogueConfig {
            provider: "unknown".to_string(),
            ..DialogueConfig::default()
        };
        match create_provider(&dialogue, &ServiceConfig::default()) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown dialogue provider")),
            other => panic!("Expected config error, got {:?}", other.map(|_| ())),
        }
    }
}

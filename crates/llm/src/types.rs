//! Provider identifiers.

use bastion_core::{AppError, AppResult};

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    /// Remote dialogue endpoint under `service.baseUrl`
    Http,
    /// Local Ollama runtime
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Some(Self::Http),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Parse, reporting unknown names as configuration errors.
    pub fn resolve(s: &str) -> AppResult<Self> {
        Self::parse(s).ok_or_else(|| {
            AppError::Config(format!(
                "Unknown dialogue provider: {}. Supported: http, ollama",
                s
            ))
        })
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Ollama => "ollama",
        }
    }
}

//! Dialogue provider implementations.

pub mod http;
pub mod ollama;

pub use http::HttpDialogueProvider;
pub use ollama::OllamaProvider;

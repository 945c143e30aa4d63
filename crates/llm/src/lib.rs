//! Dialogue generation for Bastion.
//!
//! This crate provides a provider-agnostic abstraction over the dialogue
//! model. Providers implement [`DialogueProvider`] (one attempt per call);
//! [`DialogueClient`] adds the retry policy and turns a built prompt into
//! answer text.
//!
//! # Providers
//! - **http**: the dialogue endpoint next to the search service (default)
//! - **ollama**: a local Ollama runtime
//!
//! # Example
//! ```no_run
//! use bastion_core::config::{DialogueConfig, ServiceConfig};
//! use bastion_core::RetryPolicy;
//! use bastion_llm::{create_provider, DialogueClient};
//!
//! # async fn example(prompt: bastion_prompt::BuiltPrompt) -> Result<(), Box<dyn std::error::Error>> {
//! let service = ServiceConfig::default();
//! let dialogue = DialogueConfig::default();
//! let provider = create_provider(&dialogue, &service)?;
//! let client = DialogueClient::new(provider, &dialogue, RetryPolicy::from(&service));
//! let answer = client.generate(&prompt).await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod dialogue;
pub mod factory;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{DialogueProvider, LlmRequest, LlmResponse, LlmUsage};
pub use dialogue::DialogueClient;
pub use factory::create_provider;
pub use providers::{HttpDialogueProvider, OllamaProvider};
pub use types::ProviderType;

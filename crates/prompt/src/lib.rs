//! Prompt system for Bastion.
//!
//! This crate provides:
//! - YAML-based prompt definitions
//! - Handlebars template rendering
//! - Length-bounded assembly of directives, retrieved context and the query

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::PromptBuilder;
pub use loader::{list_prompts, load_prompt, validate_prompt};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, ContextLayout, PromptDefinition, PromptDirectives,
    BUILTIN_PROMPT_ID,
};

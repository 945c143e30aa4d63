//! Bastion Core Library
//!
//! This crate provides the foundational pieces shared by every Bastion crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management
//! - Domain types for queries, snippets and answers
//! - Retry policy for the external service calls

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use retry::RetryPolicy;
pub use types::{Answer, Citation, GuardVerdict, Mode, PromptPayload, Query, RawHit, Snippet};

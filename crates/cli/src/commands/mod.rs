//! Command handlers for the Bastion CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod batch;
pub mod prompts;
pub mod report;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use batch::BatchCommand;
pub use prompts::PromptsCommand;

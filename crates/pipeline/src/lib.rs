//! Bastion query pipeline.
//!
//! Wires the guard, retriever, result processor, prompt builder and dialogue
//! client into one state machine:
//!
//! ```text
//! Received → InputChecked → [Retrieved → Processed] → Prompted → Generated
//!          → OutputChecked → Done
//! ```
//!
//! `Error` is reachable from every live state. A refused query or answer is
//! not an error; it comes back as a flagged [`Answer`](bastion_core::Answer).
//!
//! # Example
//!
//! ```no_run
//! use bastion_core::{AppConfig, Query};
//! use bastion_pipeline::Pipeline;
//!
//! # async fn example() -> bastion_core::AppResult<()> {
//! let config = AppConfig::load()?;
//! let pipeline = Pipeline::from_config(&config)?;
//!
//! let answer = pipeline.answer_query(Query::rag("如何防御SQL注入？")).await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod pipeline;
pub mod state;

pub use pipeline::{Pipeline, PipelineRun};
pub use state::{PipelineState, Trace};

//! Corpus retrieval for Bastion.
//!
//! The [`Retriever`] asks a [`SearchProvider`] for raw hits, and the
//! [`ResultProcessor`] turns them into ranked, deduplicated snippets.

pub mod processor;
pub mod provider;
pub mod providers;
pub mod retriever;

pub use processor::{citations, ResultProcessor};
pub use provider::{SearchProvider, SearchRequest};
pub use providers::http::HttpSearchProvider;
pub use retriever::Retriever;

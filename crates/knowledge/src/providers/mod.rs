//! Search provider implementations.

pub mod http;

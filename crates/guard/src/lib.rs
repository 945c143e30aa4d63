//! Safety guard for Bastion.
//!
//! This crate validates inbound queries and outbound answers against the
//! configured [`GuardPolicy`](bastion_core::config::GuardPolicy):
//! - Length limits and empty-text checks
//! - Blocked terms and regular expressions
//! - Long repeated substrings (flooding / token-stuffing)
//!
//! Every check emits a best-effort audit record to an injected [`AuditSink`].

pub mod audit;
pub mod fingerprint;
pub mod guard;
pub mod repeat;
pub mod sanitize;

// Re-export main types
pub use audit::{
    create_sink, AuditDirection, AuditRecord, AuditSink, JsonlAuditSink, NoopAuditSink,
    TracingAuditSink,
};
pub use fingerprint::fingerprint;
pub use guard::Guard;

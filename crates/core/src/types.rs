//! Domain types flowing through the query pipeline.
//!
//! All of these values are built per request, consumed once, and dropped.
//! Nothing here is cached or shared between requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Answering mode for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ask the dialogue model directly
    Direct,
    /// Retrieve context from a corpus first
    Rag,
}

impl Mode {
    /// Get the canonical mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Rag => "rag",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "rag" => Ok(Self::Rag),
            other => Err(AppError::Config(format!(
                "Unknown mode: {}. Supported: direct, rag",
                other
            ))),
        }
    }
}

/// A user question as received from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Question text exactly as typed
    pub raw_text: String,

    /// Answering mode
    pub mode: Mode,

    /// Corpus to search, or several separated by commas (RAG only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_id: Option<String>,

    /// Number of snippets wanted (RAG only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Query {
    /// Create a direct-mode query.
    pub fn direct(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            mode: Mode::Direct,
            corpus_id: None,
            top_k: None,
        }
    }

    /// Create a retrieval-augmented query.
    pub fn rag(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            mode: Mode::Rag,
            corpus_id: None,
            top_k: None,
        }
    }

    /// Set the corpus to search.
    pub fn with_corpus(mut self, corpus_id: impl Into<String>) -> Self {
        self.corpus_id = Some(corpus_id.into());
        self
    }

    /// Set the number of snippets wanted.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Resolve top_k against the configured default. Never returns 0.
    pub fn effective_top_k(&self, default_top_k: usize) -> usize {
        self.top_k.unwrap_or(default_top_k).max(1)
    }

    /// Corpora to search, resolved against the configured default.
    ///
    /// `corpus_id` may name several corpora separated by commas. Blank
    /// entries and repeats are skipped; the result is never empty.
    pub fn effective_corpora<'a>(&'a self, default_corpus: &'a str) -> Vec<&'a str> {
        let mut corpora: Vec<&str> = Vec::new();
        for corpus in self
            .corpus_id
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            if !corpora.contains(&corpus) {
                corpora.push(corpus);
            }
        }

        if corpora.is_empty() {
            corpora.push(default_corpus);
        }
        corpora
    }
}

/// One raw hit returned by the search collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    /// Document identifier (`file_id` on the wire)
    pub source_id: String,

    /// Document text
    pub text: String,

    /// Relevance score reported by the collaborator
    pub score: f32,

    /// Corpus the hit came from
    #[serde(default)]
    pub corpus_id: String,

    /// Free-form metadata attached to the document
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RawHit {
    /// Create a hit without metadata.
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        score: f32,
        corpus_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            score,
            corpus_id: corpus_id.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// A citation-ready excerpt of a retrieved document.
///
/// Fields are private: a snippet never changes after the result processor
/// produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snippet {
    source_id: String,
    text: String,
    score: f32,
    corpus_id: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    metadata: serde_json::Value,
}

impl Snippet {
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        score: f32,
        corpus_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            score,
            corpus_id: corpus_id.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach document metadata. Anything but a non-empty object is stored as null.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = match metadata {
            serde_json::Value::Object(map) if !map.is_empty() => serde_json::Value::Object(map),
            _ => serde_json::Value::Null,
        };
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn corpus_id(&self) -> &str {
        &self.corpus_id
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Metadata as `key: value` pairs joined by `, `, empty when there is none.
    ///
    /// String values are written without quotes.
    pub fn metadata_summary(&self) -> String {
        match &self.metadata {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(key, value)| match value {
                    serde_json::Value::String(s) => format!("{}: {}", key, s),
                    other => format!("{}: {}", key, other),
                })
                .collect::<Vec<_>>()
                .join(", "),
            _ => String::new(),
        }
    }
}

impl From<Snippet> for RawHit {
    fn from(snippet: Snippet) -> Self {
        RawHit {
            source_id: snippet.source_id,
            text: snippet.text,
            score: snippet.score,
            corpus_id: snippet.corpus_id,
            metadata: snippet.metadata,
        }
    }
}

/// Everything the prompt builder needs for one request.
///
/// `context_snippets` is empty exactly when the mode is `Direct`; the fields
/// are private so that holds after construction.
#[derive(Debug, Clone)]
pub struct PromptPayload {
    system_directives: Vec<String>,
    context_snippets: Vec<Snippet>,
    user_query: String,
    mode: Mode,
}

impl PromptPayload {
    /// Payload without retrieved context.
    pub fn direct(system_directives: Vec<String>, user_query: impl Into<String>) -> Self {
        Self {
            system_directives,
            context_snippets: Vec::new(),
            user_query: user_query.into(),
            mode: Mode::Direct,
        }
    }

    /// Payload with retrieved context.
    ///
    /// An empty snippet list yields a direct payload.
    pub fn rag(
        system_directives: Vec<String>,
        context_snippets: Vec<Snippet>,
        user_query: impl Into<String>,
    ) -> Self {
        let mode = if context_snippets.is_empty() {
            Mode::Direct
        } else {
            Mode::Rag
        };

        Self {
            system_directives,
            context_snippets,
            user_query: user_query.into(),
            mode,
        }
    }

    pub fn system_directives(&self) -> &[String] {
        &self.system_directives
    }

    pub fn context_snippets(&self) -> &[Snippet] {
        &self.context_snippets
    }

    pub fn user_query(&self) -> &str {
        &self.user_query
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

/// Numbered reference to a snippet used in the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based label matching `[n]` in the context block
    pub index: usize,
    pub source_id: String,
    pub corpus_id: String,
    pub score: f32,

    /// Document metadata carried over from the search hit
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

/// Final answer returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,

    /// True when the guard refused the query or replaced the model output
    pub flagged: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,

    /// Sources the prompt was grounded on (empty for direct answers)
    #[serde(default)]
    pub citations: Vec<Citation>,

    /// Mode the answer was actually produced in
    pub mode: Mode,
}

impl Answer {
    /// A normal, unflagged answer.
    pub fn new(text: impl Into<String>, mode: Mode, citations: Vec<Citation>) -> Self {
        Self {
            text: text.into(),
            flagged: false,
            flag_reason: None,
            citations,
            mode,
        }
    }

    /// A fixed refusal message standing in for a rejected query or answer.
    pub fn refused(text: impl Into<String>, reason: impl Into<String>, mode: Mode) -> Self {
        Self {
            text: text.into(),
            flagged: true,
            flag_reason: Some(reason.into()),
            citations: Vec::new(),
            mode,
        }
    }
}

/// Result of a single guard check. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub sanitized_text: Option<String>,
}

impl GuardVerdict {
    pub fn allow(sanitized_text: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: None,
            sanitized_text: Some(sanitized_text.into()),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            sanitized_text: None,
        }
    }
}

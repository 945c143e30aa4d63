//! JSON rendering of pipeline runs.

use bastion_core::{AppError, Answer};
use bastion_pipeline::{PipelineRun, PipelineState};
use serde::Serialize;

/// One run as printed by `--json` and `batch`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub question: String,
    pub run_id: String,
    pub trace: Vec<PipelineState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    pub detail: String,
}

impl RunReport {
    pub fn new(question: impl Into<String>, run: &PipelineRun) -> Self {
        let (answer, error) = match &run.outcome {
            Ok(answer) => (Some(answer.clone()), None),
            Err(e) => (None, Some(ErrorReport::from(e))),
        };

        Self {
            line: None,
            question: question.into(),
            run_id: run.run_id.to_string(),
            trace: run.trace.states().to_vec(),
            answer,
            error,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_flagged(&self) -> bool {
        self.answer.as_ref().is_some_and(|a| a.flagged)
    }

    pub fn to_json(&self) -> Result<String, AppError> {
        serde_json::to_string(self).map_err(AppError::from)
    }
}

impl From<&AppError> for ErrorReport {
    fn from(error: &AppError) -> Self {
        Self {
            kind: error_kind(error),
            message: error.user_message(),
            detail: error.to_string(),
        }
    }
}

/// Stable name for an error variant.
pub fn error_kind(error: &AppError) -> &'static str {
    match error {
        AppError::Config(_) => "config",
        AppError::Io(_) => "io",
        AppError::Serialization(_) => "serialization",
        AppError::CorpusNotFound { .. } => "corpus_not_found",
        AppError::RetrievalUnavailable(_) => "retrieval_unavailable",
        AppError::RetrievalProtocol(_) => "retrieval_protocol",
        AppError::DialogueUnavailable(_) => "dialogue_unavailable",
        AppError::DialogueProtocol(_) => "dialogue_protocol",
        AppError::Prompt(_) => "prompt",
        AppError::Other(_) => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_report_for_unknown_corpus() {
        let error = AppError::CorpusNotFound {
            corpus_id: "nonexistent".to_string(),
        };
        let report = ErrorReport::from(&error);

        assert_eq!(report.kind, "corpus_not_found");
        assert!(report.message.contains("nonexistent"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "corpus_not_found");
    }
}

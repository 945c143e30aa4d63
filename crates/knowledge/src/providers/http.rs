//! HTTP search provider
//!
//! Talks to the document-search service:
//!
//! ```text
//! POST {baseUrl}/databases/{corpus}/search
//! {"token": "...", "query": "...", "top_k": 5, "metric_type": "COSINE", "score_threshold": 0.0}
//! ```
//!
//! A successful reply carries `"status": "success"` and the hits under one of
//! `files`, `results` or `data`, each shaped `{file_id, text, score, metadata}`.

use crate::provider::{SearchProvider, SearchRequest};
use async_trait::async_trait;
use bastion_core::config::{RetrievalConfig, ServiceConfig};
use bastion_core::{AppError, AppResult, RawHit};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Keys that may hold the hit list, in lookup order.
const HIT_LIST_KEYS: [&str; 3] = ["files", "results", "data"];

/// Phrases the service uses when something does not exist.
const MISSING_CORPUS_MARKERS: [&str; 4] = ["not found", "not exist", "no such", "不存在"];

/// A missing-thing message only means a missing corpus when it names one
/// of these, or the requested corpus id itself.
const CORPUS_SUBJECTS: [&str; 5] = ["database", "corpus", "collection", "数据库", "知识库"];

/// Longest body excerpt quoted in error messages.
const BODY_EXCERPT_CHARS: usize = 200;

/// Search provider backed by the remote search service.
#[derive(Debug, Clone)]
pub struct HttpSearchProvider {
    client: Client,
    base_url: Url,
    service: ServiceConfig,
    metric_type: String,
    score_threshold: f32,
    expr: Option<String>,
}

/// Request body for the search endpoint
#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    token: &'a str,
    query: &'a str,
    top_k: usize,
    metric_type: &'a str,
    score_threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    expr: Option<&'a str>,
}

impl HttpSearchProvider {
    /// Create a provider from the service and retrieval sections.
    ///
    /// # Errors
    /// * `AppError::Config` - If the base URL is invalid or the client cannot be built
    pub fn new(service: &ServiceConfig, retrieval: &RetrievalConfig) -> AppResult<Self> {
        let base_url = Url::parse(service.base_url.trim()).map_err(|e| {
            AppError::Config(format!("Invalid service.baseUrl {:?}: {}", service.base_url, e))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "service.baseUrl cannot be used as a base: {}",
                service.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(service.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            service: service.clone(),
            metric_type: retrieval.metric_type.clone(),
            score_threshold: retrieval.score_threshold,
            expr: retrieval.expr.clone().filter(|e| !e.trim().is_empty()),
        })
    }

    /// Endpoint for `corpus_id`, with the id escaped as one path segment.
    pub fn search_url(&self, corpus_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["databases", corpus_id, "search"]);
        }
        url
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    fn provider_name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(corpus = %request.corpus_id, top_k = request.top_k))]
    async fn search(&self, request: &SearchRequest) -> AppResult<Vec<RawHit>> {
        let url = self.search_url(&request.corpus_id);

        let body = SearchBody {
            token: self.service.token_for_corpus(&request.corpus_id),
            query: &request.query,
            top_k: request.top_k,
            metric_type: &self.metric_type,
            score_threshold: self.score_threshold,
            expr: self.expr.as_deref(),
        };

        debug!("Sending search request to {}", url);

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::RetrievalUnavailable(format!("Search request failed: {}", e))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AppError::RetrievalUnavailable(format!("Failed to read search response: {}", e))
        })?;

        debug!("Search responded {} with {} bytes", status, text.len());

        parse_search_response(&request.corpus_id, status, &text)
    }
}

/// Interpret a search reply.
pub(crate) fn parse_search_response(
    corpus_id: &str,
    status: StatusCode,
    body: &str,
) -> AppResult<Vec<RawHit>> {
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::CorpusNotFound {
            corpus_id: corpus_id.to_string(),
        });
    }

    let parsed = serde_json::from_str::<Value>(body);

    if let Ok(value) = &parsed {
        if reports_missing_corpus(corpus_id, value) {
            return Err(AppError::CorpusNotFound {
                corpus_id: corpus_id.to_string(),
            });
        }
    }

    if !status.is_success() {
        return Err(AppError::RetrievalProtocol(format!(
            "Search service returned {}: {}",
            status,
            excerpt(body)
        )));
    }

    let value = parsed.map_err(|e| {
        AppError::RetrievalProtocol(format!("Invalid JSON from search service: {}", e))
    })?;

    let reported = value.get("status").and_then(Value::as_str).unwrap_or("");
    if reported != "success" {
        return Err(AppError::RetrievalProtocol(format!(
            "Search service reported status {:?}: {}",
            reported,
            message_of(&value).unwrap_or_default()
        )));
    }

    let hits = HIT_LIST_KEYS
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .ok_or_else(|| {
            AppError::RetrievalProtocol("Search response has no hit list".to_string())
        })?;

    Ok(hits
        .iter()
        .enumerate()
        .map(|(i, hit)| parse_hit(corpus_id, i + 1, hit))
        .collect())
}

/// Convert one wire hit. Unusable scores become NaN so the processor drops them.
fn parse_hit(corpus_id: &str, position: usize, hit: &Value) -> RawHit {
    let source_id = match hit.get("file_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => format!("doc#{}", position),
    };

    let text = hit
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let score = match hit.get("score") {
        Some(Value::Number(n)) => n.as_f64().map(|s| s as f32).unwrap_or(f32::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f32::NAN),
        _ => f32::NAN,
    };

    let metadata = match hit.get("metadata") {
        Some(meta @ Value::Object(_)) => meta.clone(),
        _ => Value::Null,
    };

    RawHit {
        source_id,
        text,
        score,
        corpus_id: corpus_id.to_string(),
        metadata,
    }
}

fn message_of(value: &Value) -> Option<String> {
    ["message", "detail", "error"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|m| match m {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

fn reports_missing_corpus(corpus_id: &str, value: &Value) -> bool {
    let failed = value.get("status").and_then(Value::as_str) != Some("success");
    failed
        && message_of(value)
            .map(|m| {
                let lower = m.to_lowercase();
                MISSING_CORPUS_MARKERS
                    .iter()
                    .any(|marker| lower.contains(marker))
                    && (CORPUS_SUBJECTS
                        .iter()
                        .any(|subject| lower.contains(subject))
                        || (!corpus_id.is_empty() && lower.contains(&corpus_id.to_lowercase())))
            })
            .unwrap_or(false)
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HttpSearchProvider {
        HttpSearchProvider::new(&ServiceConfig::default(), &RetrievalConfig::default()).unwrap()
    }

    #[test]
    fn test_search_url() {
        let provider = provider();
        assert_eq!(
            provider.search_url("common_dataset").as_str(),
            "http://localhost:9002/api/databases/common_dataset/search"
        );
    }

    #[test]
    fn test_search_url_escapes_corpus_and_trailing_slash() {
        let service = ServiceConfig {
            base_url: "http://search.local/api/".to_string(),
            ..ServiceConfig::default()
        };
        let provider = HttpSearchProvider::new(&service, &RetrievalConfig::default()).unwrap();
        assert_eq!(
            provider.search_url("a/b").as_str(),
            "http://search.local/api/databases/a%2Fb/search"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let service = ServiceConfig {
            base_url: "not a url".to_string(),
            ..ServiceConfig::default()
        };
        let result = HttpSearchProvider::new(&service, &RetrievalConfig::default());
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_body_serialization() {
        let body = SearchBody {
            token: "token_common",
            query: "如何防御SQL注入？",
            top_k: 5,
            metric_type: "COSINE",
            score_threshold: 0.0,
            expr: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["token"], "token_common");
        assert_eq!(json["top_k"], 5);
        assert_eq!(json["metric_type"], "COSINE");
        assert!(json.get("expr").is_none());
    }

    #[test]
    fn test_parse_files_list() {
        let body = r#"{
            "status": "success",
            "files": [
                {"file_id": "owasp-a03", "text": "Use parameterized queries.", "score": 0.91, "metadata": {"lang": "en"}},
                {"file_id": 42, "text": "预编译语句", "score": "0.75"},
                {"text": "no id", "score": 0.6}
            ]
        }"#;

        let hits = parse_search_response("common_dataset", StatusCode::OK, body).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].source_id, "owasp-a03");
        assert!((hits[0].score - 0.91).abs() < 1e-6);
        assert_eq!(hits[0].metadata["lang"], "en");
        assert_eq!(hits[0].corpus_id, "common_dataset");
        assert_eq!(hits[1].source_id, "42");
        assert!((hits[1].score - 0.75).abs() < 1e-6);
        assert_eq!(hits[2].source_id, "doc#3");
        assert!(hits[2].metadata.is_null());
    }

    #[test]
    fn test_parse_results_and_data_keys() {
        let body = r#"{"status": "success", "results": [{"file_id": "a", "text": "x", "score": 0.7}]}"#;
        assert_eq!(parse_search_response("c", StatusCode::OK, body).unwrap().len(), 1);

        let body = r#"{"status": "success", "data": []}"#;
        assert!(parse_search_response("c", StatusCode::OK, body).unwrap().is_empty());
    }

    #[test]
    fn test_unparseable_score_is_nan() {
        let body = r#"{"status": "success", "files": [{"file_id": "a", "text": "x", "score": "high"}]}"#;
        let hits = parse_search_response("c", StatusCode::OK, body).unwrap();
        assert!(hits[0].score.is_nan());
    }

    #[test]
    fn test_404_is_corpus_not_found() {
        let result = parse_search_response("nonexistent", StatusCode::NOT_FOUND, "");
        match result {
            Err(AppError::CorpusNotFound { corpus_id }) => assert_eq!(corpus_id, "nonexistent"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_database_message_is_corpus_not_found() {
        let body = r#"{"status": "error", "message": "数据库 nonexistent 不存在"}"#;
        let result = parse_search_response("nonexistent", StatusCode::BAD_REQUEST, body);
        assert!(matches!(result, Err(AppError::CorpusNotFound { .. })));

        let body = r#"{"status": "error", "message": "Database Not Found"}"#;
        let result = parse_search_response("nonexistent", StatusCode::OK, body);
        assert!(matches!(result, Err(AppError::CorpusNotFound { .. })));
    }

    #[test]
    fn test_missing_corpus_named_by_id() {
        let body = r#"{"status": "error", "message": "student_corpus: no such index"}"#;
        let result = parse_search_response("student_corpus", StatusCode::OK, body);
        assert!(matches!(result, Err(AppError::CorpusNotFound { .. })));
    }

    #[test]
    fn test_missing_token_or_user_is_protocol() {
        for message in ["no such token", "user not found", "令牌不存在"] {
            let body = serde_json::json!({"status": "error", "message": message}).to_string();
            let result = parse_search_response("common_dataset", StatusCode::OK, &body);
            assert!(
                matches!(result, Err(AppError::RetrievalProtocol(_))),
                "{}: {:?}",
                message,
                result
            );
        }

        let body = r#"{"status": "error", "message": "no such token"}"#;
        let result = parse_search_response("common_dataset", StatusCode::FORBIDDEN, body);
        assert!(matches!(result, Err(AppError::RetrievalProtocol(_))));
    }

    #[test]
    fn test_server_error_is_protocol() {
        let result = parse_search_response("c", StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(result, Err(AppError::RetrievalProtocol(_))));
    }

    #[test]
    fn test_invalid_json_is_protocol() {
        let result = parse_search_response("c", StatusCode::OK, "<html>");
        assert!(matches!(result, Err(AppError::RetrievalProtocol(_))));
    }

    #[test]
    fn test_failed_status_is_protocol() {
        let body = r#"{"status": "error", "message": "invalid token"}"#;
        let result = parse_search_response("c", StatusCode::OK, body);
        match result {
            Err(AppError::RetrievalProtocol(msg)) => assert!(msg.contains("invalid token")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_hit_list_is_protocol() {
        let body = r#"{"status": "success"}"#;
        let result = parse_search_response("c", StatusCode::OK, body);
        assert!(matches!(result, Err(AppError::RetrievalProtocol(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let service = ServiceConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            timeout_secs: 2,
            ..ServiceConfig::default()
        };
        let provider = HttpSearchProvider::new(&service, &RetrievalConfig::default()).unwrap();
        let request = SearchRequest {
            corpus_id: "common_dataset".to_string(),
            query: "防火墙".to_string(),
            top_k: 5,
        };

        let result = provider.search(&request).await;
        assert!(matches!(result, Err(AppError::RetrievalUnavailable(_))));
    }
}

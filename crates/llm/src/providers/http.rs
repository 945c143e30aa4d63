//! HTTP dialogue provider.
//!
//! `POST {baseUrl}/dialogue` with `{user_input, token, custom_prompt?,
//! temperature, max_tokens}`; a usable reply is `{"status": "success",
//! "response": "..."}`.

use crate::client::{DialogueProvider, LlmRequest, LlmResponse, LlmUsage};
use bastion_core::config::{DialogueConfig, ServiceConfig};
use bastion_core::{AppError, AppResult};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Dialogue API request format.
#[derive(Debug, Serialize)]
struct DialogueBody<'a> {
    user_input: &'a str,
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_prompt: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
}

/// Dialogue API response format.
#[derive(Debug, Deserialize)]
struct DialogueReply {
    #[serde(default)]
    status: String,
    response: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Dialogue client for the remote service.
#[derive(Debug, Clone)]
pub struct HttpDialogueProvider {
    /// Full dialogue endpoint
    url: Url,

    /// Token presented with each request
    token: String,

    /// HTTP client
    client: Client,
}

impl HttpDialogueProvider {
    /// Create a provider against `dialogue.endpoint`, or `service.baseUrl`
    /// when no endpoint is set.
    pub fn new(dialogue: &DialogueConfig, service: &ServiceConfig) -> AppResult<Self> {
        let base = dialogue
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(&service.base_url);

        let mut url = Url::parse(base.trim())
            .map_err(|e| AppError::Config(format!("Invalid dialogue endpoint {:?}: {}", base, e)))?;

        url.path_segments_mut()
            .map_err(|_| {
                AppError::Config(format!("Dialogue endpoint cannot be used as a base: {}", base))
            })?
            .pop_if_empty()
            .push("dialogue");

        let client = Client::builder()
            .timeout(Duration::from_secs(service.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url,
            token: service.user_token.clone(),
            client,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait::async_trait]
impl DialogueProvider for HttpDialogueProvider {
    fn provider_name(&self) -> &str {
        "http"
    }

    async fn generate(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let body = DialogueBody {
            user_input: &request.prompt,
            token: &self.token,
            custom_prompt: request.system.as_deref(),
            temperature: request.temperature.unwrap_or(0.7),
            max_tokens: request.max_tokens.unwrap_or(300),
        };

        tracing::debug!(
            "Sending dialogue request to {} ({} chars of system prompt)",
            self.url,
            body.custom_prompt.map(|s| s.chars().count()).unwrap_or(0)
        );

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::DialogueUnavailable(format!("Dialogue request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AppError::DialogueUnavailable(format!("Failed to read dialogue response: {}", e))
        })?;

        let content = parse_dialogue_response(status, &text)?;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

/// Extract the generated text from a dialogue reply.
pub(crate) fn parse_dialogue_response(status: StatusCode, body: &str) -> AppResult<String> {
    if !status.is_success() {
        let excerpt: String = body.chars().take(200).collect();
        return Err(AppError::DialogueProtocol(format!(
            "Dialogue service returned {}: {}",
            status, excerpt
        )));
    }

    let reply: DialogueReply = serde_json::from_str(body).map_err(|e| {
        AppError::DialogueProtocol(format!("Invalid JSON from dialogue service: {}", e))
    })?;

    if reply.status != "success" {
        return Err(AppError::DialogueProtocol(format!(
            "Dialogue service reported status {:?}: {}",
            reply.status,
            reply.message.unwrap_or_default()
        )));
    }

    reply.response.ok_or_else(|| {
        AppError::DialogueProtocol("Dialogue response has no `response` field".to_string())
    })
}

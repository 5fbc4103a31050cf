//! Boundary to the hosted generative model.
//!
//! Two seams are exposed: [`ContentGenerator`] for one-shot, schema-constrained
//! generation (document analysis, care plans) and [`ChatModel`] for grounded
//! multi-turn conversation. The production implementations talk to Gemini;
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use reqwest::Client;
use rig::{
    client::CompletionClient,
    completion::{Chat, Message},
    providers::gemini,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::GuardianConfig,
    error::ModelError,
    models::{ChatMessage, ChatRole},
};

/// One piece of request content.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: String },
}

/// A single "generate structured content" call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub parts: Vec<Part>,
    pub response_schema: Value,
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Returns the raw text of the model answer, expected to be JSON matching
    /// `request.response_schema`.
    async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError>;
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produces the assistant reply to `message`, given the system instruction
    /// and the committed conversation so far.
    async fn reply(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String, ModelError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody<'a> {
    contents: Vec<WireContent>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum WirePart {
    Text(String),
    InlineData(WireBlob),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        match part {
            Part::Text(text) => WirePart::Text(text),
            Part::InlineData { mime_type, data } => {
                WirePart::InlineData(WireBlob { mime_type, data })
            }
        }
    }
}

fn build_body(request: &GenerationRequest) -> GenerateContentBody<'_> {
    GenerateContentBody {
        contents: vec![WireContent {
            role: "user",
            parts: request.parts.iter().cloned().map(WirePart::from).collect(),
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: &request.response_schema,
        },
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, ModelError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

/// Pulls `error.message` out of a Gemini error body, falling back to the raw body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(512).collect())
}

/// `generateContent` client over plain HTTP.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &GuardianConfig) -> Result<Self, ModelError> {
        let http = Client::builder().user_agent("health-guardian").build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, ModelError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&request.model)
        );

        info!(model = %request.model, parts = request.parts.len(), "Calling generateContent");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Upstream {
                status,
                message: upstream_message(&body),
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = extract_text(parsed)?;
        debug!(model = %request.model, chars = text.len(), "generateContent answered");
        Ok(text)
    }
}

/// Conversational model backed by rig's Gemini provider.
pub struct RigChatModel {
    client: gemini::Client,
    model: String,
}

impl RigChatModel {
    /// Builds the provider client against the same host as [`GeminiClient`].
    pub fn new(config: &GuardianConfig) -> Result<Self, ModelError> {
        let client = gemini::Client::builder(&config.api_key)
            .base_url(config.chat_base_url())
            .build()
            .map_err(|e| ModelError::Chat(format!("failed to build chat client: {e}")))?;
        Ok(Self {
            client,
            model: config.chat_model.clone(),
        })
    }
}

fn to_rig_messages(history: &[ChatMessage]) -> Vec<Message> {
    history
        .iter()
        .map(|m| match m.role {
            ChatRole::User => Message::user(m.text.clone()),
            ChatRole::Assistant => Message::assistant(m.text.clone()),
        })
        .collect()
}

#[async_trait]
impl ChatModel for RigChatModel {
    async fn reply(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<String, ModelError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(system_instruction)
            .build();

        info!(model = %self.model, history = history.len(), "Sending chat turn");

        agent
            .chat(message, to_rig_messages(history))
            .await
            .map_err(|e| ModelError::Chat(e.to_string()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_carries_parts_and_schema() {
        let request = GenerationRequest {
            model: "gemini-2.5-pro".to_string(),
            parts: vec![
                Part::Text("Analyze this".to_string()),
                Part::InlineData {
                    mime_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                },
            ],
            response_schema: json!({"type": "OBJECT"}),
        };

        let body = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "Analyze this"},
                        {"inlineData": {"mimeType": "image/png", "data": "AAAA"}}
                    ]
                }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": {"type": "OBJECT"}
                }
            })
        );
    }

    #[test]
    fn test_extract_text_joins_first_candidate_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_text_without_candidates_is_empty_response() {
        let response: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(extract_text(response), Err(ModelError::EmptyResponse)));

        let response: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        assert!(matches!(extract_text(response), Err(ModelError::EmptyResponse)));
    }

    #[test]
    fn test_upstream_message_prefers_error_message() {
        let body = json!({
            "error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}
        });
        assert_eq!(upstream_message(&body.to_string()), "The model is overloaded.");
        assert_eq!(upstream_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_chat_model_builds_from_overridden_base_url() {
        let config = GuardianConfig::from_lookup(|key| match key {
            "API_KEY" => Some("key".to_string()),
            "GEMINI_BASE_URL" => Some("http://localhost:9000/v1beta".to_string()),
            _ => None,
        })
        .unwrap();
        let model = RigChatModel::new(&config).unwrap();
        assert_eq!(model.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_history_maps_to_rig_roles() {
        let history = vec![
            ChatMessage::user("Is 10 g/dL low?"),
            ChatMessage::assistant("It is below range."),
        ];
        let messages = to_rig_messages(&history);
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], Message::User { .. }));
        assert!(matches!(messages[1], Message::Assistant { .. }));
    }
}

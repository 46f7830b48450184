use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::{BASE64_STANDARD, Engine as _};
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::requirements::{RequirementPart, RequirementsInput};
use crate::error::{AppError, AppResult};
use crate::services::LanguageModelService;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Finish reasons that mean the provider withheld the answer.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: String, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build().map_err(|err| {
            AppError::Configuration(format!("failed to build Gemini HTTP client: {err}"))
        })?;
        Ok(Self {
            http,
            base_url: GEMINI_API_BASE.to_string(),
            api_key,
            model,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn request_body(input: &RequirementsInput) -> GenerateContentRequest {
        let parts = input
            .parts()
            .iter()
            .map(|part| match part {
                RequirementPart::Text(text) => RequestPart::Text { text: text.clone() },
                RequirementPart::Image { data, mime_type } => RequestPart::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.as_str(),
                        data: BASE64_STANDARD.encode(data),
                    },
                },
            })
            .collect();

        GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        }
    }
}

#[async_trait]
impl LanguageModelService for GeminiClient {
    async fn generate(&self, input: &RequirementsInput) -> AppResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Configuration("Gemini API key not configured".to_string()))?;

        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&Self::request_body(input))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::ModelUnavailable(format!("Gemini request timed out: {err}"))
                } else {
                    AppError::ModelUnavailable(format!("failed to call Gemini: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiErrorBody>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or_else(|_| body.trim().to_string());
            return Err(classify_status(status, message));
        }

        let payload: GenerateContentResponse = response.json().await.map_err(|err| {
            AppError::ModelUnavailable(format!("failed to read Gemini response: {err}"))
        })?;
        extract_text(payload)
    }
}

fn classify_status(status: StatusCode, message: String) -> AppError {
    let detail = format!("Gemini responded with {status}: {message}");
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        AppError::ModelUnavailable(detail)
    } else {
        AppError::ModelRejected(detail)
    }
}

fn extract_text(payload: GenerateContentResponse) -> AppResult<String> {
    if let Some(reason) = payload
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(AppError::ModelRejected(format!("prompt blocked: {reason}")));
    }

    let candidate = payload
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AppError::ModelRejected("no candidates returned".to_string()))?;

    let finish_reason = candidate.finish_reason.unwrap_or_default();
    if BLOCKING_FINISH_REASONS.contains(&finish_reason.as_str()) {
        return Err(AppError::ModelRejected(format!(
            "response withheld: {finish_reason}"
        )));
    }

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();
    debug!(%finish_reason, chars = text.len(), "extracted Gemini text");
    Ok(text)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::domain::requirements::ImageMime;

    const MODEL_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(
            Some("test-key".to_string()),
            "gemini-2.5-flash".to_string(),
            Duration::from_secs(5),
        )
        .expect("client builds")
        .with_base_url(server.uri())
    }

    fn input() -> RequirementsInput {
        RequirementsInput::from_parts(vec![
            RequirementPart::Text("Instruction".to_string()),
            RequirementPart::Text("Requirements".to_string()),
            RequirementPart::Image {
                data: b"png-bytes".to_vec(),
                mime_type: ImageMime::Png,
            },
        ])
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        }))
    }

    #[tokio::test]
    async fn sends_parts_in_order_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_partial_json(json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "Instruction" },
                        { "text": "Requirements" },
                        { "inlineData": { "mimeType": "image/png", "data": BASE64_STANDARD.encode(b"png-bytes") } }
                    ]
                }],
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(text_response(r#"{"epics": []}"#))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server).generate(&input()).await.expect("generated");
        assert_eq!(text, r#"{"epics": []}"#);
    }

    #[tokio::test]
    async fn returns_non_json_text_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(text_response("Here you go: {\"epics\": ["))
            .mount(&server)
            .await;

        let text = client(&server).generate(&input()).await.expect("generated");
        assert_eq!(text, "Here you go: {\"epics\": [");
    }

    #[tokio::test]
    async fn quota_errors_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate(&input()).await.expect_err("quota");
        assert!(matches!(err, AppError::ModelRejected(message) if message.contains("exhausted")));
    }

    #[tokio::test]
    async fn server_errors_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server).generate(&input()).await.expect_err("unavailable");
        assert!(matches!(err, AppError::ModelUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn timeouts_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(text_response("{}").set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = GeminiClient::new(
            Some("test-key".to_string()),
            "gemini-2.5-flash".to_string(),
            Duration::from_millis(50),
        )
        .expect("client builds")
        .with_base_url(server.uri());

        let err = client.generate(&input()).await.expect_err("timed out");
        assert!(matches!(err, AppError::ModelUnavailable(message) if message.contains("timed out")));
    }

    #[tokio::test]
    async fn safety_blocks_are_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "promptFeedback": { "blockReason": "SAFETY" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).generate(&input()).await.expect_err("blocked");
        assert!(matches!(err, AppError::ModelRejected(message) if message.contains("SAFETY")));
    }

    #[test]
    fn withheld_candidates_are_rejections() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "RECITATION" }]
        }))
        .expect("parses");
        assert!(matches!(extract_text(payload), Err(AppError::ModelRejected(_))));

        let empty: GenerateContentResponse =
            serde_json::from_value(json!({ "candidates": [] })).expect("parses");
        assert!(matches!(extract_text(empty), Err(AppError::ModelRejected(_))));
    }

    #[test]
    fn joins_multiple_text_parts() {
        let payload: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"epics\":" }, { "text": "[]}" }] },
                "finishReason": "MAX_TOKENS"
            }]
        }))
        .expect("parses");
        assert_eq!(extract_text(payload).expect("text"), "{\"epics\":[]}");
    }

    #[tokio::test]
    async fn requires_api_key() {
        let client = GeminiClient::new(None, "gemini-2.5-flash".to_string(), Duration::from_secs(1))
            .expect("client builds");
        let err = client.generate(&input()).await.expect_err("no key");
        assert!(matches!(err, AppError::Configuration(_)));
    }
}

use crate::config::Config;
use crate::error::AnalysisError;
use crate::source::SourceFile;
use crate::util::sanitize_api_response;
use serde::{Deserialize, Serialize};
use std::future::Future;

use super::prompts::{user_prompt, REVIEW_SYSTEM};

/// Shown in place of a narrative when the body has no message content
pub const NO_RESPONSE_TEXT: &str = "No response received";

/// Something that can turn one source file into a raw review response.
///
/// The orchestrator only depends on this seam.
pub trait ReviewBackend {
    fn complete(&self, file: &SourceFile)
        -> impl Future<Output = Result<String, AnalysisError>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    pub fn new(config: &Config, api_key: String) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AnalysisError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Build a client from config, resolving the API key from keychain or env
    pub fn from_config(config: &Config) -> Result<Self, AnalysisError> {
        let api_key = config.api_key().ok_or(AnalysisError::MissingApiKey)?;
        Self::new(config, api_key)
    }

    fn request_for<'a>(&'a self, file: &SourceFile) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: REVIEW_SYSTEM.to_string(),
                },
                Message {
                    role: "user",
                    content: user_prompt(file),
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl ReviewBackend for ChatClient {
    async fn complete(&self, file: &SourceFile) -> Result<String, AnalysisError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_for(file))
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        interpret_response(status, &text)
    }
}

/// Map an HTTP status and body to the review text or a typed error
pub(crate) fn interpret_response(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<String, AnalysisError> {
    if !status.is_success() {
        return Err(AnalysisError::Status {
            status: status.as_u16(),
            body: sanitize_api_response(body),
        });
    }
    extract_content(body)
}

/// Pull `choices[0].message.content` out of a success body.
///
/// A body that is not JSON is malformed; JSON of any other shape degrades to
/// the fallback text.
pub(crate) fn extract_content(body: &str) -> Result<String, AnalysisError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| AnalysisError::MalformedPayload(e.to_string()))?;

    let content = serde_json::from_value::<ChatResponse>(value)
        .ok()
        .and_then(|resp| resp.choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content);

    Ok(content.unwrap_or_else(|| NO_RESPONSE_TEXT.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChatClient {
        ChatClient::new(&Config::default(), "test-key".to_string()).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let c = client();
        let file = SourceFile::new("lib.rs", "src/lib.rs", "pub fn f() {}");
        let body = serde_json::to_value(c.request_for(&file)).unwrap();

        assert_eq!(body["model"], "deepseek-r1-distill-llama-70b");
        assert_eq!(body["max_tokens"], 2048);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], REVIEW_SYSTEM);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(
            body["messages"][1]["content"],
            "Analyze this rs file:\npub fn f() {}"
        );
    }

    #[test]
    fn test_extract_content_success() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "<SCORE:70>"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "<SCORE:70>");
    }

    #[test]
    fn test_extract_content_unexpected_shape_falls_back() {
        assert_eq!(extract_content(r#"{"choices": []}"#).unwrap(), NO_RESPONSE_TEXT);
        assert_eq!(extract_content(r#"{"data": 1}"#).unwrap(), NO_RESPONSE_TEXT);
        assert_eq!(
            extract_content(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap(),
            NO_RESPONSE_TEXT
        );
    }

    #[test]
    fn test_error_status_is_typed_and_sanitized() {
        use reqwest::StatusCode;

        assert_eq!(
            interpret_response(StatusCode::SERVICE_UNAVAILABLE, " model overloaded \n"),
            Err(AnalysisError::Status {
                status: 503,
                body: "model overloaded".to_string(),
            })
        );
        match interpret_response(StatusCode::UNAUTHORIZED, r#"{"error": "bad api_key gsk_123"}"#) {
            Err(AnalysisError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert!(!body.contains("gsk_123"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_success_status_extracts_content() {
        let body = r#"{"choices": [{"message": {"content": "<SCORE:70> ok"}}]}"#;
        assert_eq!(
            interpret_response(reqwest::StatusCode::OK, body),
            Ok("<SCORE:70> ok".to_string())
        );
    }

    #[test]
    fn test_extract_content_not_json_is_malformed() {
        assert!(matches!(
            extract_content("<html>bad gateway</html>"),
            Err(AnalysisError::MalformedPayload(_))
        ));
    }
}

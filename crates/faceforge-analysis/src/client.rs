//! HTTP client for the hosted vision-language model.

use crate::prompt;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Structured acting analysis returned by the model. Latest-only state for
/// the caller; each result supersedes the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub emotion: String,
    pub description: String,
    pub acting_tips: String,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// No credential configured. Fatal for this call only, not the app.
    #[error("no API credential configured — set GEMINI_API_KEY")]
    Configuration,
    #[error("analysis request failed: {0}")]
    Transport(String),
    #[error("analysis response did not match the expected schema: {0}")]
    Schema(String),
}

/// Explicit configuration for the analysis capability. Passed in at
/// construction; there is no process-wide implicit client.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl AnalysisConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Client for the generateContent endpoint.
pub struct AnalysisClient {
    http: reqwest::Client,
    config: AnalysisConfig,
}

impl AnalysisClient {
    /// Fails fast with [`AnalysisError::Configuration`] when no credential
    /// is present. Checked here rather than at app startup: tracking works
    /// fine without analysis.
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        if config.api_key.trim().is_empty() {
            return Err(AnalysisError::Configuration);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            config,
        })
    }

    /// Analyze one JPEG-encoded frame. `summary` is the top-blendshape
    /// context line produced by [`prompt::summarize_top_scores`].
    ///
    /// No retries: any failure returns the caller to ready-to-retry state.
    pub async fn analyze(
        &self,
        jpeg_bytes: &[u8],
        summary: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint, self.config.model
        );
        let body = build_request_body(jpeg_bytes, summary);

        tracing::debug!(model = %self.config.model, image_bytes = jpeg_bytes.len(), "sending analysis request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Transport(format!("HTTP {status}: {detail}")));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        parse_response(&value)
    }
}

/// Build the generateContent request: inline JPEG + prompt, with a response
/// schema that pins the three required string fields.
fn build_request_body(jpeg_bytes: &[u8], summary: &str) -> serde_json::Value {
    let image_b64 = base64::engine::general_purpose::STANDARD.encode(jpeg_bytes);
    json!({
        "contents": [{
            "parts": [
                {
                    "inlineData": {
                        "mimeType": "image/jpeg",
                        "data": image_b64,
                    }
                },
                { "text": prompt::build_prompt(summary) },
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "emotion": { "type": "STRING" },
                    "description": { "type": "STRING" },
                    "actingTips": { "type": "STRING" },
                },
                "required": ["emotion", "description", "actingTips"],
            }
        }
    })
}

/// Extract and parse the first candidate's JSON text.
fn parse_response(value: &serde_json::Value) -> Result<AnalysisResult, AnalysisError> {
    let text = value["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .ok_or_else(|| AnalysisError::Schema("no candidate text in response".into()))?;

    serde_json::from_str(text).map_err(|e| AnalysisError::Schema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_missing_credential() {
        assert!(matches!(
            AnalysisClient::new(AnalysisConfig::new("")),
            Err(AnalysisError::Configuration)
        ));
        assert!(matches!(
            AnalysisClient::new(AnalysisConfig::new("   ")),
            Err(AnalysisError::Configuration)
        ));
    }

    #[test]
    fn test_new_accepts_credential() {
        assert!(AnalysisClient::new(AnalysisConfig::new("key-123")).is_ok());
    }

    #[test]
    fn test_request_body_shape() {
        let body = build_request_body(b"\xff\xd8jpeg", "jawOpen: 81.0%");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert!(!parts[0]["inlineData"]["data"].as_str().unwrap().is_empty());
        assert!(parts[1]["text"].as_str().unwrap().contains("jawOpen: 81.0%"));

        let required = &body["generationConfig"]["responseSchema"]["required"];
        assert_eq!(required.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_response_ok() {
        let value = serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "text": r#"{"emotion":"joy","description":"a wide smile","actingTips":"hold the eyes open longer"}"#
                    }]
                }
            }]
        });
        let result = parse_response(&value).unwrap();
        assert_eq!(result.emotion, "joy");
        assert_eq!(result.acting_tips, "hold the eyes open longer");
    }

    #[test]
    fn test_parse_response_missing_field() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": r#"{"emotion":"joy"}"# }] }
            }]
        });
        assert!(matches!(
            parse_response(&value),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_response_no_candidates() {
        let value = serde_json::json!({ "candidates": [] });
        assert!(matches!(
            parse_response(&value),
            Err(AnalysisError::Schema(_))
        ));
    }

    #[test]
    fn test_parse_response_text_not_json() {
        let value = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "sorry, I cannot do that" }] }
            }]
        });
        assert!(matches!(
            parse_response(&value),
            Err(AnalysisError::Schema(_))
        ));
    }
}

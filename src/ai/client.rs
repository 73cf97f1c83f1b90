//! Gemini `generateContent` client used by the detection and nutrition stages.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::GeminiConfig;

#[derive(Debug, Clone, Error)]
pub enum GeminiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("no text content in response")]
    EmptyResponse,
}

/// Image bytes sent inline with a prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Bytes,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(self) -> Option<String> {
        let parts = self.candidates.into_iter().next()?.content?.parts;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(cfg: &GeminiConfig) -> Result<Self, GeminiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(concat!("mealscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GeminiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Shared HTTP client, also used to fetch images referenced by URL.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Single attempt, no retries. Returns the raw model text.
    pub async fn generate(
        &self,
        prompt: &str,
        image: Option<InlineImage>,
    ) -> Result<String, GeminiError> {
        let mut parts = vec![Part::Text { text: prompt }];
        if let Some(img) = image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: img.mime_type,
                    data: STANDARD.encode(&img.data),
                },
            });
        }
        let request = GenerateRequest {
            contents: vec![Content { role: "user", parts }],
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let res = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = res.status();
        debug!(model = %self.model, %status, "generateContent response");
        match status {
            s if s.is_success() => res
                .json::<GenerateResponse>()
                .await
                .map_err(|e| GeminiError::Serde(e.to_string()))?
                .text()
                .ok_or(GeminiError::EmptyResponse),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GeminiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(GeminiError::RateLimited),
            s => {
                let body = res.text().await.unwrap_or_default();
                Err(GeminiError::Http {
                    status: s.as_u16(),
                    body,
                })
            }
        }
    }
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> GeminiError {
    if e.is_timeout() {
        GeminiError::Timeout
    } else {
        GeminiError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_text_and_inline_parts() {
        let req = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: "describe" },
                    Part::Inline {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".into(),
                            data: "AAEC".into(),
                        },
                    },
                ],
            }],
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(
            v["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/jpeg"
        );
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let res: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "[{\"a\":" }, { "text": "1}]" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(res.text().as_deref(), Some("[{\"a\":1}]"));
    }

    #[test]
    fn blocked_response_has_no_text() {
        let res: GenerateResponse =
            serde_json::from_value(json!({ "candidates": [{ "finishReason": "SAFETY" }] }))
                .unwrap();
        assert!(res.text().is_none());
        let res: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(res.text().is_none());
    }
}

//! ---
//! fsim_section: "06-analysis"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Generative-language model abstraction and REST client."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use faultsim_common::GenerativeConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors produced while asking a model for text.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generative API key is not configured (set {0})")]
    MissingApiKey(String),
    #[error("generative API request timed out")]
    Timeout,
    #[error("generative API request failed: {0}")]
    Transport(String),
    #[error("generative API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generative API returned no candidates")]
    EmptyResponse,
}

impl GenerationError {
    /// Label used for this failure in request logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            GenerationError::MissingApiKey(_) => "MissingApiKey",
            GenerationError::Timeout => "GenerationTimeout",
            GenerationError::Transport(_) => "GenerationTransportError",
            GenerationError::Status { .. } => "GenerationStatusError",
            GenerationError::EmptyResponse => "EmptyGeneration",
        }
    }

    /// A missing key is local misconfiguration; everything else is the downstream API.
    pub fn severity(&self) -> &'static str {
        match self {
            GenerationError::MissingApiKey(_) => "critical",
            _ => "external",
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

/// Text generation backend used by the analyzer.
#[async_trait]
pub trait GenerativeModel: Send + Sync + 'static {
    /// Produce free text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl GeminiClient {
    /// `api_key` is normally [`GenerativeConfig::api_key`]; without one every call fails.
    pub fn new(config: &GenerativeConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build generative API http client")?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        Ok(Self {
            client,
            endpoint,
            api_key,
            api_key_env: config.api_key_env.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("api_key_present", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::MissingApiKey(self.api_key_env.clone()));
        };
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };
        debug!(endpoint = %self.endpoint, prompt_len = prompt.len(), "requesting generation");
        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status.as_u16(), response.text().await));
        }
        let parsed: GenerateResponse = response.json().await?;
        candidate_text(parsed)
    }
}

/// Concatenate the text parts of the first candidate.
/// A failed call keeps the response body, or why it could not be read.
fn status_error(status: u16, body: Result<String, reqwest::Error>) -> GenerationError {
    let body = body.unwrap_or_else(|err| format!("<unreadable response body: {err}>"));
    GenerationError::Status { status, body }
}

fn candidate_text(response: GenerateResponse) -> Result<String, GenerationError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GenerationError::EmptyResponse)?;
    let text: String = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect();
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_wire_shape() {
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: "hello" }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"contents": [{"parts": [{"text": "hello"}]}]})
        );
    }

    #[test]
    fn first_candidate_parts_are_joined() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [
                {"content": {"parts": [{"text": "Key observations:\n"}, {"text": "all good"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            candidate_text(response).unwrap(),
            "Key observations:\nall good"
        );
    }

    #[test]
    fn missing_candidates_are_an_error() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            candidate_text(response),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn status_error_keeps_body_or_read_failure() {
        match status_error(503, Ok("overloaded".into())) {
            GenerationError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected {other:?}"),
        }

        let read_failure = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        match status_error(502, Err(read_failure)) {
            GenerationError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.starts_with("<unreadable response body:"), "{body}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failures_are_labelled_for_logs() {
        let missing = GenerationError::MissingApiKey("GEMINI_API_KEY".into());
        assert_eq!(missing.error_type(), "MissingApiKey");
        assert_eq!(missing.severity(), "critical");
        assert_eq!(GenerationError::Timeout.error_type(), "GenerationTimeout");
        assert_eq!(GenerationError::Timeout.severity(), "external");
        assert_eq!(GenerationError::EmptyResponse.severity(), "external");
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let client = GeminiClient::new(&GenerativeConfig::default(), None).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        let err = client.generate("prompt").await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingApiKey(ref var) if var == "GEMINI_API_KEY"));
    }
}

//! Gemini API client
//!
//! Non-streaming `generateContent`. The conversation goes over the wire in
//! its stored shape; the answer is the first part of the first candidate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::gateway::{GenerationError, Generator, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::turn::Turn;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            timeout,
        }
    }

    /// Point at another endpoint (proxies, emulators)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    async fn send(&self, request: &GenerateRequest<'_>) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Remote(error_message(status, &body)));
        }

        let data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| {
                warn!(error = %e, "undecodable generateContent response");
                GenerationError::Remote("AI Error: unreadable response".to_string())
            })?;

        extract_answer(data).ok_or(GenerationError::EmptyResponse)
    }

    /// One-shot prompt with JSON output mode, for the topic extractor
    pub async fn generate_json(&self, prompt: &str) -> Result<String, GenerationError> {
        let turn = Turn::user_text(prompt);
        let request = GenerateRequest {
            contents: std::slice::from_ref(&turn),
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: None,
                max_output_tokens: None,
                response_mime_type: Some("application/json"),
            },
        };
        self.send(&request).await
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, turns: &[Turn], system_text: &str) -> Result<String, GenerationError> {
        debug!(model = %self.model, turns = turns.len(), "generateContent");
        let request = GenerateRequest {
            contents: turns,
            system_instruction: Some(SystemInstruction {
                parts: [TextPart { text: system_text }],
            }),
            generation_config: GenerationConfig {
                temperature: Some(TEMPERATURE),
                max_output_tokens: Some(MAX_OUTPUT_TOKENS),
                response_mime_type: None,
            },
        };
        self.send(&request).await
    }
}

/// Transport failures reach the caller without URL or socket detail
fn unreachable(e: reqwest::Error) -> GenerationError {
    warn!(error = %e, "generateContent request failed");
    let reason = if e.is_timeout() {
        "service timed out"
    } else {
        "service unreachable"
    };
    GenerationError::Remote(format!("AI Error: {}", reason))
}

/// Message from an error payload, else a generic status description
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
        .and_then(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            format!(
                "AI Error: {}",
                status.canonical_reason().unwrap_or(status.as_str())
            )
        })
}

fn extract_answer(data: GenerateResponse) -> Option<String> {
    data.candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
        .filter(|t| !t.is_empty())
}

// ═══════════════════════════════════════════════════════════════
// API Types
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Turn],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
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
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

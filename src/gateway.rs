//! Generation gateway
//!
//! The remote model is an opaque function of the turn sequence and one
//! system instruction. One attempt per call; callers own any retry policy.

use async_trait::async_trait;
use thiserror::Error;

use crate::turn::Turn;

/// Sampling temperature for chat answers
pub const TEMPERATURE: f32 = 0.8;

/// Upper bound on answer length, in tokens
pub const MAX_OUTPUT_TOKENS: u32 = 8192;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Non-success status or transport failure
    #[error("{0}")]
    Remote(String),
    /// The call succeeded but carried no answer text
    #[error("AI returned empty response.")]
    EmptyResponse,
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, turns: &[Turn], system_text: &str) -> Result<String, GenerationError>;
}

//! Where the client sends a submission
//!
//! [`RemoteBackend`] talks to a running `drona-api`; [`LocalBackend`] runs
//! the same pipeline in-process. Both speak [`ChatRequest`]/[`ChatReply`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::error::ErrorBody;
use crate::pipeline::{ChatReply, ChatRequest, ChatService};
use crate::trending::{TopicsReply, TrendingService};

/// Extra time the HTTP client allows on top of the server's generation timeout
const TRANSPORT_SLACK_SECS: u64 = 10;
const TOPICS_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not reach server: {0}")]
    Unreachable(String),

    /// The pipeline answered with an error
    #[error("{message}")]
    Failed { status: u16, message: String },

    #[error("unreadable reply: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    /// Suggested topics; never fails
    async fn topics(&self) -> TopicsReply;
}

// ═══════════════════════════════════════════════════════════════
// REMOTE
// ═══════════════════════════════════════════════════════════════

pub struct RemoteBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RemoteBackend {
    pub fn new(base_url: &str, generation_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: generation_timeout + Duration::from_secs(TRANSPORT_SLACK_SECS),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.server_url(), cfg.generation_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reachability check for `drona doctor`
    pub async fn ping(&self) -> Result<()> {
        self.client
            .get(format!("{}/trending", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.base_url))?
            .error_for_status()
            .context("Server answered with an error")?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for RemoteBackend {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| format!("Server error {}", status));
            return Err(BackendError::Failed {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| BackendError::Malformed(e.to_string()))
    }

    async fn topics(&self) -> TopicsReply {
        let fetched = async {
            let reply = self
                .client
                .get(format!("{}/trending", self.base_url))
                .timeout(Duration::from_secs(TOPICS_TIMEOUT_SECS))
                .send()
                .await?
                .error_for_status()?
                .json::<TopicsReply>()
                .await?;
            Ok::<_, reqwest::Error>(reply)
        };
        match fetched.await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch topics");
                TrendingService::new(None, None).topics().await
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// LOCAL
// ═══════════════════════════════════════════════════════════════

pub struct LocalBackend {
    chat: Arc<ChatService>,
    trending: Arc<TrendingService>,
}

impl LocalBackend {
    pub fn new(chat: Arc<ChatService>, trending: Arc<TrendingService>) -> Self {
        Self { chat, trending }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let chat = ChatService::from_config(cfg);
        let store = chat.cache().map(|c| c.store().clone());
        let trending = TrendingService::from_config(cfg, store);
        Self::new(Arc::new(chat), Arc::new(trending))
    }
}

#[async_trait]
impl ChatBackend for LocalBackend {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        self.chat
            .respond(request)
            .await
            .map_err(|e| BackendError::Failed {
                status: e.status().as_u16(),
                message: e.to_string(),
            })
    }

    async fn topics(&self) -> TopicsReply {
        self.trending.topics().await
    }
}

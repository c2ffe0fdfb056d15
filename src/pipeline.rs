//! Cache-augmented response pipeline
//!
//! validate → (text-only) cache lookup → generate → write-through.
//! Turns carrying an image skip the cache entirely: no key is derived,
//! nothing is read or written.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::ChatError;
use crate::firebase::FirebaseStore;
use crate::gateway::Generator;
use crate::gemini::GeminiClient;
use crate::key::derive_key;
use crate::persona::PersonaPolicy;
use crate::turn::Turn;

/// Body of `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub contents: Vec<Turn>,
    #[serde(rename = "queryType", default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
}

/// Successful answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    #[serde(rename = "fromCache")]
    pub from_cache: bool,
}

pub struct ChatService {
    generator: Option<Arc<dyn Generator>>,
    cache: Option<ResponseCache>,
    personas: PersonaPolicy,
}

impl ChatService {
    /// `generator: None` means no API key: every request fails with a
    /// configuration error. `cache: None` runs uncached.
    pub fn new(
        generator: Option<Arc<dyn Generator>>,
        cache: Option<ResponseCache>,
        personas: PersonaPolicy,
    ) -> Self {
        Self {
            generator,
            cache,
            personas,
        }
    }

    /// Wire up Gemini and the Firebase cache from configuration
    pub fn from_config(cfg: &Config) -> Self {
        let generator = cfg.gemini_api_key.as_deref().map(|key| {
            Arc::new(GeminiClient::new(key, cfg.model(), cfg.generation_timeout()))
                as Arc<dyn Generator>
        });
        if generator.is_none() {
            warn!("GEMINI_API_KEY not set; chat requests will fail");
        }

        let cache = cfg.firebase_url.as_deref().map(|url| {
            ResponseCache::new(Arc::new(FirebaseStore::new(url, cfg.firebase_auth.clone())))
        });
        match &cache {
            Some(_) => info!("answer cache enabled"),
            None => info!("FIREBASE_DB_URL not set; answer cache disabled"),
        }

        Self::new(generator, cache, PersonaPolicy::from_config(cfg))
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub async fn respond(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| ChatError::Configuration("GEMINI_API_KEY is not set".into()))?;

        let last = request
            .contents
            .last()
            .ok_or_else(|| ChatError::Validation("No message provided".into()))?;
        for turn in &request.contents {
            turn.validate_attachments()
                .map_err(|e| ChatError::Validation(e.to_string()))?;
        }

        // Text-only turns are cacheable; the query is their first text segment
        let cached = match (&self.cache, last.has_image()) {
            (Some(cache), false) => {
                let query = last.first_text().unwrap_or_default();
                Some((cache, derive_key(query), query))
            }
            _ => None,
        };

        if let Some((cache, key, _)) = &cached {
            let lookup = cache.get(key).await;
            info!(%key, outcome = lookup.label(), "cache lookup");
            if let Some(answer) = lookup.answer() {
                return Ok(ChatReply {
                    text: answer.to_string(),
                    from_cache: true,
                });
            }
        }

        let system_text = self.personas.select(request.query_type.as_deref());
        let answer = generator
            .generate(&request.contents, system_text)
            .await
            .map_err(|e| {
                warn!(error = %e, "generation failed");
                ChatError::from(e)
            })?;

        if let Some((cache, key, query)) = cached {
            // Detached; the answer goes back without waiting for the write
            let _ = cache.set(&key, &answer, query);
        }

        Ok(ChatReply {
            text: answer,
            from_cache: false,
        })
    }
}

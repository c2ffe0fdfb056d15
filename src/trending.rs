//! Suggested conversation topics
//!
//! Headlines from a custom search are condensed into three topics by the
//! generation service. Results are cached for six hours in the shared
//! store; any missing key or upstream failure yields the static list.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::gemini::GeminiClient;

/// Store path of the topic list
pub const TRENDING_PATH: &str = "drona_trending_cache";

/// Cached topics are served while younger than this (6 hours)
pub const TRENDING_WINDOW_MS: i64 = 21_600_000;

pub const FALLBACK_TOPICS: [&str; 3] = [
    "Impact of recent Supreme Court judgments on Federalism",
    "Analyze the current Monetary Policy stance of RBI",
    "India's strategic role in the Global South",
];

const SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
const SEARCH_QUERY: &str =
    "(UPSC OR editorial) (site:thehindu.com OR site:indianexpress.com OR site:pib.gov.in)";
const SEARCH_TIMEOUT_SECS: u64 = 10;

/// Body of `GET /trending`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsReply {
    pub topics: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredTopics {
    topics: Vec<String>,
    timestamp: i64,
}

/// Where fresh topics come from
#[async_trait]
pub trait TopicSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Custom search + topic extraction by the generation service
pub struct LiveTopics {
    client: reqwest::Client,
    search_key: String,
    search_cx: String,
    gemini: GeminiClient,
}

impl LiveTopics {
    pub fn new(search_key: &str, search_cx: &str, gemini: GeminiClient) -> Self {
        Self {
            client: reqwest::Client::new(),
            search_key: search_key.to_string(),
            search_cx: search_cx.to_string(),
            gemini,
        }
    }

    async fn headlines(&self) -> Result<String> {
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("key", self.search_key.as_str()),
                ("cx", self.search_cx.as_str()),
                ("q", SEARCH_QUERY),
                ("num", "5"),
                ("sort", "date"),
            ])
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to reach search API")?;

        if !response.status().is_success() {
            anyhow::bail!("Search API error {}", response.status());
        }

        let data: SearchResponse = response
            .json()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to parse search response")?;
        Ok(data
            .items
            .into_iter()
            .map(|i| i.title)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[async_trait]
impl TopicSource for LiveTopics {
    async fn fetch(&self) -> Result<Vec<String>> {
        let titles = self.headlines().await?;
        let prompt = format!(
            "Extract 3 complex UPSC Mains topics from these headlines. \
             Return strictly a JSON array of strings. Headlines:\n{}",
            titles
        );
        let raw = self.gemini.generate_json(&prompt).await?;
        parse_topics(&raw)
    }
}

fn parse_topics(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw.trim()).context("Topic extractor did not return a JSON string array")
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: String,
}

pub struct TrendingService {
    store: Option<Arc<dyn CacheStore>>,
    source: Option<Arc<dyn TopicSource>>,
}

impl TrendingService {
    /// `source: None` means the upstream keys are missing
    pub fn new(store: Option<Arc<dyn CacheStore>>, source: Option<Arc<dyn TopicSource>>) -> Self {
        Self { store, source }
    }

    pub fn from_config(cfg: &Config, store: Option<Arc<dyn CacheStore>>) -> Self {
        let source = match (&cfg.search_api_key, &cfg.search_cx, &cfg.gemini_api_key) {
            (Some(key), Some(cx), Some(gemini_key)) => {
                let gemini = GeminiClient::new(gemini_key, cfg.model(), cfg.generation_timeout());
                Some(Arc::new(LiveTopics::new(key, cx, gemini)) as Arc<dyn TopicSource>)
            }
            _ => None,
        };
        Self::new(store, source)
    }

    pub async fn topics(&self) -> TopicsReply {
        self.topics_at(Utc::now()).await
    }

    /// Never fails: cache, then upstream, then the fallback list
    pub async fn topics_at(&self, now: DateTime<Utc>) -> TopicsReply {
        if let Some(topics) = self.cached(now).await {
            return TopicsReply { topics };
        }

        let Some(source) = &self.source else {
            return fallback();
        };

        match source.fetch().await {
            Ok(topics) if !topics.is_empty() => {
                self.remember(&topics, now);
                TopicsReply { topics }
            }
            Ok(_) => {
                warn!("topic source returned nothing");
                fallback()
            }
            Err(e) => {
                warn!(error = %e, "trending fetch failed");
                fallback()
            }
        }
    }

    async fn cached(&self, now: DateTime<Utc>) -> Option<Vec<String>> {
        let store = self.store.as_ref()?;
        let value = match store.get(TRENDING_PATH).await {
            Ok(value) => value?,
            Err(e) => {
                warn!(error = %e, "trending cache read failed");
                return None;
            }
        };
        let stored: StoredTopics = serde_json::from_value(value).ok()?;
        let age = now.timestamp_millis() - stored.timestamp;
        if age < TRENDING_WINDOW_MS {
            Some(stored.topics)
        } else {
            debug!(age_ms = age, "trending cache is stale");
            None
        }
    }

    fn remember(&self, topics: &[String], now: DateTime<Utc>) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let record = StoredTopics {
            topics: topics.to_vec(),
            timestamp: now.timestamp_millis(),
        };
        tokio::spawn(async move {
            let result = match serde_json::to_value(&record) {
                Ok(value) => store.put(TRENDING_PATH, value).await.map_err(anyhow::Error::from),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                warn!(error = %e, "trending cache write failed");
            }
        });
    }
}

fn fallback() -> TopicsReply {
    TopicsReply {
        topics: FALLBACK_TOPICS.iter().map(|t| t.to_string()).collect(),
    }
}

//! Firebase Realtime Database cache store (REST)
//!
//! `GET/PUT {base}/{path}.json[?auth=...]`. A missing node reads as JSON `null`.

use async_trait::async_trait;
use std::time::Duration;

use crate::cache::{CacheError, CacheStore};

const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct FirebaseStore {
    client: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseStore {
    pub fn new(base_url: &str, auth: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn node_url(&self, path: &str) -> String {
        let mut url = format!("{}/{}.json", self.base_url, path.trim_matches('/'));
        if let Some(auth) = &self.auth {
            url.push_str("?auth=");
            url.push_str(auth);
        }
        url
    }
}

/// The node URL carries the database secret; it never goes into the message
fn transport(e: reqwest::Error) -> CacheError {
    CacheError::Transport(e.without_url().to_string())
}

#[async_trait]
impl CacheStore for FirebaseStore {
    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>, CacheError> {
        let response = self
            .client
            .get(self.node_url(path))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::Status { status, body });
        }

        let value: serde_json::Value = response.json().await.map_err(transport)?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn put(&self, path: &str, value: serde_json::Value) -> Result<(), CacheError> {
        let response = self
            .client
            .put(self.node_url(path))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .json(&value)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::Status { status, body });
        }
        Ok(())
    }
}

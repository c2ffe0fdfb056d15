//! Configuration management with XDG paths
//!
//! ~/.config/drona/config.json - API keys, cache store, personas (0600)
//! ~/.local/state/drona/       - Client conversation storage
//!
//! Environment variables override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

const APP_NAME: &str = "drona";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Get config directory (~/.config/drona/)
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Could not determine config directory")?;
    Ok(base.join(APP_NAME))
}

/// Get state directory (~/.local/state/drona/)
pub fn state_dir() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .context("Could not determine state directory")?;
    Ok(base.join(APP_NAME))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Ensure all directories exist
pub fn ensure_dirs() -> Result<()> {
    fs::create_dir_all(config_dir()?)?;
    fs::create_dir_all(state_dir()?)?;
    Ok(())
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Generation service API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,

    /// Generation model id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Realtime Database URL for the shared answer cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firebase_url: Option<String>,

    /// Database secret or ID token for the cache store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firebase_auth: Option<String>,

    /// Custom search key for topic suggestions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    /// Custom search engine id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_cx: Option<String>,

    /// Default system instruction; the built-in mentor prompt when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// System instruction overrides keyed by request `queryType`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub personas: HashMap<String, String>,

    /// Where the terminal client sends requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Directory served as static assets by drona-api
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,

    /// Transport timeout for one generation request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_timeout_secs: Option<u64>,
}

impl Config {
    /// Load config from disk, or return defaults
    pub fn load() -> Result<Self> {
        ensure_dirs()?;
        let path = config_path()?;

        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Load config from disk, then apply environment overrides
    pub fn load_with_env() -> Result<Self> {
        let mut cfg = Self::load()?;
        cfg.apply_env(|name| std::env::var(name).ok());
        Ok(cfg)
    }

    /// Overlay non-empty values from `lookup` (environment in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("GEMINI_API_KEY") {
            self.gemini_api_key = Some(v);
        }
        if let Some(v) = get("DRONA_MODEL") {
            self.model = Some(v);
        }
        if let Some(v) = get("FIREBASE_DB_URL") {
            self.firebase_url = Some(v);
        }
        if let Some(v) = get("FIREBASE_AUTH_TOKEN") {
            self.firebase_auth = Some(v);
        }
        if let Some(v) = get("GOOGLE_SEARCH_API_KEY") {
            self.search_api_key = Some(v);
        }
        if let Some(v) = get("GOOGLE_CX_ID") {
            self.search_cx = Some(v);
        }
        if let Some(v) = get("DRONA_SERVER_URL") {
            self.server_url = Some(v);
        }
        if let Some(v) = get("DRONA_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(v));
        }
    }

    /// Save config to disk with secure permissions
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        let path = config_path()?;

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        // Set permissions to 0600 (owner read/write only) for API key security
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&path, perms)?;

        Ok(())
    }

    /// Set one value by its user-facing name
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        match key {
            "key" | "gemini_api_key" | "gemini.key" => self.gemini_api_key = Some(value),
            "model" => self.model = Some(value),
            "firebase_url" | "cache.url" => self.firebase_url = Some(value),
            "firebase_auth" | "cache.auth" => self.firebase_auth = Some(value),
            "search_api_key" | "search.key" => self.search_api_key = Some(value),
            "search_cx" | "search.cx" => self.search_cx = Some(value),
            "system_prompt" | "prompt" => self.system_prompt = Some(value),
            "server" | "server_url" => self.server_url = Some(value),
            "static_dir" => self.static_dir = Some(PathBuf::from(value)),
            "timeout" | "generation_timeout_secs" => {
                let secs = value
                    .parse()
                    .with_context(|| format!("Not a number of seconds: {}", value))?;
                self.generation_timeout_secs = Some(secs);
            }
            k if k.starts_with("persona.") => {
                let query_type = k.trim_start_matches("persona.");
                if query_type.is_empty() {
                    anyhow::bail!("Persona key needs a query type, e.g. persona.academic");
                }
                self.personas.insert(query_type.to_string(), value);
            }
            _ => anyhow::bail!(
                "Unknown config key: {}. Valid keys: key, model, firebase_url, firebase_auth, \
                 search_api_key, search_cx, system_prompt, persona.<type>, server, static_dir, timeout",
                key
            ),
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(
            self.generation_timeout_secs
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
        )
    }
}

/// Port for drona-api from `PORT`, falling back to 3000
pub fn server_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

//! System instruction selection
//!
//! The instruction is configuration, not logic: a default prompt plus
//! optional overrides keyed by the request's `queryType`.

use std::collections::HashMap;

use crate::config::Config;

/// Built-in mentor prompt used when no system prompt is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Drona, an AI mentor for Civil Services (UPSC) aspirants.
Read each message and answer in the register it calls for.

FORMATTING:
* Use Markdown headers (###) to break up long answers.
* Use bullet points (*) for facts and arguments.
* Use **bold** for key terms. Avoid walls of text.

MENTOR MODE (greetings, stress, strategy, casual chat):
* Warm and grounding. Offer motivation, mental models and broad guidance.

FACULTY MODE (syllabus topics, editorials, concepts, uploaded answers or images):
* Professional and insightful.
* Cite specific evidence: Supreme Court judgments (e.g. *S.R. Bommai case*),
  constitutional articles (e.g. Art 280), committee reports (e.g. Sarkaria).

ALWAYS:
1. Never announce which mode you are in.
2. No robotic intros. Start with the substance.
3. When stress and a topic come together, acknowledge the stress first, then simplify the topic.
"#;

#[derive(Debug, Clone)]
pub struct PersonaPolicy {
    default: String,
    by_query_type: HashMap<String, String>,
}

impl Default for PersonaPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_SYSTEM_PROMPT)
    }
}

impl PersonaPolicy {
    /// The same instruction for every request
    pub fn fixed(prompt: impl Into<String>) -> Self {
        Self {
            default: prompt.into(),
            by_query_type: HashMap::new(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self {
            default: cfg
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            by_query_type: cfg.personas.clone(),
        }
    }

    pub fn with_override(mut self, query_type: &str, prompt: impl Into<String>) -> Self {
        self.by_query_type.insert(query_type.to_string(), prompt.into());
        self
    }

    /// Instruction for a request; unknown or absent query types get the default
    pub fn select(&self, query_type: Option<&str>) -> &str {
        query_type
            .and_then(|t| self.by_query_type.get(t))
            .map(String::as_str)
            .unwrap_or(self.default.as_str())
    }
}

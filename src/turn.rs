//! Conversation turns
//!
//! The wire shape is shared by the HTTP API, local storage and the
//! generation service:
//!
//! ```json
//! {"role": "user", "parts": [{"text": "..."}, {"inline_data": {"mime_type": "image/png", "data": "..."}}]}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who produced a turn. Exactly two values are valid on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Assistant,
}

/// One piece of a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inline_data")]
    InlineImage { mime_type: String, data: String },
}

impl Segment {
    pub fn text(s: impl Into<String>) -> Self {
        Segment::Text(s.into())
    }

    pub fn image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Segment::InlineImage {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Segment::Text(t) => Some(t),
            Segment::InlineImage { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Segment::InlineImage { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("a turn needs at least one segment")]
    Empty,
    #[error("unsupported attachment type: {0}")]
    NotAnImage(String),
    #[error("attachment is not valid base64")]
    BadImageData,
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTurn")]
pub struct Turn {
    role: Role,
    #[serde(rename = "parts")]
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct RawTurn {
    role: Role,
    parts: Vec<Segment>,
}

impl TryFrom<RawTurn> for Turn {
    type Error = TurnError;

    fn try_from(raw: RawTurn) -> Result<Self, Self::Error> {
        Turn::new(raw.role, raw.parts)
    }
}

impl Turn {
    pub fn new(role: Role, segments: Vec<Segment>) -> Result<Self, TurnError> {
        if segments.is_empty() {
            return Err(TurnError::Empty);
        }
        Ok(Self { role, segments })
    }

    /// Single-segment user text turn
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            segments: vec![Segment::text(text)],
        }
    }

    /// Single-segment assistant text turn
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            segments: vec![Segment::text(text)],
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_image(&self) -> bool {
        self.segments.iter().any(Segment::is_image)
    }

    /// First text segment, the one a cache key is derived from
    pub fn first_text(&self) -> Option<&str> {
        self.segments.iter().find_map(Segment::as_text)
    }

    /// All text segments joined by newlines
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .filter_map(Segment::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check inline images carry an image MIME type and decodable data
    pub fn validate_attachments(&self) -> Result<(), TurnError> {
        for segment in &self.segments {
            if let Segment::InlineImage { mime_type, data } = segment {
                if !mime_type.starts_with("image/") {
                    return Err(TurnError::NotAnImage(mime_type.clone()));
                }
                STANDARD.decode(data).map_err(|_| TurnError::BadImageData)?;
            }
        }
        Ok(())
    }
}

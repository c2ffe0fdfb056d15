//! Image files attached to the next submission

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::turn::Segment;

/// Images that may wait for one submission
pub const MAX_PENDING_IMAGES: usize = 10;

/// Per-file size limit (5 MiB)
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Max {MAX_PENDING_IMAGES} images allowed")]
    TooMany,

    #[error("{0} is too large (max 5MB)")]
    TooLarge(String),

    #[error("{0} is not a supported image type")]
    NotAnImage(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// Read an image file into an inline segment
pub fn load_image(path: &Path) -> Result<Segment, AttachmentError> {
    let name = path.display().to_string();
    let mime = mime_for(path).ok_or_else(|| AttachmentError::NotAnImage(name.clone()))?;

    let io_err = |source| AttachmentError::Io {
        path: name.clone(),
        source,
    };
    let meta = fs::metadata(path).map_err(io_err)?;
    if meta.len() > MAX_IMAGE_BYTES {
        return Err(AttachmentError::TooLarge(name.clone()));
    }
    let bytes = fs::read(path).map_err(io_err)?;
    Ok(Segment::image(mime, STANDARD.encode(bytes)))
}

/// Images queued for the next submission
#[derive(Debug, Default)]
pub struct PendingImages {
    images: Vec<Segment>,
}

impl PendingImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, path: &Path) -> Result<usize, AttachmentError> {
        if self.images.len() >= MAX_PENDING_IMAGES {
            return Err(AttachmentError::TooMany);
        }
        self.images.push(load_image(path)?);
        Ok(self.images.len())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn take(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.images)
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}

//! Multimodal input normalisation.
//!
//! Turns user text plus attachments into provider-neutral content
//! blocks. Media types decide the block kind; anything unrecognised is
//! rejected before the conversation is touched.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::ai::types::{Content, MediaSource};

/// A user-supplied attachment with base64-encoded data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub media_type: String,
    pub data: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Attachment {
    pub fn new(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("unsupported attachment type: {0}")]
    UnsupportedAttachment(String),

    #[error("attachment '{name}' is not valid base64: {reason}")]
    InvalidEncoding { name: String, reason: String },
}

/// Normalise `(text, attachments)` into content blocks, attachment order
/// preserved after the prose.
pub fn build_content(text: &str, attachments: &[Attachment]) -> Result<Vec<Content>, InputError> {
    let trimmed = text.trim();
    if trimmed.is_empty() && attachments.is_empty() {
        return Err(InputError::EmptyMessage);
    }

    let mut blocks = Vec::with_capacity(1 + attachments.len());
    if !trimmed.is_empty() {
        blocks.push(Content::Text {
            text: trimmed.to_string(),
        });
    }

    for attachment in attachments {
        let media_type = attachment.media_type.as_str();
        if media_type.starts_with("image/") {
            blocks.push(Content::Image {
                source: MediaSource::base64(media_type, attachment.data.clone()),
            });
        } else if media_type == "application/pdf" {
            blocks.push(Content::Document {
                source: MediaSource::base64(media_type, attachment.data.clone()),
                name: attachment.name.clone(),
            });
        } else if media_type.starts_with("text/") {
            // Text attachments join the prose as their decoded content.
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&attachment.data)
                .map_err(|e| InputError::InvalidEncoding {
                    name: attachment.name.clone().unwrap_or_else(|| "attachment".into()),
                    reason: e.to_string(),
                })?;
            let text = String::from_utf8_lossy(&decoded).into_owned();
            blocks.push(Content::Text { text });
        } else {
            return Err(InputError::UnsupportedAttachment(media_type.to_string()));
        }
    }

    Ok(blocks)
}

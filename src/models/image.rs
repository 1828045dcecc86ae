//! API-facing projection of a stored object.
//!
//! An `Image` is always built from exactly one `ObjectDescriptor`. The payload
//! is checked against the descriptor's size and etag first, so a corrupt or
//! truncated object never turns into a partial `Image`.

use crate::models::object::ObjectDescriptor;
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("object has an empty name")]
    EmptyName,
    #[error("object `{name}` declares {expected} bytes but {actual} were read")]
    SizeMismatch {
        name: String,
        expected: i64,
        actual: usize,
    },
    #[error("object `{name}` content does not match etag `{etag}`")]
    ChecksumMismatch { name: String, etag: String },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Image {
    /// Object name, used as the `{id}` path segment.
    pub id: String,

    /// Last `/`-separated segment of the id.
    pub name: String,

    pub content_type: Option<String>,

    pub size: i64,

    pub etag: String,

    pub updated: DateTime<Utc>,

    /// Standard base64 of the payload bytes.
    pub content: String,
}

#[cfg(test)]
impl Image {
    /// Decode the base64 `content` field back into bytes.
    pub fn decode_content(&self) -> Result<Vec<u8>, base64::DecodeError> {
        general_purpose::STANDARD.decode(&self.content)
    }
}

impl TryFrom<ObjectDescriptor> for Image {
    type Error = MapError;

    fn try_from(desc: ObjectDescriptor) -> Result<Self, Self::Error> {
        if desc.name.is_empty() {
            return Err(MapError::EmptyName);
        }

        if desc.size_bytes < 0 || desc.content.len() as i64 != desc.size_bytes {
            return Err(MapError::SizeMismatch {
                name: desc.name,
                expected: desc.size_bytes,
                actual: desc.content.len(),
            });
        }

        let digest = format!("{:x}", md5::compute(&desc.content));
        if !digest.eq_ignore_ascii_case(&desc.etag) {
            return Err(MapError::ChecksumMismatch {
                name: desc.name,
                etag: desc.etag,
            });
        }

        let name = desc.name.rsplit('/').next().unwrap_or(&desc.name).to_string();

        Ok(Self {
            content: general_purpose::STANDARD.encode(&desc.content),
            id: desc.name,
            name,
            content_type: desc.content_type,
            size: desc.size_bytes,
            etag: desc.etag,
            updated: desc.updated_at,
        })
    }
}

/// Map descriptors to images in input order, failing on the first one that
/// cannot be mapped.
pub fn images_from_descriptors(
    descriptors: Vec<ObjectDescriptor>,
) -> Result<Vec<Image>, MapError> {
    descriptors.into_iter().map(Image::try_from).collect()
}

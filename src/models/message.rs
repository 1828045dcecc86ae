use serde::{Deserialize, Serialize};

/// Notification payload for responses that carry no image content.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub details: String,
}

impl Message {
    pub fn new(text: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            details: details.into(),
        }
    }

    /// Confirmation sent after `DELETE /image/{id}`.
    pub fn image_deleted(id: &str) -> Self {
        Self::new("image deleted", format!("image id: {}", id))
    }
}

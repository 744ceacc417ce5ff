//! Captured Artifact Model

use serde::{Deserialize, Serialize};

/// One captured payload, tied to its target by id (not ownership)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedArtifact {
    pub target_id: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub mime_type: String,
    pub size_bytes: u64,
    pub captured_at: i64,
}

impl CapturedArtifact {
    pub fn new(target_id: impl Into<String>, payload: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            size_bytes: payload.len() as u64,
            payload,
            mime_type: mime_type.into(),
            captured_at: crate::util::now_millis(),
        }
    }

    pub fn captured_at(mut self, millis: i64) -> Self {
        self.captured_at = millis;
        self
    }
}

/// Stored artifact metadata (payload kept separately)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Store-assigned id, increasing in save order
    pub id: u64,
    pub target_id: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub captured_at: i64,
}

//! Perception provider: a structured snapshot of the interactive surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PerceptionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Provider-specific structure (accessibility tree, DOM digest, ...)
    pub surface: serde_json::Value,

    /// OCR text, present when visual perception was requested and available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,

    pub captured_at: DateTime<Utc>,
}

#[async_trait]
pub trait Perception: Send + Sync {
    /// Capture the current surface. `with_ocr` asks for OCR text as well.
    async fn perceive(&self, with_ocr: bool) -> std::result::Result<Snapshot, PerceptionError>;
}

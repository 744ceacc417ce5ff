//! Capture Target Model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Image format requested from the remote screenshot call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        }
    }

    /// File extension used for storage and MIME lookup
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown output format: {0}")]
pub struct UnknownOutputFormat(pub String);

impl std::str::FromStr for OutputFormat {
    type Err = UnknownOutputFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "webp" => Ok(OutputFormat::Webp),
            other => Err(UnknownOutputFormat(other.to_string())),
        }
    }
}

/// Upper bound for the captured image size; the remote scales down to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Capture target - a remote scene/source registered for periodic capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    pub id: String,
    pub display_name: String,
    /// Name of the scene or source on the remote service
    pub remote_target_name: String,
    /// Capture cadence (milliseconds)
    pub cadence_ms: u64,
    pub output_format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_dimensions: Option<Dimensions>,
    /// Compression quality hint (0-100), `None` lets the remote decide
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    pub enabled: bool,
    pub created_at: i64,
}

impl CaptureTarget {
    /// Create an enabled PNG target with a generated id
    pub fn new(
        display_name: impl Into<String>,
        remote_target_name: impl Into<String>,
        cadence_ms: u64,
    ) -> Self {
        Self::with_id(
            crate::util::new_target_id(),
            display_name,
            remote_target_name,
            cadence_ms,
        )
    }

    pub fn with_id(
        id: impl Into<String>,
        display_name: impl Into<String>,
        remote_target_name: impl Into<String>,
        cadence_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            remote_target_name: remote_target_name.into(),
            cadence_ms,
            output_format: OutputFormat::default(),
            max_dimensions: None,
            quality: None,
            enabled: true,
            created_at: crate::util::now_millis(),
        }
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_dimensions = Some(Dimensions { width, height });
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality.min(100));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

//! Request and response types for the processing service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::artifacts::{Dataset, ImageArtifact, PeakMeans};

/// A file to upload: its name and contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NamedBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// First run of ASCII digits in the file name, e.g. `scan_300K.csv` -> `"300"`.
    pub fn embedded_number(&self) -> Option<&str> {
        let start = self.name.find(|c: char| c.is_ascii_digit())?;
        let rest = &self.name[start..];
        let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        Some(&rest[..end])
    }

    /// Numeric order of the embedded number without parsing it, so digit
    /// runs of any length compare correctly. Names without digits sort last.
    fn order_key(&self) -> (u8, usize, &str) {
        match self.embedded_number() {
            Some(digits) => {
                let significant = digits.trim_start_matches('0');
                (0, significant.len(), significant)
            }
            None => (1, 0, ""),
        }
    }

    /// Order files the way the service orders the derived dataset:
    /// by embedded number, names without digits last. Stable for ties.
    pub fn sort_by_embedded_number(files: &mut [NamedBlob]) {
        files.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    }
}

/// Input to the energy-loss conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub shifted_dataset: Dataset,
    pub dataset_titles: Vec<String>,
    pub peak_means: Option<PeakMeans>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub converted_preview_image: ImageArtifact,
    pub converted_dataset: Dataset,
}

/// Transforms the service can apply to the preview dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformAction {
    FlipUd,
    FlipLr,
    RotateCcw90,
    RotateCw90,
    Blur,
    Sharpen,
    /// Re-render the dataset as-is.
    Reset,
}

impl TransformAction {
    pub const ALL: [TransformAction; 7] = [
        TransformAction::FlipUd,
        TransformAction::FlipLr,
        TransformAction::RotateCcw90,
        TransformAction::RotateCw90,
        TransformAction::Blur,
        TransformAction::Sharpen,
        TransformAction::Reset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransformAction::FlipUd => "flip_ud",
            TransformAction::FlipLr => "flip_lr",
            TransformAction::RotateCcw90 => "rotate_ccw90",
            TransformAction::RotateCw90 => "rotate_cw90",
            TransformAction::Blur => "blur",
            TransformAction::Sharpen => "sharpen",
            TransformAction::Reset => "reset",
        }
    }
}

impl fmt::Display for TransformAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransformAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub action: TransformAction,
    pub dataset: Dataset,
    pub dataset_titles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub image: ImageArtifact,
    pub dataset: Dataset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub dataset: Dataset,
    pub dataset_titles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportResult {
    pub file_references: Vec<Url>,
}

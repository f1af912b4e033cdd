//! Value types describing what the processing service returned for the
//! current logical dataset.
//!
//! Everything here is plain data: `Clone` is a deep copy, which is what the
//! snapshot/reset machinery relies on.

use serde::{Deserialize, Serialize};
use url::Url;

/// Reference to an image produced by the service.
///
/// The service hands back either a path/URL it serves the image from or an
/// inline `data:` URL. Which one is a presentation concern; the session only
/// stores and forwards the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageArtifact(String);

impl ImageArtifact {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Resolve a server-relative reference (e.g. `/static/images/plot.png`)
    /// against the service base URL. Absolute and `data:` references are
    /// returned unchanged.
    pub fn resolve_against(&self, base: &Url) -> ImageArtifact {
        if self.is_data_url() || Url::parse(&self.0).is_ok() {
            return self.clone();
        }
        match base.join(&self.0) {
            Ok(url) => ImageArtifact(url.to_string()),
            Err(_) => self.clone(),
        }
    }
}

impl std::fmt::Display for ImageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the two profile plots (X or Y) derived at ingest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePlot {
    pub image: Option<ImageArtifact>,
}

impl ProfilePlot {
    pub fn with_image(image: ImageArtifact) -> Self {
        Self { image: Some(image) }
    }

    pub fn is_present(&self) -> bool {
        self.image.is_some()
    }
}

/// A single file's numeric map: a grid of intensities with numeric axis
/// labels for rows (`index`) and columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub index: Vec<f64>,
    pub columns: Vec<f64>,
    #[serde(rename = "data")]
    pub values: Vec<Vec<f64>>,
}

impl Frame {
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }
}

/// Ordered per-file numeric maps, one entry per uploaded file.
///
/// The service either returns the maps inline or keeps them server-side and
/// hands back a reference to the stored copy (e.g.
/// `saved_data/explist_shifted_gauss.pkl`). Both forms are sent back verbatim
/// on later requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dataset {
    Stored(String),
    Inline(Vec<Frame>),
}

impl Dataset {
    pub fn new(frames: Vec<Frame>) -> Self {
        Dataset::Inline(frames)
    }

    pub fn stored(reference: impl Into<String>) -> Self {
        Dataset::Stored(reference.into())
    }

    /// Inline frames; empty for a stored dataset.
    pub fn frames(&self) -> &[Frame] {
        match self {
            Dataset::Inline(frames) => frames,
            Dataset::Stored(_) => &[],
        }
    }

    pub fn stored_reference(&self) -> Option<&str> {
        match self {
            Dataset::Stored(reference) => Some(reference),
            Dataset::Inline(_) => None,
        }
    }

    /// Number of entries, when known locally. A stored dataset's size is
    /// only known to the service.
    pub fn entry_count(&self) -> Option<usize> {
        match self {
            Dataset::Inline(frames) => Some(frames.len()),
            Dataset::Stored(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Dataset::Inline(frames) => frames.is_empty(),
            Dataset::Stored(reference) => reference.trim().is_empty(),
        }
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Dataset::Inline(Vec::new())
    }
}

impl From<Vec<Frame>> for Dataset {
    fn from(frames: Vec<Frame>) -> Self {
        Dataset::Inline(frames)
    }
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dataset::Inline(frames) => write!(f, "{} entries", frames.len()),
            Dataset::Stored(reference) => write!(f, "stored at {}", reference),
        }
    }
}

/// Per-file Gaussian peak centres found while aligning the maps.
/// Conversion consumes the Y means; X means are informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakMeans {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Everything the service has produced for the current logical dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionArtifacts {
    pub preview_image: ImageArtifact,
    pub profile_x: ProfilePlot,
    pub profile_y: ProfilePlot,
    /// Canonical transform input until a conversion is applied.
    pub shifted_dataset: Dataset,
    /// Present only after a successful conversion.
    pub converted_dataset: Option<Dataset>,
    pub dataset_titles: Vec<String>,
    pub peak_means: Option<PeakMeans>,
    pub converted_preview_image: Option<ImageArtifact>,
}

impl SessionArtifacts {
    /// Artifacts as returned by an ingest, before any conversion.
    pub fn from_ingest(
        preview_image: ImageArtifact,
        profile_x: ProfilePlot,
        profile_y: ProfilePlot,
        shifted_dataset: Dataset,
        dataset_titles: Vec<String>,
        peak_means: Option<PeakMeans>,
    ) -> Self {
        Self {
            preview_image,
            profile_x,
            profile_y,
            shifted_dataset,
            converted_dataset: None,
            dataset_titles,
            peak_means,
            converted_preview_image: None,
        }
    }

    /// Drop any conversion output, leaving the shifted lineage.
    pub fn clear_conversion(&mut self) {
        self.converted_dataset = None;
        self.converted_preview_image = None;
    }
}

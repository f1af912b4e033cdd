//! JSON bodies exchanged with the processing service and their mapping to
//! the session types.

use serde::{Deserialize, Serialize};
use url::Url;

use super::types::{ConversionResult, ExportResult, TransformAction, TransformResult};
use crate::artifacts::{Dataset, ImageArtifact, PeakMeans, ProfilePlot, SessionArtifacts};
use crate::error::{Result, SessionError};

pub(crate) const UPLOAD_ROUTE: &str = "upload-directory";
pub(crate) const CONVERT_ROUTE: &str = "q-energyloss";
pub(crate) const TRANSFORM_ROUTE: &str = "transform";
pub(crate) const EXPORT_ROUTE: &str = "download-shifted-data";

/// Multipart field carrying each uploaded file.
pub(crate) const UPLOAD_FIELD: &str = "filePaths";
/// Multipart field carrying the conversion payload.
pub(crate) const CONVERT_FIELD: &str = "data.json";

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    image: String,
    #[serde(default)]
    gauss_peak_x_mean: Vec<f64>,
    #[serde(default)]
    gauss_peak_y_mean: Option<Vec<f64>>,
    explist_shifted_gauss: Dataset,
    exptitles: Vec<String>,
    #[serde(default)]
    profiles: Profiles,
}

#[derive(Debug, Default, Deserialize)]
struct Profiles {
    #[serde(default)]
    x_profile: Option<ProfileEntry>,
    #[serde(default)]
    y_profile: Option<ProfileEntry>,
}

#[derive(Debug, Deserialize)]
struct ProfileEntry {
    #[serde(default)]
    image: Option<String>,
}

impl UploadResponse {
    pub(crate) fn into_artifacts(self, status: u16, base: &Url) -> Result<SessionArtifacts> {
        if self.exptitles.is_empty() || self.explist_shifted_gauss.is_empty() {
            return Err(SessionError::remote(status, "Upload returned no dataset entries"));
        }
        if let Some(entries) = self.explist_shifted_gauss.entry_count() {
            if entries != self.exptitles.len() {
                return Err(SessionError::remote(
                    status,
                    format!(
                        "Upload returned {} titles for {} dataset entries",
                        self.exptitles.len(),
                        entries
                    ),
                ));
            }
        }

        let peak_means = self.gauss_peak_y_mean.map(|y| PeakMeans {
            x: self.gauss_peak_x_mean,
            y,
        });

        Ok(SessionArtifacts::from_ingest(
            ImageArtifact::new(self.image).resolve_against(base),
            profile_plot(self.profiles.x_profile, base),
            profile_plot(self.profiles.y_profile, base),
            self.explist_shifted_gauss,
            self.exptitles,
            peak_means,
        ))
    }
}

fn profile_plot(entry: Option<ProfileEntry>, base: &Url) -> ProfilePlot {
    match entry.and_then(|e| e.image).filter(|s| !s.trim().is_empty()) {
        Some(image) => ProfilePlot::with_image(ImageArtifact::new(image).resolve_against(base)),
        None => ProfilePlot::default(),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ConversionBody<'a> {
    pub explist_shifted_gauss: &'a Dataset,
    pub exptitles: &'a [String],
    pub gauss_peak_y_mean: Option<&'a [f64]>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversionResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    q_plot: Option<String>,
    #[serde(default)]
    explist: Option<Dataset>,
}

impl ConversionResponse {
    /// A service that keeps the converted data server-side answers without
    /// `explist`; the dataset reference that was sent stands in for it.
    pub(crate) fn into_result(self, status: u16, base: &Url, sent: &Dataset) -> Result<ConversionResult> {
        if !self.success {
            return Err(unsuccessful(status, self.error));
        }
        let image = self
            .q_plot
            .ok_or_else(|| SessionError::remote(status, "Conversion response has no q_plot"))?;
        let dataset = returned_or_sent(self.explist, sent, status, "Conversion")?;

        Ok(ConversionResult {
            converted_preview_image: ImageArtifact::new(image).resolve_against(base),
            converted_dataset: dataset,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TransformBody<'a> {
    pub action: TransformAction,
    pub explist: &'a Dataset,
    pub exptitles: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransformResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    explist: Option<Dataset>,
}

impl TransformResponse {
    pub(crate) fn into_result(self, status: u16, base: &Url, sent: &Dataset) -> Result<TransformResult> {
        if !self.success {
            return Err(unsuccessful(status, self.error));
        }
        let image = self
            .image
            .ok_or_else(|| SessionError::remote(status, "Transform response has no image"))?;
        let dataset = returned_or_sent(self.explist, sent, status, "Transform")?;

        Ok(TransformResult {
            image: ImageArtifact::new(image).resolve_against(base),
            dataset,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExportBody<'a> {
    pub explist: &'a Dataset,
    pub exptitles: &'a [String],
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExportResponse {
    #[serde(default)]
    file_urls: Vec<String>,
}

impl ExportResponse {
    pub(crate) fn into_result(self, status: u16, base: &Url) -> Result<ExportResult> {
        let file_references = self
            .file_urls
            .iter()
            .map(|reference| {
                base.join(reference).map_err(|e| {
                    SessionError::remote(status, format!("Invalid file URL '{}': {}", reference, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ExportResult { file_references })
    }
}

/// Error body the service sends alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Inline data must come back inline; only a stored reference may be
/// carried forward when the service omits the dataset.
fn returned_or_sent(
    returned: Option<Dataset>,
    sent: &Dataset,
    status: u16,
    operation: &str,
) -> Result<Dataset> {
    match returned {
        Some(dataset) => Ok(dataset),
        None if sent.stored_reference().is_some() => Ok(sent.clone()),
        None => Err(SessionError::remote(
            status,
            format!("{} response has no explist", operation),
        )),
    }
}

fn default_success() -> bool {
    true
}

fn unsuccessful(status: u16, error: Option<String>) -> SessionError {
    SessionError::remote(
        status,
        error.unwrap_or_else(|| "Unknown error occurred".to_string()),
    )
}

//! HTTP+JSON implementation of `RemoteProcessingClient`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{error, info};
use url::Url;

use super::types::*;
use super::wire::{self, ConversionBody, ExportBody, TransformBody};
use super::RemoteProcessingClient;
use crate::artifacts::probe::{decode_data_url, FetchedImage};
use crate::artifacts::{ImageArtifact, SessionArtifacts};
use crate::config::ServiceConfig;
use crate::error::{Result, SessionError};

/// Longest error body excerpt carried into a `RemoteService` error.
const MAX_ERROR_BODY: usize = 1024;

/// Talks to the processing service over HTTP.
pub struct HttpProcessingClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProcessingClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()
            .map_err(|e| SessionError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, route: &str) -> Result<Url> {
        self.base_url
            .join(route)
            .map_err(|e| SessionError::Config(format!("Invalid route '{}': {}", route, e)))
    }

    /// Retrieve an image artifact's bytes, for saving the preview or a
    /// profile plot. Inline `data:` URLs are decoded without a request.
    pub async fn fetch_image(&self, artifact: &ImageArtifact) -> Result<FetchedImage> {
        if artifact.is_data_url() {
            return FetchedImage::from_bytes(decode_data_url(artifact.as_str())?);
        }

        let url = artifact.resolve_against(&self.base_url);
        info!("Fetching image {}", url);
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        let response = ensure_success(response, "image").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        FetchedImage::from_bytes(bytes.to_vec())
    }
}

#[async_trait]
impl RemoteProcessingClient for HttpProcessingClient {
    async fn ingest(&self, files: Vec<NamedBlob>) -> Result<SessionArtifacts> {
        let url = self.endpoint(wire::UPLOAD_ROUTE)?;
        info!("Uploading {} files to {}", files.len(), url);

        let form = files.into_iter().fold(Form::new(), |form, file| {
            form.part(wire::UPLOAD_FIELD, Part::bytes(file.bytes).file_name(file.name))
        });

        let response = self
            .client
            .post(url.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        let (status, body): (u16, wire::UploadResponse) =
            read_json(response, wire::UPLOAD_ROUTE).await?;
        body.into_artifacts(status, &self.base_url)
    }

    async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult> {
        let url = self.endpoint(wire::CONVERT_ROUTE)?;
        info!(
            "Requesting energy-loss conversion ({})",
            request.shifted_dataset
        );

        let payload = serde_json::to_vec(&ConversionBody {
            explist_shifted_gauss: &request.shifted_dataset,
            exptitles: &request.dataset_titles,
            gauss_peak_y_mean: request.peak_means.as_ref().map(|m| m.y.as_slice()),
        })
        .map_err(|e| SessionError::Transport(format!("Failed to encode conversion payload: {}", e)))?;

        let part = Part::bytes(payload)
            .file_name(wire::CONVERT_FIELD)
            .mime_str("application/json")
            .map_err(|e| SessionError::Transport(format!("Invalid payload type: {}", e)))?;
        let form = Form::new().part(wire::CONVERT_FIELD, part);

        let response = self
            .client
            .post(url.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        let (status, body): (u16, wire::ConversionResponse) =
            read_json(response, wire::CONVERT_ROUTE).await?;
        body.into_result(status, &self.base_url, &request.shifted_dataset)
    }

    async fn transform(&self, request: TransformRequest) -> Result<TransformResult> {
        let url = self.endpoint(wire::TRANSFORM_ROUTE)?;
        info!("Requesting transform '{}'", request.action);

        let response = self
            .client
            .post(url.as_str())
            .json(&TransformBody {
                action: request.action,
                explist: &request.dataset,
                exptitles: &request.dataset_titles,
            })
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        let (status, body): (u16, wire::TransformResponse) =
            read_json(response, wire::TRANSFORM_ROUTE).await?;
        body.into_result(status, &self.base_url, &request.dataset)
    }

    async fn export_dataset(&self, request: ExportRequest) -> Result<ExportResult> {
        let url = self.endpoint(wire::EXPORT_ROUTE)?;
        info!("Requesting export ({})", request.dataset);

        let response = self
            .client
            .post(url.as_str())
            .json(&ExportBody {
                explist: &request.dataset,
                exptitles: &request.dataset_titles,
            })
            .send()
            .await
            .map_err(|e| transport_error(url.as_str(), e))?;

        let (status, body): (u16, wire::ExportResponse) =
            read_json(response, wire::EXPORT_ROUTE).await?;
        body.into_result(status, &self.base_url)
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> SessionError {
    let msg = if e.is_timeout() {
        format!("Request to {} timed out", url)
    } else {
        format!("Request to {} failed: {}", url, e)
    };
    error!("{}", msg);
    SessionError::Transport(msg)
}

/// Turn a non-2xx response into `RemoteService`, preferring the body's
/// `error` field over the raw text.
async fn ensure_success(response: reqwest::Response, route: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    let message = error_message(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("Unknown error").to_string()
        } else {
            truncate(&body, MAX_ERROR_BODY)
        }
    });

    error!("Service error on {}: {} - {}", route, status, message);
    Err(SessionError::remote(status.as_u16(), message))
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, route: &str) -> Result<(u16, T)> {
    let response = ensure_success(response, route).await?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| SessionError::Transport(format!("Failed to read {} response: {}", route, e)))?;

    let body = serde_json::from_str(&text).map_err(|e| {
        let msg = format!(
            "Failed to parse {} response: {}. Body: {}",
            route,
            e,
            truncate(&text, 500)
        );
        error!("{}", msg);
        SessionError::remote(status, msg)
    })?;
    Ok((status, body))
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<wire::ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|e| !e.trim().is_empty())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use image::{DynamicImage, ImageFormat};
    use std::io::Cursor;

    #[test]
    fn test_endpoints_join_under_base() {
        let config = ServiceConfig {
            base_url: "http://localhost:7654/api".to_string(),
            ..ServiceConfig::default()
        };
        let client = HttpProcessingClient::new(&config).unwrap();
        assert_eq!(
            client.endpoint(wire::UPLOAD_ROUTE).unwrap().as_str(),
            "http://localhost:7654/api/upload-directory"
        );
        assert_eq!(
            client.endpoint(wire::EXPORT_ROUTE).unwrap().as_str(),
            "http://localhost:7654/api/download-shifted-data"
        );
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let config = ServiceConfig {
            base_url: "::".to_string(),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            HttpProcessingClient::new(&config),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error": "Missing data for Q-Energy Loss transformation"}"#),
            Some("Missing data for Q-Energy Loss transformation".to_string())
        );
        assert_eq!(error_message("<html>Internal Server Error</html>"), None);
        assert_eq!(error_message(r#"{"error": ""}"#), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("파일이", 4), "파...");
    }

    #[tokio::test]
    async fn test_fetch_inline_image_without_request() {
        let img = DynamicImage::new_rgb8(16, 12);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        let artifact = ImageArtifact::new(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(buffer.into_inner())
        ));

        // Port 9 (discard) is never contacted for data URLs.
        let config = ServiceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..ServiceConfig::default()
        };
        let client = HttpProcessingClient::new(&config).unwrap();
        let fetched = client.fetch_image(&artifact).await.unwrap();
        assert_eq!((fetched.width, fetched.height), (16, 12));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        let config = ServiceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 2,
            ..ServiceConfig::default()
        };
        let client = HttpProcessingClient::new(&config).unwrap();
        let result = client
            .export_dataset(ExportRequest {
                dataset: Default::default(),
                dataset_titles: vec![],
            })
            .await;
        assert!(matches!(result, Err(SessionError::Transport(_))));
    }
}

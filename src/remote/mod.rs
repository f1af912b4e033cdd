//! Boundary to the remote processing service.
//!
//! `RemoteProcessingClient` is the seam the orchestrator talks through.
//! `HttpProcessingClient` is the production implementation; tests provide
//! scripted in-memory ones.

pub mod http;
pub mod types;
mod wire;

use async_trait::async_trait;

use crate::artifacts::SessionArtifacts;
use crate::error::Result;

pub use http::HttpProcessingClient;
pub use types::*;

/// The four logical operations the processing service offers.
///
/// Implementations report service-side failures as
/// `SessionError::RemoteService` and network failures as
/// `SessionError::Transport`. They hold no session state.
#[async_trait]
pub trait RemoteProcessingClient: Send + Sync {
    /// Upload a batch of files and derive preview, profiles and the shifted dataset.
    async fn ingest(&self, files: Vec<NamedBlob>) -> Result<SessionArtifacts>;

    /// Run the energy-loss conversion over the shifted dataset.
    async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult>;

    /// Apply one geometric/filter transform to a dataset.
    async fn transform(&self, request: TransformRequest) -> Result<TransformResult>;

    /// Produce downloadable files for a dataset. An empty list is a valid answer.
    async fn export_dataset(&self, request: ExportRequest) -> Result<ExportResult>;
}

//! Client-side session orchestrator for the spectral map processing service.
//!
//! A session starts with an upload of data files, may apply the energy-loss
//! conversion, chains transforms over the resulting dataset, can be reset to
//! the post-upload state, and ends with an export. `SessionOrchestrator`
//! keeps that state consistent; `HttpProcessingClient` talks to the service.

pub mod artifacts;
pub mod config;
mod error;
pub mod orchestrator;
pub mod remote;

pub use artifacts::{
    ArtifactStore, Dataset, FetchedImage, Frame, ImageArtifact, PeakMeans, ProfilePlot,
    SessionArtifacts, SessionState,
};
pub use config::ServiceConfig;
pub use error::{Result, SessionError};
pub use orchestrator::{IngestOutcome, Preview, PreviewKind, SessionOrchestrator, SessionPhase};
pub use remote::{
    ConversionRequest, ConversionResult, ExportRequest, ExportResult, HttpProcessingClient,
    NamedBlob, RemoteProcessingClient, TransformAction, TransformRequest, TransformResult,
};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

//! The session state machine.
//!
//! `SessionOrchestrator` owns the `ArtifactStore` and is the only code that
//! writes to it. Every operation either commits a complete new state after
//! its remote call succeeds or returns an error with the state untouched.
//!
//! ```text
//! Empty -> Uploading -> Ready <-> Converting -> ReadyConverted
//!                        ^  \-> Transforming -/      |
//!                        \------ Resetting <---------/
//! ```
//!
//! Operations take `&mut self`, so a caller cannot start a second operation
//! while one is in flight.

use serde::Serialize;
use tracing::{info, warn};

use crate::artifacts::{ArtifactStore, Dataset, ImageArtifact, SessionArtifacts, SessionState};
use crate::error::{Result, SessionError};
use crate::remote::{
    ConversionRequest, ExportRequest, ExportResult, NamedBlob, RemoteProcessingClient,
    TransformAction, TransformRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Empty,
    Uploading,
    Ready,
    Converting,
    ReadyConverted,
    Transforming,
    Resetting,
}

/// Which of the two previews is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PreviewKind {
    Original,
    Converted,
}

/// The preview the presentation layer should show after an operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub image: ImageArtifact,
    pub kind: PreviewKind,
}

/// Result of an ingest that landed.
///
/// When conversion is enabled the new data is converted as part of the
/// ingest. A failed conversion does not undo the upload: the session holds
/// the unconverted data and the failure is reported here.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub preview: Preview,
    pub conversion_error: Option<SessionError>,
}

pub struct SessionOrchestrator<C: RemoteProcessingClient> {
    client: C,
    store: ArtifactStore,
    phase: SessionPhase,
}

impl<C: RemoteProcessingClient> SessionOrchestrator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            store: ArtifactStore::new(),
            phase: SessionPhase::Empty,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Current phase. Transient phases (`Uploading`, `Converting`, ...) are
    /// only observable while an operation's future is pending.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        self.store.get()
    }

    pub fn current_artifacts(&self) -> Option<&SessionArtifacts> {
        self.store.get().current.as_ref()
    }

    pub fn initial_artifacts(&self) -> Option<&SessionArtifacts> {
        self.store.get().initial_snapshot.as_ref()
    }

    pub fn conversion_enabled(&self) -> bool {
        self.store.get().conversion_enabled
    }

    pub fn conversion_applied(&self) -> bool {
        self.store.get().conversion_applied
    }

    /// The preview matching the toggle rule, or `None` before the first ingest.
    pub fn visible_preview(&self) -> Option<Preview> {
        let state = self.store.get();
        let current = state.current.as_ref()?;
        if state.conversion_applied {
            if let Some(image) = &current.converted_preview_image {
                return Some(Preview {
                    image: image.clone(),
                    kind: PreviewKind::Converted,
                });
            }
        }
        Some(Preview {
            image: current.preview_image.clone(),
            kind: PreviewKind::Original,
        })
    }

    /// The dataset the next transform or export consumes: the converted
    /// dataset while conversion is applied, the shifted dataset otherwise.
    pub fn authoritative_dataset(&self) -> Option<&Dataset> {
        let state = self.store.get();
        let current = state.current.as_ref()?;
        if state.conversion_applied {
            current.converted_dataset.as_ref()
        } else {
            Some(&current.shifted_dataset)
        }
    }

    /// Upload a new batch of files, replacing the whole session.
    ///
    /// `Err` means nothing changed. `Ok` means the upload is committed; a
    /// conversion chained onto it may still have failed, see
    /// `IngestOutcome::conversion_error`.
    pub async fn ingest(&mut self, mut files: Vec<NamedBlob>) -> Result<IngestOutcome> {
        if files.is_empty() {
            warn!("Ingest requested with no files");
            return Err(SessionError::NoFilesSelected);
        }

        NamedBlob::sort_by_embedded_number(&mut files);
        info!("Ingesting {} files", files.len());

        self.phase = SessionPhase::Uploading;
        let result = self.client.ingest(files).await;
        self.phase = self.settled_phase();

        let artifacts = result.map_err(|e| {
            warn!("Ingest failed: {}", e);
            e
        })?;
        if artifacts.shifted_dataset.is_empty() || artifacts.dataset_titles.is_empty() {
            warn!("Ingest returned no dataset");
            return Err(SessionError::MissingDataset);
        }
        ensure_aligned(&artifacts.shifted_dataset, &artifacts.dataset_titles, "ingest")?;

        self.store.start_new_lineage();
        self.store.capture_initial_snapshot_if_absent(&artifacts);
        self.store.set_current(artifacts);
        self.store.set_conversion_applied(false);
        self.phase = self.settled_phase();
        info!("Ingest complete");

        let mut conversion_error = None;
        if self.store.get().conversion_enabled {
            info!("Conversion is enabled, converting new data");
            if let Err(e) = self.convert().await {
                warn!("Upload kept without conversion");
                conversion_error = Some(e);
            }
        }

        Ok(IngestOutcome {
            preview: self.current_preview()?,
            conversion_error,
        })
    }

    /// Record the user's conversion toggle.
    ///
    /// Any change invalidates the converted data. Turning conversion on (or
    /// leaving it on after a failed conversion) runs a fresh conversion.
    pub async fn set_conversion_enabled(&mut self, enabled: bool) -> Result<Preview> {
        let has_data = self
            .store
            .get()
            .current
            .as_ref()
            .is_some_and(|c| !c.shifted_dataset.is_empty());
        if !has_data {
            return Err(SessionError::NoActiveSession);
        }

        if self.store.get().conversion_enabled != enabled {
            info!("Conversion toggled {}", if enabled { "on" } else { "off" });
            self.store.set_conversion_enabled(enabled);
            self.invalidate_conversion();
        }

        if enabled && !self.store.get().conversion_applied {
            self.convert().await?;
        }

        self.current_preview()
    }

    /// Run the energy-loss conversion over the shifted dataset.
    /// Only reached while the toggle is on.
    async fn convert(&mut self) -> Result<()> {
        let request = {
            let current = self
                .store
                .get()
                .current
                .as_ref()
                .filter(|c| !c.shifted_dataset.is_empty())
                .ok_or(SessionError::MissingDataset)?;
            ConversionRequest {
                shifted_dataset: current.shifted_dataset.clone(),
                dataset_titles: current.dataset_titles.clone(),
                peak_means: current.peak_means.clone(),
            }
        };

        self.phase = SessionPhase::Converting;
        let result = self.client.convert(request).await;
        self.phase = self.settled_phase();

        let converted = match result {
            Ok(converted) => converted,
            Err(e) => {
                warn!("Conversion failed: {}", e);
                self.store.set_conversion_applied(false);
                self.phase = self.settled_phase();
                return Err(e);
            }
        };

        let mut next = self.current_or_missing()?.clone();
        ensure_aligned(&converted.converted_dataset, &next.dataset_titles, "conversion")?;
        next.converted_dataset = Some(converted.converted_dataset);
        next.converted_preview_image = Some(converted.converted_preview_image);

        self.store.set_current(next);
        self.store.set_conversion_applied(true);
        self.phase = self.settled_phase();
        info!("Conversion applied");
        Ok(())
    }

    /// Apply a transform to the authoritative dataset. The result becomes
    /// the new authoritative dataset, so transforms compose.
    pub async fn transform(&mut self, action: TransformAction) -> Result<Preview> {
        let applied = self.store.get().conversion_applied;
        let request = match (self.authoritative_dataset(), self.current_artifacts()) {
            (Some(dataset), Some(current)) if !dataset.is_empty() => TransformRequest {
                action,
                dataset: dataset.clone(),
                dataset_titles: current.dataset_titles.clone(),
            },
            _ => {
                warn!("Transform '{}' requested with no data", action);
                return Err(SessionError::EmptyDataset);
            }
        };

        self.phase = SessionPhase::Transforming;
        let result = self.client.transform(request).await;
        self.phase = self.settled_phase();

        let transformed = result.map_err(|e| {
            warn!("Transform '{}' failed: {}", action, e);
            e
        })?;

        let mut next = self.current_or_missing()?.clone();
        ensure_aligned(&transformed.dataset, &next.dataset_titles, "transform")?;
        if applied {
            next.converted_dataset = Some(transformed.dataset);
            next.converted_preview_image = Some(transformed.image);
        } else {
            next.shifted_dataset = transformed.dataset;
            next.preview_image = transformed.image;
        }

        self.store.set_current(next);
        info!("Transform '{}' applied", action);
        self.current_preview()
    }

    /// Restore the artifacts captured at ingest. The conversion toggle keeps
    /// its value but conversion is no longer applied.
    pub fn reset_to_initial(&mut self) -> Result<Preview> {
        let restored = self.store.restore_from_snapshot()?;

        self.phase = SessionPhase::Resetting;
        self.store.set_current(restored);
        self.store.set_conversion_applied(false);
        self.phase = self.settled_phase();
        info!("Reset to initial state");

        self.current_preview()
    }

    /// Ask the service for downloadable files of the authoritative dataset.
    pub async fn export_dataset(&mut self) -> Result<ExportResult> {
        let request = match (self.authoritative_dataset(), self.current_artifacts()) {
            (Some(dataset), Some(current)) if !dataset.is_empty() => ExportRequest {
                dataset: dataset.clone(),
                dataset_titles: current.dataset_titles.clone(),
            },
            _ => return Err(SessionError::NoDataToExport),
        };

        info!("Exporting dataset ({})", request.dataset);
        let result = self.client.export_dataset(request).await.map_err(|e| {
            warn!("Export failed: {}", e);
            e
        })?;

        if result.file_references.is_empty() {
            warn!("Export produced no files");
            return Err(SessionError::NoFilesProduced);
        }

        info!("Export produced {} files", result.file_references.len());
        Ok(result)
    }

    fn invalidate_conversion(&mut self) {
        self.store.set_conversion_applied(false);
        if let Some(current) = self.store.get().current.as_ref() {
            if current.converted_dataset.is_some() {
                let mut next = current.clone();
                next.clear_conversion();
                self.store.set_current(next);
            }
        }
        self.phase = self.settled_phase();
    }

    fn settled_phase(&self) -> SessionPhase {
        let state = self.store.get();
        match (&state.current, state.conversion_applied) {
            (None, _) => SessionPhase::Empty,
            (Some(_), true) => SessionPhase::ReadyConverted,
            (Some(_), false) => SessionPhase::Ready,
        }
    }

    fn current_or_missing(&self) -> Result<&SessionArtifacts> {
        self.store
            .get()
            .current
            .as_ref()
            .ok_or(SessionError::NoActiveSession)
    }

    fn current_preview(&self) -> Result<Preview> {
        self.visible_preview().ok_or(SessionError::NoActiveSession)
    }
}

/// Reject responses whose dataset does not line up with the titles. A
/// stored dataset is checked by the service that holds it.
fn ensure_aligned(dataset: &Dataset, titles: &[String], operation: &str) -> Result<()> {
    match dataset.entry_count() {
        Some(entries) if entries != titles.len() => Err(SessionError::remote(
            200,
            format!(
                "{} returned {} dataset entries for {} titles",
                operation,
                entries,
                titles.len()
            ),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Frame, ProfilePlot};
    use crate::remote::{ConversionResult, TransformResult};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use url::Url;

    fn frame(seed: f64) -> Frame {
        Frame {
            index: vec![0.0, 1.0],
            columns: vec![0.0],
            values: vec![vec![seed], vec![seed + 1.0]],
        }
    }

    fn dataset(seed: f64, entries: usize) -> Dataset {
        Dataset::new((0..entries).map(|i| frame(seed + i as f64)).collect())
    }

    #[derive(Default)]
    struct Calls {
        convert: usize,
        transform: Vec<TransformRequest>,
    }

    /// Minimal client: ingest returns two entries, every other call succeeds
    /// with a dataset derived from the request.
    struct EchoClient {
        calls: Arc<Mutex<Calls>>,
        fail_convert: bool,
    }

    #[async_trait]
    impl RemoteProcessingClient for EchoClient {
        async fn ingest(&self, files: Vec<NamedBlob>) -> Result<SessionArtifacts> {
            Ok(SessionArtifacts::from_ingest(
                ImageArtifact::new("preview.png"),
                ProfilePlot::with_image(ImageArtifact::new("x.png")),
                ProfilePlot::with_image(ImageArtifact::new("y.png")),
                dataset(0.0, files.len()),
                files.iter().map(|f| f.name.clone()).collect(),
                None,
            ))
        }

        async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult> {
            self.calls.lock().unwrap().convert += 1;
            if self.fail_convert {
                return Err(SessionError::remote(400, "Missing data"));
            }
            Ok(ConversionResult {
                converted_preview_image: ImageArtifact::new("q.png"),
                converted_dataset: dataset(100.0, request.shifted_dataset.frames().len()),
            })
        }

        async fn transform(&self, request: TransformRequest) -> Result<TransformResult> {
            let entries = request.dataset.frames().len();
            let action = request.action;
            self.calls.lock().unwrap().transform.push(request);
            Ok(TransformResult {
                image: ImageArtifact::new(format!("{}.png", action)),
                dataset: dataset(1000.0, entries),
            })
        }

        async fn export_dataset(&self, _request: ExportRequest) -> Result<ExportResult> {
            Ok(ExportResult {
                file_references: vec![Url::parse("http://localhost:7654/static/a.csv").unwrap()],
            })
        }
    }

    fn orchestrator(fail_convert: bool) -> (SessionOrchestrator<EchoClient>, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let client = EchoClient {
            calls: calls.clone(),
            fail_convert,
        };
        (SessionOrchestrator::new(client), calls)
    }

    fn files() -> Vec<NamedBlob> {
        vec![NamedBlob::new("20K.csv", "a"), NamedBlob::new("10K.csv", "b")]
    }

    #[tokio::test]
    async fn test_phases_follow_operations() {
        let (mut session, _) = orchestrator(false);
        assert_eq!(session.phase(), SessionPhase::Empty);

        session.ingest(files()).await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);

        session.set_conversion_enabled(true).await.unwrap();
        assert_eq!(session.phase(), SessionPhase::ReadyConverted);

        session.reset_to_initial().unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[tokio::test]
    async fn test_ingest_sorts_files_by_embedded_number() {
        let (mut session, _) = orchestrator(false);
        session.ingest(files()).await.unwrap();
        let titles = &session.current_artifacts().unwrap().dataset_titles;
        assert_eq!(titles, &vec!["10K.csv".to_string(), "20K.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_toggle_off_to_off_is_noop() {
        let (mut session, calls) = orchestrator(false);
        session.ingest(files()).await.unwrap();

        let preview = session.set_conversion_enabled(false).await.unwrap();
        assert_eq!(preview.kind, PreviewKind::Original);
        assert_eq!(calls.lock().unwrap().convert, 0);
        assert!(!session.conversion_applied());
    }

    #[tokio::test]
    async fn test_toggle_off_to_on_converts() {
        let (mut session, calls) = orchestrator(false);
        session.ingest(files()).await.unwrap();

        let preview = session.set_conversion_enabled(true).await.unwrap();
        assert_eq!(preview.kind, PreviewKind::Converted);
        assert_eq!(preview.image.as_str(), "q.png");
        assert_eq!(calls.lock().unwrap().convert, 1);
        assert!(session.conversion_applied());
    }

    #[tokio::test]
    async fn test_toggle_on_to_off_invalidates() {
        let (mut session, calls) = orchestrator(false);
        session.ingest(files()).await.unwrap();
        session.set_conversion_enabled(true).await.unwrap();

        let preview = session.set_conversion_enabled(false).await.unwrap();
        assert_eq!(preview.kind, PreviewKind::Original);
        assert!(!session.conversion_applied());
        assert!(session.current_artifacts().unwrap().converted_dataset.is_none());
        assert_eq!(session.authoritative_dataset(), Some(&dataset(0.0, 2)));
        assert_eq!(calls.lock().unwrap().convert, 1);
    }

    #[tokio::test]
    async fn test_toggle_on_to_on_keeps_conversion() {
        let (mut session, calls) = orchestrator(false);
        session.ingest(files()).await.unwrap();
        session.set_conversion_enabled(true).await.unwrap();

        let preview = session.set_conversion_enabled(true).await.unwrap();
        assert_eq!(preview.kind, PreviewKind::Converted);
        assert_eq!(calls.lock().unwrap().convert, 1);
    }

    #[tokio::test]
    async fn test_toggle_without_session() {
        let (mut session, calls) = orchestrator(false);
        let err = session.set_conversion_enabled(true).await.unwrap_err();
        assert_eq!(err, SessionError::NoActiveSession);
        assert_eq!(calls.lock().unwrap().convert, 0);
        assert!(!session.conversion_enabled());
    }

    #[tokio::test]
    async fn test_failed_conversion_keeps_shifted_dataset_usable() {
        let (mut session, calls) = orchestrator(true);
        session.ingest(files()).await.unwrap();

        let err = session.set_conversion_enabled(true).await.unwrap_err();
        assert_eq!(err, SessionError::remote(400, "Missing data"));
        assert!(session.conversion_enabled());
        assert!(!session.conversion_applied());
        assert_eq!(session.phase(), SessionPhase::Ready);

        session.transform(TransformAction::FlipLr).await.unwrap();
        assert_eq!(calls.lock().unwrap().transform[0].dataset, dataset(0.0, 2));
    }

    #[tokio::test]
    async fn test_transform_on_converted_updates_converted_preview() {
        let (mut session, _) = orchestrator(false);
        session.ingest(files()).await.unwrap();
        session.set_conversion_enabled(true).await.unwrap();

        let preview = session.transform(TransformAction::Sharpen).await.unwrap();
        assert_eq!(preview.kind, PreviewKind::Converted);
        assert_eq!(preview.image.as_str(), "sharpen.png");

        let current = session.current_artifacts().unwrap();
        assert_eq!(current.preview_image.as_str(), "preview.png");
        assert_eq!(current.shifted_dataset, dataset(0.0, 2));
    }

    #[tokio::test]
    async fn test_reset_keeps_toggle_preference() {
        let (mut session, _) = orchestrator(false);
        session.ingest(files()).await.unwrap();
        session.set_conversion_enabled(true).await.unwrap();
        session.transform(TransformAction::Blur).await.unwrap();

        let preview = session.reset_to_initial().unwrap();
        assert_eq!(preview.kind, PreviewKind::Original);
        assert_eq!(preview.image.as_str(), "preview.png");
        assert!(session.conversion_enabled());
        assert!(!session.conversion_applied());
    }

    #[test]
    fn test_reset_without_snapshot() {
        let (mut session, _) = orchestrator(false);
        assert_eq!(session.reset_to_initial(), Err(SessionError::NoSnapshot));
        assert_eq!(session.phase(), SessionPhase::Empty);
    }

    #[tokio::test]
    async fn test_export_without_data() {
        let (mut session, _) = orchestrator(false);
        assert_eq!(
            session.export_dataset().await,
            Err(SessionError::NoDataToExport)
        );
    }

    #[test]
    fn test_ensure_aligned() {
        let titles = vec!["a".to_string(), "b".to_string()];
        assert!(ensure_aligned(&dataset(0.0, 2), &titles, "transform").is_ok());
        let err = ensure_aligned(&dataset(0.0, 1), &titles, "transform").unwrap_err();
        assert!(err.to_string().contains("transform returned 1 dataset entries for 2 titles"));
        assert!(ensure_aligned(&Dataset::stored("saved_data/t.pkl"), &titles, "transform").is_ok());
    }

    #[tokio::test]
    async fn test_convert_without_shifted_dataset() {
        let (mut session, calls) = orchestrator(false);
        assert_eq!(session.convert().await, Err(SessionError::MissingDataset));
        assert_eq!(calls.lock().unwrap().convert, 0);
        assert!(!session.conversion_applied());
    }

    #[tokio::test]
    async fn test_ingest_with_failed_conversion_reports_outcome() {
        let (mut session, calls) = orchestrator(true);
        session.ingest(files()).await.unwrap();
        assert!(session.set_conversion_enabled(true).await.is_err());

        let outcome = session.ingest(files()).await.unwrap();
        assert_eq!(outcome.preview.kind, PreviewKind::Original);
        assert_eq!(
            outcome.conversion_error,
            Some(SessionError::remote(400, "Missing data"))
        );
        assert_eq!(calls.lock().unwrap().convert, 2);
        assert!(session.conversion_enabled());
        assert!(!session.conversion_applied());
        assert_eq!(session.phase(), SessionPhase::Ready);
    }
}

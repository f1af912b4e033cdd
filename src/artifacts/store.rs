use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::types::SessionArtifacts;
use crate::error::{Result, SessionError};

/// The orchestrator's mutable record of the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub current: Option<SessionArtifacts>,
    /// Deep copy taken at ingest. Only reset reads it.
    pub initial_snapshot: Option<SessionArtifacts>,
    /// The user's conversion toggle.
    pub conversion_enabled: bool,
    /// True only while `current.converted_dataset` matches the toggle.
    pub conversion_applied: bool,
    pub ingested_at: Option<DateTime<Utc>>,
}

/// In-memory holder for `SessionState`.
/// Performs no validation; the orchestrator decides what may be written.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    state: SessionState,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> &SessionState {
        &self.state
    }

    /// Replace the current artifacts in one step.
    pub fn set_current(&mut self, artifacts: SessionArtifacts) {
        debug!(
            "Replacing current artifacts ({}, converted: {})",
            artifacts.shifted_dataset,
            artifacts.converted_dataset.is_some()
        );
        self.state.current = Some(artifacts);
    }

    pub fn set_conversion_enabled(&mut self, enabled: bool) {
        self.state.conversion_enabled = enabled;
    }

    pub fn set_conversion_applied(&mut self, applied: bool) {
        self.state.conversion_applied = applied;
    }

    /// Forget the previous lineage's baseline so the next capture takes effect.
    /// Called when an ingest lands: a new upload is a new session.
    pub fn start_new_lineage(&mut self) {
        self.state.initial_snapshot = None;
        self.state.ingested_at = Some(Utc::now());
    }

    /// Deep-copy `artifacts` into the snapshot unless the lineage already has one.
    pub fn capture_initial_snapshot_if_absent(&mut self, artifacts: &SessionArtifacts) {
        if self.state.initial_snapshot.is_none() {
            info!(
                "Captured initial snapshot ({})",
                artifacts.shifted_dataset
            );
            self.state.initial_snapshot = Some(artifacts.clone());
        }
    }

    /// Fresh deep copy of the snapshot.
    pub fn restore_from_snapshot(&self) -> Result<SessionArtifacts> {
        self.state
            .initial_snapshot
            .clone()
            .ok_or(SessionError::NoSnapshot)
    }
}

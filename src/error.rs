use thiserror::Error;

/// Every failure the session orchestrator can report.
///
/// None of these are fatal: an operation that returns an error has left the
/// session exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("No files selected")]
    NoFilesSelected,

    #[error("No active session: upload files first")]
    NoActiveSession,

    #[error("No shifted dataset available")]
    MissingDataset,

    #[error("The dataset to transform is empty")]
    EmptyDataset,

    #[error("No initial state available")]
    NoSnapshot,

    #[error("No data available to export")]
    NoDataToExport,

    #[error("The service produced no files to export")]
    NoFilesProduced,

    #[error("Server error {status}: {message}")]
    RemoteService { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl SessionError {
    /// Client-side precondition failures, as opposed to a failed remote call.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SessionError::NoFilesSelected
                | SessionError::NoActiveSession
                | SessionError::MissingDataset
                | SessionError::EmptyDataset
                | SessionError::NoSnapshot
                | SessionError::NoDataToExport
                | SessionError::NoFilesProduced
        )
    }

    pub(crate) fn remote(status: u16, message: impl Into<String>) -> Self {
        SessionError::RemoteService {
            status,
            message: message.into(),
        }
    }
}

impl From<SessionError> for String {
    fn from(err: SessionError) -> Self {
        err.to_string()
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

//! Error types for the scraping pipeline.

use thiserror::Error;

/// Result type alias using the coursefetch error type.
pub type Result<T> = std::result::Result<T, CoursefetchError>;

/// Main error type for the scraping pipeline.
///
/// The first group of variants are per-task fetch failures. The batch scheduler
/// isolates them in the failing task's result slot, so they never abort a run.
#[derive(Error, Debug)]
pub enum CoursefetchError {
    /// Network-level failure (connect, timeout, reset, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request completed with a non-2xx status code
    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Request succeeded but the body is not JSON
    #[error("Expected JSON from {url} but got content type {content_type:?}")]
    UnexpectedContentType {
        url: String,
        content_type: Option<String>,
    },

    /// Response claimed to be JSON but did not parse
    #[error("Invalid JSON payload from {url}: {error}")]
    InvalidPayload { url: String, error: String },

    /// Every attempt allowed by the retry policy failed
    #[error("Giving up after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        last: Box<CoursefetchError>,
    },

    /// A fetch task panicked before producing a result
    #[error("Fetch task panicked: {0}")]
    TaskPanicked(String),

    /// A listing call failed; the run cannot continue without its task list
    #[error("Listing failed for {source_name}: {reason}")]
    Listing { source_name: String, reason: String },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error while loading records
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoursefetchError {
    /// Returns true if the retrying fetcher should try this request again.
    ///
    /// Transport faults, bad statuses and malformed bodies all take the same
    /// backoff path; everything else is a local problem that a retry cannot fix.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CoursefetchError::Transport(_)
                | CoursefetchError::HttpStatus { .. }
                | CoursefetchError::UnexpectedContentType { .. }
                | CoursefetchError::InvalidPayload { .. }
        )
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            CoursefetchError::Transport(_) => "transport",
            CoursefetchError::HttpStatus { .. } => "http_status",
            CoursefetchError::UnexpectedContentType { .. } => "unexpected_content_type",
            CoursefetchError::InvalidPayload { .. } => "invalid_payload",
            CoursefetchError::ExhaustedRetries { .. } => "exhausted_retries",
            CoursefetchError::TaskPanicked(_) => "task_panicked",
            CoursefetchError::Listing { .. } => "listing",
            CoursefetchError::InvalidConfig(_) => "invalid_config",
            CoursefetchError::Serialization(_) => "serialization",
            CoursefetchError::Csv(_) => "csv",
            CoursefetchError::Io(_) => "io",
            #[cfg(feature = "postgres")]
            CoursefetchError::Database(_) => "database",
            CoursefetchError::Other(_) => "other",
        }
    }
}

impl From<reqwest::Error> for CoursefetchError {
    fn from(error: reqwest::Error) -> Self {
        CoursefetchError::Transport(error.to_string())
    }
}

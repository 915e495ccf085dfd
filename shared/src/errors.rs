/// Error types shared across the Tubeproxy crates.
use thiserror::Error;

/// Failure while resolving a video URL or fetching one of its streams.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid video URL: {0}")]
    InvalidUrl(String),

    #[error("Video unavailable: {0}")]
    Unavailable(String),

    #[error("Resolver timed out after {0}s")]
    Timeout(u64),

    #[error("Unexpected resolver output: {0}")]
    Malformed(String),

    #[error("No stream with itag {0}")]
    UnknownStream(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("yt-dlp executable not found")]
    ToolMissing,

    #[error("Failed to run yt-dlp: {0}")]
    Spawn(String),
}

impl ResolveError {
    /// Whether the fault lies in the service environment rather than the request.
    ///
    /// A missing or unrunnable yt-dlp binary is a deployment problem and must
    /// never be reported back as bad user input.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ResolveError::ToolMissing | ResolveError::Spawn(_))
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(e: serde_json::Error) -> Self {
        ResolveError::Malformed(e.to_string())
    }
}

/// Result type alias for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

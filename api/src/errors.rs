/// HTTP error mapping for the API handlers.
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use tubeproxy_shared::errors::ResolveError;

/// Error response body.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A required parameter is missing or empty.
    #[error("{0}")]
    InvalidInput(String),

    /// The metadata lookup failed for reasons tied to the request.
    #[error("Invalid URL or video is not accessible: {0}")]
    ResolutionFailure(ResolveError),

    /// Resolving, opening or relaying a download failed.
    #[error("Download failed: {0}")]
    TransferFailure(ResolveError),

    /// The resolver itself cannot run.
    #[error("Resolver unavailable: {0}")]
    Internal(ResolveError),
}

impl ApiError {
    /// Map a failure of the metadata lookup.
    pub fn resolution(e: ResolveError) -> Self {
        if e.is_infrastructure() {
            ApiError::Internal(e)
        } else {
            ApiError::ResolutionFailure(e)
        }
    }

    /// Map a failure of the download path.
    pub fn transfer(e: ResolveError) -> Self {
        if e.is_infrastructure() {
            ApiError::Internal(e)
        } else {
            ApiError::TransferFailure(e)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::ResolutionFailure(_) => StatusCode::BAD_REQUEST,
            ApiError::TransferFailure(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn log(&self) {
        match self {
            ApiError::InvalidInput(m) => debug!("Rejected request: {}", m),
            ApiError::ResolutionFailure(e) | ApiError::TransferFailure(e) => warn!("{}", e),
            ApiError::Internal(e) => error!("Resolver failure: {}", e),
        }
    }
}

/// JSON `{"error": ...}` rendering, used by the metadata endpoint.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        (
            self.status(),
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Plaintext rendering of an [`ApiError`], used by the download endpoint.
#[derive(Debug)]
pub struct PlainError(pub ApiError);

impl From<ApiError> for PlainError {
    fn from(e: ApiError) -> Self {
        PlainError(e)
    }
}

impl IntoResponse for PlainError {
    fn into_response(self) -> Response {
        self.0.log();
        (
            self.0.status(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.0.to_string(),
        )
            .into_response()
    }
}

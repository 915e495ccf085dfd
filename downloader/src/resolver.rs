/// The seam between the HTTP layer and whatever extracts stream metadata.
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use tubeproxy_shared::errors::{ResolveError, ResolveResult};
use tubeproxy_shared::models::{ResolvedVideo, StreamDescriptor};

/// Upstream body, yielded chunk by chunk.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// An opened stream ready to be relayed.
pub struct StreamBody {
    /// Exact byte length, when the upstream declared one.
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

impl std::fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Resolves a video URL into stream variants and opens them for reading.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short name used in logs.
    fn id(&self) -> &'static str;

    /// Fetch title, thumbnail and all stream variants for `url`.
    async fn resolve(&self, url: &str) -> ResolveResult<ResolvedVideo>;

    /// Open one stream for reading.
    async fn open(&self, stream: &StreamDescriptor) -> ResolveResult<StreamBody>;
}

/// Reject anything that is not an absolute http(s) URL with a host.
pub fn validate_url(url: &str) -> ResolveResult<reqwest::Url> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|e| ResolveError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(ResolveError::InvalidUrl(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_accepts_http() {
        assert!(validate_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_ok());
        assert!(validate_url("  http://youtu.be/dQw4w9WgXcQ ").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_garbage() {
        assert!(matches!(validate_url("not a url"), Err(ResolveError::InvalidUrl(_))));
        assert!(matches!(validate_url("file:///etc/passwd"), Err(ResolveError::InvalidUrl(_))));
        assert!(matches!(validate_url("ftp://example.com/a"), Err(ResolveError::InvalidUrl(_))));
    }
}

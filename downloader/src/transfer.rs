/// Upstream fetch and bounded-chunk relay.
use futures::{StreamExt, TryStreamExt};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{debug, warn};

use tubeproxy_shared::errors::{ResolveError, ResolveResult};
use tubeproxy_shared::models::StreamDescriptor;

use crate::resolver::{ByteStream, StreamBody};

/// Smallest chunk size the relay accepts.
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Default relay chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// HTTP client for direct stream URLs.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// GET the stream URL with the headers the resolver asked for.
    ///
    /// Non-success statuses are reported as network errors; the body is not
    /// read until the returned stream is polled.
    pub async fn open(&self, stream: &StreamDescriptor) -> ResolveResult<StreamBody> {
        let mut request = self.client.get(&stream.url);
        for (name, value) in &stream.http_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Upstream returned {} for itag {}", status, stream.tag);
            return Err(ResolveError::Network(format!("Upstream returned {}", status)));
        }

        let content_length = response.content_length();
        debug!("Opened itag {} (length: {:?})", stream.tag, content_length);

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            .boxed();

        Ok(StreamBody {
            content_length,
            stream: body,
        })
    }
}

/// Re-chunk a byte stream so that no chunk exceeds `chunk_size` bytes.
///
/// At most one chunk is held in memory at a time.
pub fn bounded_chunks(stream: ByteStream, chunk_size: usize) -> ByteStream {
    let capacity = chunk_size.max(MIN_CHUNK_SIZE);
    ReaderStream::with_capacity(StreamReader::new(stream), capacity).boxed()
}

/// Transfer progress tracking and the per-download event channels.
///
/// A download started with a progress id publishes [`ProgressEvent`]s into a
/// broadcast channel kept in [`ProgressHub`]; the SSE endpoint subscribes to
/// the same id. Entries only live while a publisher or subscriber holds them.
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::resolver::ByteStream;

/// Events buffered per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Without a known total, report every this many bytes.
const UNKNOWN_TOTAL_STEP: u64 = 1024 * 1024;

// ====== EVENTS ======

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Error,
}

/// One progress update as sent to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    /// Percentage rounded to two decimals; `None` when the total is unknown.
    pub progress: Option<f64>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Whether no further events follow this one.
    pub fn is_final(&self) -> bool {
        self.status != ProgressStatus::Downloading
    }
}

/// `downloaded / total * 100`, rounded to two decimals.
pub fn percentage(downloaded: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let pct = downloaded as f64 / total as f64 * 100.0;
    Some((pct * 100.0).round() / 100.0)
}

// ====== TRACKER ======

/// Byte counter for one transfer.
#[derive(Debug)]
pub struct ProgressTracker {
    label: String,
    total: Option<u64>,
    downloaded: u64,
    last_step: Option<u64>,
}

impl ProgressTracker {
    pub fn new(label: impl Into<String>, total: Option<u64>) -> Self {
        Self {
            label: label.into(),
            total,
            downloaded: 0,
            last_step: None,
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Account for `bytes` more bytes. Returns an event when the whole
    /// percentage (or, without a total, the MiB count) has moved.
    pub fn advance(&mut self, bytes: u64) -> Option<ProgressEvent> {
        self.downloaded += bytes;
        let step = match self.total {
            Some(total) if total > 0 => self.downloaded.saturating_mul(100) / total,
            _ => self.downloaded / UNKNOWN_TOTAL_STEP,
        };
        if self.last_step == Some(step) {
            return None;
        }
        self.last_step = Some(step);
        let event = self.event(ProgressStatus::Downloading, None);
        debug!("{}: {:?}% ({} bytes)", self.label, event.progress, self.downloaded);
        Some(event)
    }

    pub fn finish(&self) -> ProgressEvent {
        info!("{}: transfer complete, {} bytes", self.label, self.downloaded);
        self.event(ProgressStatus::Finished, None)
    }

    pub fn fail(&self, message: impl Into<String>) -> ProgressEvent {
        let message = message.into();
        warn!("{}: transfer failed after {} bytes: {}", self.label, self.downloaded, message);
        self.event(ProgressStatus::Error, Some(message))
    }

    fn event(&self, status: ProgressStatus, error: Option<String>) -> ProgressEvent {
        ProgressEvent {
            status,
            progress: self.total.and_then(|t| percentage(self.downloaded, t)),
            downloaded_bytes: self.downloaded,
            total_bytes: self.total,
            error,
        }
    }
}

/// Wrap a byte stream so every chunk is counted and reported.
///
/// The final event is `finished` when the inner stream ends and `error` when
/// it yields an error or is dropped before either (client disconnect).
/// Dropping the returned stream drops the inner one.
pub fn track_progress(
    inner: ByteStream,
    tracker: ProgressTracker,
    publisher: Option<ProgressPublisher>,
) -> ByteStream {
    let transfer = TrackedTransfer {
        inner,
        tracker,
        publisher,
        done: false,
    };
    futures::stream::unfold(transfer, |mut transfer| async move {
        let item = transfer.next_chunk().await?;
        Some((item, transfer))
    })
    .boxed()
}

struct TrackedTransfer {
    inner: ByteStream,
    tracker: ProgressTracker,
    publisher: Option<ProgressPublisher>,
    done: bool,
}

impl TrackedTransfer {
    async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        if self.done {
            return None;
        }
        match self.inner.next().await {
            Some(Ok(chunk)) => {
                if let Some(event) = self.tracker.advance(chunk.len() as u64) {
                    self.publish(event);
                }
                Some(Ok(chunk))
            }
            Some(Err(e)) => {
                self.done = true;
                self.publish(self.tracker.fail(e.to_string()));
                Some(Err(e))
            }
            None => {
                self.done = true;
                self.publish(self.tracker.finish());
                None
            }
        }
    }

    fn publish(&self, event: ProgressEvent) {
        if let Some(p) = &self.publisher {
            p.publish(event);
        }
    }
}

impl Drop for TrackedTransfer {
    fn drop(&mut self) {
        if !self.done {
            self.publish(self.tracker.fail("client disconnected"));
        }
    }
}

// ====== HUB ======

struct Channel {
    tx: broadcast::Sender<ProgressEvent>,
    publishers: usize,
}

/// Registry of progress channels keyed by client-chosen id.
#[derive(Clone, Default)]
pub struct ProgressHub {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry<'a>(map: &'a mut HashMap<String, Channel>, id: &str) -> &'a mut Channel {
        map.entry(id.to_string()).or_insert_with(|| Channel {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
            publishers: 0,
        })
    }

    /// Register a download publishing under `id`.
    pub fn publisher(&self, id: &str) -> ProgressPublisher {
        let mut map = self.lock();
        let channel = Self::entry(&mut map, id);
        channel.publishers += 1;
        ProgressPublisher {
            tx: channel.tx.clone(),
            id: id.to_string(),
            hub: self.clone(),
        }
    }

    /// Listen for events published under `id`.
    pub fn subscribe(&self, id: &str) -> ProgressSubscription {
        let mut map = self.lock();
        let rx = Self::entry(&mut map, id).tx.subscribe();
        ProgressSubscription {
            rx,
            id: id.to_string(),
            hub: self.clone(),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release_publisher(&self, id: &str) {
        let mut map = self.lock();
        let remove = match map.get_mut(id) {
            Some(channel) => {
                channel.publishers = channel.publishers.saturating_sub(1);
                channel.publishers == 0
            }
            None => false,
        };
        if remove {
            map.remove(id);
            debug!("Progress channel {} closed", id);
        }
    }

    fn release_subscriber(&self, id: &str) {
        let mut map = self.lock();
        // The departing receiver is still alive here, hence `<= 1`.
        let remove = matches!(
            map.get(id),
            Some(channel) if channel.publishers == 0 && channel.tx.receiver_count() <= 1
        );
        if remove {
            map.remove(id);
        }
    }
}

/// Publishing half held by a running download.
pub struct ProgressPublisher {
    tx: broadcast::Sender<ProgressEvent>,
    id: String,
    hub: ProgressHub,
}

impl ProgressPublisher {
    pub fn publish(&self, event: ProgressEvent) {
        // No subscribers is fine; the event is simply dropped.
        let _ = self.tx.send(event);
    }
}

impl Drop for ProgressPublisher {
    fn drop(&mut self) {
        self.hub.release_publisher(&self.id);
    }
}

/// Receiving half held by an SSE connection.
pub struct ProgressSubscription {
    rx: broadcast::Receiver<ProgressEvent>,
    id: String,
    hub: ProgressHub,
}

impl ProgressSubscription {
    /// Next event, or `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Progress subscriber {} skipped {} events", self.id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ProgressSubscription {
    fn drop(&mut self) {
        self.hub.release_subscriber(&self.id);
    }
}

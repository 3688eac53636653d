use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

use crate::blob::BlobStore;
use crate::metadata::{MetaStore, PendingOp};

pub const TICK_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_CONCURRENT_PER_QUEUE: i64 = 5;

/// Files at or above this size go to the large queue so that bulk
/// transfers cannot head-of-line block small ones.
pub const SIZE_THRESHOLD: i64 = 1 << 20;

const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://googledrive.com/host";

/// Polls the metadata store for entries flagged for download and fetches
/// their content into the blob cache. Two size-class queues tick
/// independently, each under its own mutex held only across the short
/// scheduling window of a tick; workers run unlocked.
#[derive(Clone)]
pub struct Downloader {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    meta: Arc<MetaStore>,
    blobs: Arc<BlobStore>,
    small_lock: Arc<Mutex<()>>,
    large_lock: Arc<Mutex<()>>,
}

impl Downloader {
    pub fn new(
        token: impl Into<String>,
        meta: Arc<MetaStore>,
        blobs: Arc<BlobStore>,
    ) -> Result<Self, url::ParseError> {
        Self::with_base_url(DEFAULT_DOWNLOAD_BASE_URL, token, meta, blobs)
    }

    pub fn with_base_url(
        base_url: &str,
        token: impl Into<String>,
        meta: Arc<MetaStore>,
        blobs: Arc<BlobStore>,
    ) -> Result<Self, url::ParseError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(&normalized)?,
            token: token.into(),
            meta,
            blobs,
            small_lock: Arc::new(Mutex::new(())),
            large_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Spawns the two queue loops; they run until aborted.
    pub fn start(&self) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let small = self.clone();
        let small_handle = tokio::spawn(async move {
            loop {
                small.tick_small().await;
                tokio::time::sleep(TICK_INTERVAL).await;
            }
        });
        let large = self.clone();
        let large_handle = tokio::spawn(async move {
            loop {
                large.tick_large().await;
                tokio::time::sleep(TICK_INTERVAL).await;
            }
        });
        (small_handle, large_handle)
    }

    pub async fn tick_small(&self) {
        let _guard = self.small_lock.lock().await;
        self.tick(0, SIZE_THRESHOLD).await;
    }

    pub async fn tick_large(&self) {
        let _guard = self.large_lock.lock().await;
        self.tick(SIZE_THRESHOLD, i64::MAX).await;
    }

    async fn tick(&self, min_size: i64, max_size: i64) {
        let downloads = match self
            .meta
            .list_downloads(MAX_CONCURRENT_PER_QUEUE, min_size, max_size)
            .await
        {
            Ok(downloads) => downloads,
            Err(err) => {
                warn!(error = %err, "listing pending downloads failed");
                return;
            }
        };
        if downloads.is_empty() {
            return;
        }

        // One buffered slot per worker, so workers finishing after the
        // tick has moved on never block on the send.
        let (done_tx, mut done_rx) = mpsc::channel::<()>(downloads.len());
        for entry in downloads {
            let worker = self.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                worker
                    .download(entry.local_id, &entry.remote_id, &entry.checksum)
                    .await;
                let _ = done.send(()).await;
            });
        }
        drop(done_tx);

        // Deliberate load shedding: the tick releases its queue as soon as
        // the first worker reports; the next tick picks up the rest.
        let _ = done_rx.recv().await;
    }

    async fn download(&self, local_id: i64, remote_id: &str, checksum: &str) {
        debug!(remote_id, checksum, "downloading");
        let url = match self.base_url.join(remote_id) {
            Ok(url) => url,
            Err(err) => {
                warn!(remote_id, error = %err, "invalid download url");
                return;
            }
        };
        let response = match self.http.get(url).bearer_auth(&self.token).send().await {
            Ok(response) => response,
            Err(err) => {
                // Left flagged; the next tick retries.
                warn!(remote_id, error = %err, "download request failed");
                return;
            }
        };

        if response.status() == StatusCode::NOT_FOUND {
            // Terminal for this entry: clear the flag so it cannot poison
            // the queue. A later remote change re-enqueues it.
            warn!(remote_id, "remote content not found, abandoning download");
            if let Err(err) = self.meta.set_op(local_id, PendingOp::None).await {
                warn!(remote_id, error = %err, "clearing download flag failed");
            }
            return;
        }
        if !response.status().is_success() {
            warn!(remote_id, status = %response.status(), "download rejected");
            return;
        }

        if let Err(err) = self
            .blobs
            .save(remote_id, checksum, response.bytes_stream())
            .await
        {
            warn!(remote_id, error = %err, "writing blob failed");
            return;
        }
        if let Err(err) = self.meta.set_op(local_id, PendingOp::None).await {
            warn!(remote_id, error = %err, "clearing download flag failed");
            return;
        }
        info!(remote_id, checksum, "download complete");
    }
}

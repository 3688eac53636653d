use std::io::SeekFrom;
use std::path::PathBuf;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob is not cached locally")]
    NotCached,
    #[error("download stream failed: {0}")]
    Stream(#[from] reqwest::Error),
}

/// Content-addressed cache of downloaded file bodies.
///
/// A blob lives at `{root}/{shard}/{id}=={checksum}` where the shard is the
/// first character of the id, bounding entries per directory on the host
/// filesystem. Several checksums for one id may transiently coexist; stale
/// siblings are collected on the next `save` for that id.
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic path for `(id, checksum)`.
    pub fn path_for(&self, id: &str, checksum: &str) -> PathBuf {
        self.shard_dir(id).join(blob_name(id, checksum))
    }

    /// Streams a download body into the blob for `(id, checksum)`. Stale
    /// blobs for the same id are removed first. A mid-stream failure
    /// leaves the partial file in place; the next save for this id cleans
    /// it up.
    pub async fn save<S, E>(&self, id: &str, checksum: &str, mut body: S) -> Result<(), BlobError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        BlobError: From<E>,
    {
        self.cleanup(id, Some(checksum)).await;
        tokio::fs::create_dir_all(self.shard_dir(id)).await?;
        let mut file = tokio::fs::File::create(self.path_for(id, checksum)).await?;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Reads up to `length` bytes at `offset`. Fails with
    /// [`BlobError::NotCached`] when the blob file is absent; short reads
    /// near EOF return fewer bytes.
    pub async fn read(
        &self,
        id: &str,
        checksum: &str,
        offset: i64,
        length: usize,
    ) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(id, checksum);
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::NotCached);
            }
            Err(err) => return Err(err.into()),
        };
        file.seek(SeekFrom::Start(offset.max(0) as u64)).await?;

        let mut buf = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Removes every cached blob for `id`, regardless of checksum.
    pub async fn delete(&self, id: &str) -> Result<(), BlobError> {
        self.cleanup(id, None).await;
        Ok(())
    }

    /// Best-effort removal of blobs for `id` other than `keep_checksum`.
    /// Failures only cost disk space until the next attempt.
    async fn cleanup(&self, id: &str, keep_checksum: Option<&str>) {
        let Ok(mut dir) = tokio::fs::read_dir(self.shard_dir(id)).await else {
            return;
        };
        let prefix = blob_name(id, "");
        let keep = keep_checksum.map(|checksum| blob_name(id, checksum));
        while let Ok(Some(dirent)) = dir.next_entry().await {
            let name = dirent.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(&prefix) || keep.as_deref() == Some(name) {
                continue;
            }
            debug!(blob = name, "removing stale blob");
            let _ = tokio::fs::remove_file(dirent.path()).await;
        }
    }

    fn shard_dir(&self, id: &str) -> PathBuf {
        let shard = id.chars().next().unwrap_or('_');
        self.root.join(shard.to_string())
    }
}

fn blob_name(id: &str, checksum: &str) -> String {
    format!("{id}=={checksum}")
}

use std::sync::Arc;
use std::time::Duration;

use gdrive_core::{Change, ChangeListQuery, DriveClient, DriveError, DriveFile, FOLDER_MIME, ROOT_ID};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::metadata::{MetaStore, RemoteSnapshot};

pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Inbound replication: periodically walks the remote change feed from the
/// last persisted change id and merges each change into the metadata
/// store. Rounds are serialized by an internal mutex; the download
/// scheduler is coordinated with only transitively, through entry ops.
pub struct SyncEngine {
    client: DriveClient,
    meta: Arc<MetaStore>,
    round_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(client: DriveClient, meta: Arc<MetaStore>) -> Self {
        Self {
            client,
            meta,
            round_lock: Mutex::new(()),
        }
    }

    /// Spawns the periodic sync loop. A failed round is logged and retried
    /// on the next interval; the loop never dies on its own.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(err) = engine.sync(false).await {
                    warn!(error = %err, "sync round failed");
                }
                tokio::time::sleep(SYNC_INTERVAL).await;
            }
        })
    }

    /// Runs one inbound round. `force` restarts the feed from the
    /// beginning instead of the persisted cursor. Returns fatal transport
    /// errors only; storage failures are logged and the round continues.
    pub async fn sync(&self, force: bool) -> Result<(), DriveError> {
        let _guard = self.round_lock.lock().await;
        debug!(force, "sync round started");
        self.sync_inbound(force).await?;
        debug!("sync round done");
        Ok(())
    }

    async fn sync_inbound(&self, force: bool) -> Result<(), DriveError> {
        let stored = match self.meta.get_largest_change_id().await {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "reading change cursor failed, restarting feed");
                0
            }
        };
        // First-ever sync skips historical tombstones; a forced resync of
        // an existing database must still see them.
        let initial = stored == 0;
        let start_change_id = if force || stored == 0 { 0 } else { stored + 1 };

        // Upserting the root first guarantees it exists before any child
        // change references it.
        let root = self.client.get_file(ROOT_ID).await?;
        if let Err(err) = self
            .meta
            .remote_upsert(ROOT_ID, "", &snapshot_from(&root))
            .await
        {
            warn!(error = %err, "caching root metadata failed");
        }

        let mut page_token = String::new();
        loop {
            let page = self
                .client
                .list_changes(&ChangeListQuery {
                    page_token: page_token.clone(),
                    start_change_id,
                    include_deleted: !initial,
                })
                .await?;

            let mut max_change_id = 0;
            for change in &page.items {
                self.merge_change(&root.id, change).await;
                max_change_id = max_change_id.max(change.id);
            }
            if max_change_id > 0 {
                if let Err(err) = self.meta.save_largest_change_id(max_change_id).await {
                    warn!(error = %err, "persisting change cursor failed");
                }
            }

            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }
        Ok(())
    }

    /// Merges one change in feed order. Storage failures are logged, not
    /// propagated: the entry will be observed again on a later round.
    async fn merge_change(&self, root_remote_id: &str, change: &Change) {
        let trashed = change.file.as_ref().is_some_and(|file| file.labels.trashed);
        if change.deleted || trashed {
            // Tombstones of directories do not cascade; children stay
            // orphaned until the feed emits their own deletions.
            if let Err(err) = self.meta.remote_tombstone(&change.file_id).await {
                warn!(file_id = %change.file_id, error = %err, "tombstoning entry failed");
            }
            return;
        }

        let Some(file) = &change.file else {
            return;
        };
        if file.download_url.is_empty() && file.mime_type != FOLDER_MIME {
            // Native docs and similar have no content to fetch.
            debug!(file_id = %change.file_id, "skipping un-downloadable file");
            return;
        }

        let mut parent_remote_id = file
            .parents
            .first()
            .map(|parent| parent.id.clone())
            .unwrap_or_default();
        if parent_remote_id == root_remote_id {
            parent_remote_id = ROOT_ID.to_string();
        }

        if let Err(err) = self
            .meta
            .remote_upsert(&change.file_id, &parent_remote_id, &snapshot_from(file))
            .await
        {
            warn!(file_id = %change.file_id, error = %err, "caching entry metadata failed");
        }
    }
}

fn snapshot_from(file: &DriveFile) -> RemoteSnapshot {
    let is_dir = file.mime_type == FOLDER_MIME;
    RemoteSnapshot {
        name: file.title.clone(),
        is_dir,
        file_size: if is_dir { 0 } else { file.file_size },
        checksum: if is_dir {
            String::new()
        } else {
            file.md5_checksum.clone()
        },
        etag: file.etag.clone(),
        last_mod: parse_modified(&file.modified_date),
    }
}

fn parse_modified(value: &str) -> i64 {
    if value.is_empty() {
        return 0;
    }
    OffsetDateTime::parse(value, &Rfc3339)
        .map(|parsed| parsed.unix_timestamp())
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

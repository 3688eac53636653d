use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;

/// Key under which the sync engine persists its change-feed cursor.
const KEY_LARGEST_CHANGE_ID: &str = "largest-change-id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pending op: {0}")]
    InvalidOp(String),
    #[error("entry not found after insert")]
    MissingEntry,
}

/// Pending background work attached to an entry. `Delete` doubles as the
/// tombstone marker: tombstoned entries stay in the table but are hidden
/// from directory listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingOp {
    #[default]
    None,
    Download,
    Upload,
    Delete,
}

impl PendingOp {
    fn as_str(&self) -> &'static str {
        match self {
            PendingOp::None => "none",
            PendingOp::Download => "download",
            PendingOp::Upload => "upload",
            PendingOp::Delete => "delete",
        }
    }

    fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "none" => Ok(PendingOp::None),
            "download" => Ok(PendingOp::Download),
            "upload" => Ok(PendingOp::Upload),
            "delete" => Ok(PendingOp::Delete),
            other => Err(StoreError::InvalidOp(other.to_string())),
        }
    }
}

/// One row of the `files` table: a single remote file or folder mirrored
/// locally. `local_id` is assigned on first insert and is the stable key
/// parents are linked through; `remote_id` is the opaque Drive id, empty
/// for locally-created entries that were never uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub local_id: i64,
    pub remote_id: String,
    pub local_parent_id: i64,
    pub name: String,
    pub is_dir: bool,
    pub file_size: i64,
    pub checksum: String,
    pub etag: String,
    /// Remote modification time as Unix seconds; 0 when unknown.
    pub last_mod: i64,
    pub op: PendingOp,
}

/// Snapshot of remote metadata applied by [`MetaStore::remote_upsert`].
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    pub name: String,
    pub is_dir: bool,
    pub file_size: i64,
    pub checksum: String,
    pub etag: String,
    pub last_mod: i64,
}

/// Durable index of the mirrored tree, backed by SQLite (`meta.sql`).
///
/// A single coarse read/write lock serializes access: writers take the
/// exclusive guard, readers the shared one. Adequate at the scale of one
/// account's Drive; sharding by `local_id` would fit behind the same
/// contract if contention ever warrants it.
pub struct MetaStore {
    pool: SqlitePool,
    lock: RwLock<()>,
}

include!("store_impl.rs");

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

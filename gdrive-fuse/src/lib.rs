use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use gdrive_core::ROOT_ID;
use gdrived::blob::{BlobError, BlobStore};
use gdrived::metadata::{FileEntry, MetaStore, StoreError};

/// Names macOS tooling probes for on every directory; answered NOT_FOUND
/// without touching the metadata store.
pub const IGNORED_NAMES: [&str; 5] = [
    "._.",
    ".hidden",
    ".DS_Store",
    "mach_kernel",
    "Backups.backupdb",
];

pub fn is_ignored_name(name: &str) -> bool {
    IGNORED_NAMES.contains(&name)
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("metadata error: {0}")]
    Store(#[from] StoreError),
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("no synced root entry; run a sync round first")]
    RootMissing,
}

/// Directory or file wrapper around an entry; the only capability the two
/// share is `attr`-style metadata, so a two-variant dispatch on `is_dir`
/// is all the polymorphism needed.
#[derive(Debug, Clone)]
pub enum Node {
    Dir(FileEntry),
    File(FileEntry),
}

impl Node {
    fn from_entry(entry: FileEntry) -> Self {
        if entry.is_dir {
            Node::Dir(entry)
        } else {
            Node::File(entry)
        }
    }

    pub fn entry(&self) -> &FileEntry {
        match self {
            Node::Dir(entry) | Node::File(entry) => entry,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }
}

/// Read-only view of the mirrored tree: lookups and listings come from the
/// metadata store, file contents from the blob cache.
pub struct TreeView {
    meta: Arc<MetaStore>,
    blobs: Arc<BlobStore>,
    root: FileEntry,
}

impl TreeView {
    /// Resolves the synthetic root once per mount.
    pub async fn open(meta: Arc<MetaStore>, blobs: Arc<BlobStore>) -> Result<Self, AdapterError> {
        let root = meta
            .entry_by_remote_id(ROOT_ID)
            .await?
            .ok_or(AdapterError::RootMissing)?;
        Ok(Self { meta, blobs, root })
    }

    pub fn root(&self) -> Node {
        Node::Dir(self.root.clone())
    }

    pub async fn lookup(
        &self,
        parent_local_id: i64,
        name: &str,
    ) -> Result<Option<Node>, AdapterError> {
        if is_ignored_name(name) {
            return Ok(None);
        }
        Ok(self
            .meta
            .child_by_name(parent_local_id, name)
            .await?
            .map(Node::from_entry))
    }

    pub async fn readdir(&self, parent_local_id: i64) -> Result<Vec<FileEntry>, AdapterError> {
        Ok(self.meta.children(parent_local_id).await?)
    }

    pub async fn node_by_local_id(&self, local_id: i64) -> Result<Option<Node>, AdapterError> {
        if local_id == self.root.local_id {
            return Ok(Some(self.root()));
        }
        Ok(self
            .meta
            .entry_by_local_id(local_id)
            .await?
            .map(Node::from_entry))
    }

    /// Reads file content from the blob cache. An uncached blob yields
    /// empty bytes, not an error, so the file appears empty until the
    /// download scheduler fills the cache.
    pub async fn read(
        &self,
        entry: &FileEntry,
        offset: i64,
        length: usize,
    ) -> Result<Vec<u8>, AdapterError> {
        match self
            .blobs
            .read(&entry.remote_id, &entry.checksum, offset, length)
            .await
        {
            Ok(bytes) => Ok(bytes),
            Err(BlobError::NotCached) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Arguments of the mount binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountArgs {
    pub mountpoint: Option<PathBuf>,
    pub data_path: Option<String>,
    pub block_sync: bool,
    pub help: bool,
}

pub fn parse_mount_args<I>(args: I) -> anyhow::Result<MountArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = MountArgs::default();
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mount" => {
                parsed.mountpoint = Some(PathBuf::from(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--mount requires a value"))?,
                ));
            }
            "--datapath" => {
                parsed.data_path = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--datapath requires a value"))?,
                );
            }
            "--blocksync" => parsed.block_sync = true,
            "--help" | "-h" => parsed.help = true,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use gdrive_core::DriveClient;
use tracing::info;

use crate::auth;
use crate::blob::BlobStore;
use crate::config::{self, Config};
use crate::metadata::MetaStore;
use crate::sync::{Downloader, SyncEngine};

/// Wires the configured account to a metadata store, blob cache, sync
/// engine and download scheduler, and owns their background loops.
pub struct DaemonRuntime {
    config: Config,
    meta: Arc<MetaStore>,
    blobs: Arc<BlobStore>,
    engine: Arc<SyncEngine>,
    downloader: Downloader,
}

impl DaemonRuntime {
    pub async fn bootstrap(data_dir: PathBuf) -> anyhow::Result<Self> {
        let config = Config::load(&data_dir)
            .with_context(|| format!("failed to load config from {}", data_dir.display()))?;
        config.setup().context("failed to prepare data directory")?;

        let meta = Arc::new(
            MetaStore::open(&config.metadata_path())
                .await
                .context("failed to open metadata store")?,
        );
        let blobs = Arc::new(BlobStore::new(config.blob_path()));

        let token = auth::resolve_access_token(config.first_account())
            .await
            .context("failed to resolve access token")?;
        let client = DriveClient::new(token.clone())?;
        let engine = Arc::new(SyncEngine::new(client, Arc::clone(&meta)));
        let downloader = Downloader::new(token, Arc::clone(&meta), Arc::clone(&blobs))?;

        Ok(Self {
            config,
            meta,
            blobs,
            engine,
            downloader,
        })
    }

    pub fn meta(&self) -> Arc<MetaStore> {
        Arc::clone(&self.meta)
    }

    pub fn blobs(&self) -> Arc<BlobStore> {
        Arc::clone(&self.blobs)
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    /// Runs one blocking sync round before anything else is started.
    pub async fn sync_once(&self, force: bool) -> anyhow::Result<()> {
        self.engine.sync(force).await.context("sync round failed")
    }

    /// Spawns the sync loop and both download-queue loops.
    pub fn start_background(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let sync_handle = self.engine.start();
        let (small_handle, large_handle) = self.downloader.start();
        vec![sync_handle, small_handle, large_handle]
    }

    /// Headless operation: sync + download loops until interrupted.
    pub async fn run(self, block_sync: bool) -> anyhow::Result<()> {
        if block_sync {
            self.sync_once(true).await?;
        }
        let handles = self.start_background();
        info!(
            data_dir = %self.config.data_dir().display(),
            mountpoint = %self.config.first_account().local_path,
            "gdrived started"
        );

        tokio::signal::ctrl_c()
            .await
            .context("failed waiting for shutdown signal")?;
        for handle in handles {
            handle.abort();
        }
        Ok(())
    }
}

/// Explicit `--datapath` wins; otherwise `~/.gdrived`.
pub fn resolve_data_dir(flag: Option<String>) -> anyhow::Result<PathBuf> {
    match flag {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config::default_data_dir()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_datapath_overrides_default() {
        let dir = resolve_data_dir(Some("/srv/gdrive-data".into())).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/gdrive-data"));
    }
}

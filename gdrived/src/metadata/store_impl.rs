const ENTRY_COLUMNS: &str =
    "local_id, remote_id, local_parent_id, name, is_dir, file_size, checksum, etag, last_mod, op";

impl MetaStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            lock: RwLock::new(()),
        }
    }

    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self::from_pool(pool);
        store.init().await?;
        Ok(store)
    }

    /// Creates tables and indexes if missing. Idempotent across runs.
    pub async fn init(&self) -> Result<(), StoreError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS files (
                local_id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
                local_parent_id INTEGER NOT NULL DEFAULT 0,
                remote_id TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL,
                is_dir INTEGER NOT NULL DEFAULT 0,
                file_size INTEGER NOT NULL DEFAULT 0,
                checksum TEXT NOT NULL DEFAULT '',
                etag TEXT NOT NULL DEFAULT '',
                last_mod INTEGER NOT NULL DEFAULT 0,
                op TEXT NOT NULL DEFAULT 'none'
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_files_remote
                ON files (remote_id) WHERE remote_id != ''",
            "CREATE INDEX IF NOT EXISTS idx_files_parent_name
                ON files (local_parent_id, name)",
            "CREATE TABLE IF NOT EXISTS info (
                key TEXT NOT NULL PRIMARY KEY,
                value TEXT NOT NULL
            )",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Applies a remote metadata snapshot, inserting a fresh row when the
    /// remote id is unseen. A checksum change on a non-folder flags the
    /// entry for download; re-applying an identical snapshot leaves `op`
    /// untouched.
    pub async fn remote_upsert(
        &self,
        remote_id: &str,
        parent_remote_id: &str,
        data: &RemoteSnapshot,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;

        let local_parent_id = if parent_remote_id.is_empty() {
            0
        } else {
            self.fetch_by_remote_id(parent_remote_id)
                .await?
                .map(|entry| entry.local_id)
                .unwrap_or(0)
        };

        // Folders never carry content.
        let (file_size, checksum) = if data.is_dir {
            (0, "")
        } else {
            (data.file_size, data.checksum.as_str())
        };

        match self.fetch_by_remote_id(remote_id).await? {
            Some(existing) => {
                let op = if !data.is_dir && checksum != existing.checksum {
                    PendingOp::Download
                } else {
                    existing.op
                };
                sqlx::query(
                    "UPDATE files SET local_parent_id = ?1, name = ?2, is_dir = ?3,
                        file_size = ?4, checksum = ?5, etag = ?6, last_mod = ?7, op = ?8
                     WHERE local_id = ?9",
                )
                .bind(local_parent_id)
                .bind(&data.name)
                .bind(data.is_dir as i64)
                .bind(file_size)
                .bind(checksum)
                .bind(&data.etag)
                .bind(data.last_mod)
                .bind(op.as_str())
                .bind(existing.local_id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                let op = if !data.is_dir && !checksum.is_empty() {
                    PendingOp::Download
                } else {
                    PendingOp::None
                };
                sqlx::query(
                    "INSERT INTO files
                        (remote_id, local_parent_id, name, is_dir, file_size, checksum, etag, last_mod, op)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )
                .bind(remote_id)
                .bind(local_parent_id)
                .bind(&data.name)
                .bind(data.is_dir as i64)
                .bind(file_size)
                .bind(checksum)
                .bind(&data.etag)
                .bind(data.last_mod)
                .bind(op.as_str())
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// Tombstones the entry for a remotely-deleted file. No-op when the
    /// remote id was never seen.
    pub async fn remote_tombstone(&self, remote_id: &str) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        sqlx::query("UPDATE files SET op = 'delete' WHERE remote_id = ?1")
            .bind(remote_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts a locally-created entry pending upload and returns it with
    /// its assigned `local_id`.
    pub async fn local_create(
        &self,
        parent_local_id: i64,
        name: &str,
        file_size: i64,
        is_dir: bool,
    ) -> Result<FileEntry, StoreError> {
        let _guard = self.lock.write().await;
        let result = sqlx::query(
            "INSERT INTO files (remote_id, local_parent_id, name, is_dir, file_size, op)
             VALUES ('', ?1, ?2, ?3, ?4, 'upload')",
        )
        .bind(parent_local_id)
        .bind(name)
        .bind(is_dir as i64)
        .bind(if is_dir { 0 } else { file_size })
        .execute(&self.pool)
        .await?;

        self.fetch_by_local_id(result.last_insert_rowid())
            .await?
            .ok_or(StoreError::MissingEntry)
    }

    /// Updates a locally-modified entry (rename, move or resize) and flags
    /// it for upload.
    pub async fn local_modify(
        &self,
        parent_local_id: i64,
        name: &str,
        new_parent_local_id: i64,
        new_name: &str,
        new_size: i64,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        sqlx::query(
            "UPDATE files SET local_parent_id = ?1, name = ?2, file_size = ?3, op = 'upload'
             WHERE local_parent_id = ?4 AND name = ?5 AND op != 'delete'",
        )
        .bind(new_parent_local_id)
        .bind(new_name)
        .bind(new_size)
        .bind(parent_local_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Tombstones a locally-removed entry.
    pub async fn local_remove(
        &self,
        parent_local_id: i64,
        name: &str,
        is_dir: bool,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        sqlx::query(
            "UPDATE files SET op = 'delete'
             WHERE local_parent_id = ?1 AND name = ?2 AND is_dir = ?3 AND op != 'delete'",
        )
        .bind(parent_local_id)
        .bind(name)
        .bind(is_dir as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Unconditional op transition; the download scheduler uses this to
    /// clear `Download` after a successful (or abandoned) fetch.
    pub async fn set_op(&self, local_id: i64, op: PendingOp) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        sqlx::query("UPDATE files SET op = ?1 WHERE local_id = ?2")
            .bind(op.as_str())
            .bind(local_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn save_largest_change_id(&self, id: i64) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        sqlx::query(
            "INSERT INTO info (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(KEY_LARGEST_CHANGE_ID)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns 0 when no sync has ever persisted a change id.
    pub async fn get_largest_change_id(&self) -> Result<i64, StoreError> {
        let _guard = self.lock.read().await;
        let row = sqlx::query("SELECT value FROM info WHERE key = ?1")
            .bind(KEY_LARGEST_CHANGE_ID)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(0);
        };
        let value: String = row.try_get("value")?;
        Ok(value.parse::<i64>().unwrap_or(0))
    }

    /// Entries awaiting download whose size falls in `[min_size, max_size)`,
    /// oldest modification first so no entry starves.
    pub async fn list_downloads(
        &self,
        limit: i64,
        min_size: i64,
        max_size: i64,
    ) -> Result<Vec<FileEntry>, StoreError> {
        let _guard = self.lock.read().await;
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM files
             WHERE op = 'download' AND file_size >= ?1 AND file_size < ?2
             ORDER BY last_mod ASC LIMIT ?3",
        ))
        .bind(min_size)
        .bind(max_size)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    /// The non-deleted child of `parent_local_id` named `name`, if any.
    pub async fn child_by_name(
        &self,
        parent_local_id: i64,
        name: &str,
    ) -> Result<Option<FileEntry>, StoreError> {
        let _guard = self.lock.read().await;
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM files
             WHERE local_parent_id = ?1 AND name = ?2 AND op != 'delete'
             LIMIT 1",
        ))
        .bind(parent_local_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    /// All non-deleted children of a directory.
    pub async fn children(&self, parent_local_id: i64) -> Result<Vec<FileEntry>, StoreError> {
        let _guard = self.lock.read().await;
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM files
             WHERE local_parent_id = ?1 AND op != 'delete'
             ORDER BY name ASC",
        ))
        .bind(parent_local_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(entry_from_row).collect()
    }

    pub async fn entry_by_remote_id(
        &self,
        remote_id: &str,
    ) -> Result<Option<FileEntry>, StoreError> {
        let _guard = self.lock.read().await;
        self.fetch_by_remote_id(remote_id).await
    }

    pub async fn entry_by_local_id(&self, local_id: i64) -> Result<Option<FileEntry>, StoreError> {
        let _guard = self.lock.read().await;
        self.fetch_by_local_id(local_id).await
    }

    // Lock-free fetches, shared by locked wrappers and write paths that
    // already hold the exclusive guard.

    async fn fetch_by_remote_id(&self, remote_id: &str) -> Result<Option<FileEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM files WHERE remote_id = ?1 AND remote_id != ''",
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn fetch_by_local_id(&self, local_id: i64) -> Result<Option<FileEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM files WHERE local_id = ?1",
        ))
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(entry_from_row).transpose()
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FileEntry, StoreError> {
    let is_dir: i64 = row.try_get("is_dir")?;
    let op: String = row.try_get("op")?;
    Ok(FileEntry {
        local_id: row.try_get("local_id")?,
        remote_id: row.try_get("remote_id")?,
        local_parent_id: row.try_get("local_parent_id")?,
        name: row.try_get("name")?,
        is_dir: is_dir != 0,
        file_size: row.try_get("file_size")?,
        checksum: row.try_get("checksum")?,
        etag: row.try_get("etag")?,
        last_mod: row.try_get("last_mod")?,
        op: PendingOp::parse(&op)?,
    })
}

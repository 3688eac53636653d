use super::*;

async fn make_store() -> MetaStore {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = MetaStore::from_pool(pool);
    store.init().await.unwrap();
    store
}

fn folder(name: &str) -> RemoteSnapshot {
    RemoteSnapshot {
        name: name.into(),
        is_dir: true,
        etag: "\"e0\"".into(),
        last_mod: 1_700_000_000,
        ..RemoteSnapshot::default()
    }
}

fn file(name: &str, checksum: &str, size: i64) -> RemoteSnapshot {
    RemoteSnapshot {
        name: name.into(),
        is_dir: false,
        file_size: size,
        checksum: checksum.into(),
        etag: "\"e1\"".into(),
        last_mod: 1_700_000_100,
    }
}

#[tokio::test]
async fn remote_upsert_inserts_and_links_parent() {
    let store = make_store().await;
    store.remote_upsert("root", "", &folder("My Drive")).await.unwrap();
    store
        .remote_upsert("F1", "root", &file("a.txt", "abc", 5))
        .await
        .unwrap();

    let root = store.entry_by_remote_id("root").await.unwrap().unwrap();
    assert!(root.is_dir);
    assert_eq!(root.local_parent_id, 0);

    let entry = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    assert_eq!(entry.local_parent_id, root.local_id);
    assert_eq!(entry.name, "a.txt");
    assert_eq!(entry.file_size, 5);
    assert_eq!(entry.op, PendingOp::Download);
}

#[tokio::test]
async fn remote_upsert_with_unknown_parent_orphans_entry() {
    let store = make_store().await;
    store
        .remote_upsert("F1", "not-seen-yet", &file("a.txt", "abc", 5))
        .await
        .unwrap();

    let entry = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    assert_eq!(entry.local_parent_id, 0);

    // Once the parent appears and the child is re-emitted, the link heals.
    store.remote_upsert("D1", "", &folder("Docs")).await.unwrap();
    store
        .remote_upsert("F1", "D1", &file("a.txt", "abc", 5))
        .await
        .unwrap();
    let parent = store.entry_by_remote_id("D1").await.unwrap().unwrap();
    let entry = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    assert_eq!(entry.local_parent_id, parent.local_id);
}

#[tokio::test]
async fn remote_upsert_is_idempotent() {
    let store = make_store().await;
    let snapshot = file("a.txt", "abc", 5);
    store.remote_upsert("F1", "", &snapshot).await.unwrap();

    let first = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    store.set_op(first.local_id, PendingOp::None).await.unwrap();

    // Re-applying the identical snapshot must not re-flag the download.
    store.remote_upsert("F1", "", &snapshot).await.unwrap();
    let second = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    assert_eq!(second.local_id, first.local_id);
    assert_eq!(second.op, PendingOp::None);
}

#[tokio::test]
async fn checksum_change_reflags_download() {
    let store = make_store().await;
    store
        .remote_upsert("F1", "", &file("a.txt", "abc", 5))
        .await
        .unwrap();
    let entry = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    store.set_op(entry.local_id, PendingOp::None).await.unwrap();

    store
        .remote_upsert("F1", "", &file("a.txt", "def", 5))
        .await
        .unwrap();
    let entry = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    assert_eq!(entry.checksum, "def");
    assert_eq!(entry.op, PendingOp::Download);
}

#[tokio::test]
async fn folders_never_carry_content_fields() {
    let store = make_store().await;
    // A malformed snapshot claiming a checksum and size for a folder.
    let snapshot = RemoteSnapshot {
        name: "Docs".into(),
        is_dir: true,
        file_size: 999,
        checksum: "bogus".into(),
        etag: String::new(),
        last_mod: 0,
    };
    store.remote_upsert("D1", "", &snapshot).await.unwrap();

    let entry = store.entry_by_remote_id("D1").await.unwrap().unwrap();
    assert!(entry.is_dir);
    assert_eq!(entry.file_size, 0);
    assert_eq!(entry.checksum, "");
    assert_eq!(entry.op, PendingOp::None);
}

#[tokio::test]
async fn tombstone_hides_entry_from_listings() {
    let store = make_store().await;
    store.remote_upsert("root", "", &folder("My Drive")).await.unwrap();
    store
        .remote_upsert("F1", "root", &file("a.txt", "abc", 5))
        .await
        .unwrap();
    let root = store.entry_by_remote_id("root").await.unwrap().unwrap();

    store.remote_tombstone("F1").await.unwrap();

    assert!(store.children(root.local_id).await.unwrap().is_empty());
    assert!(store
        .child_by_name(root.local_id, "a.txt")
        .await
        .unwrap()
        .is_none());
    // Still present in the table, just tombstoned.
    let entry = store.entry_by_remote_id("F1").await.unwrap().unwrap();
    assert_eq!(entry.op, PendingOp::Delete);
}

#[tokio::test]
async fn tombstone_of_unknown_remote_id_is_a_noop() {
    let store = make_store().await;
    store.remote_tombstone("never-seen").await.unwrap();
    assert!(store.entry_by_remote_id("never-seen").await.unwrap().is_none());
}

#[tokio::test]
async fn local_create_assigns_id_and_flags_upload() {
    let store = make_store().await;
    store.remote_upsert("root", "", &folder("My Drive")).await.unwrap();
    let root = store.entry_by_remote_id("root").await.unwrap().unwrap();

    let created = store
        .local_create(root.local_id, "new.txt", 9, false)
        .await
        .unwrap();

    assert!(created.local_id > 0);
    assert_eq!(created.remote_id, "");
    assert_eq!(created.op, PendingOp::Upload);
    assert_eq!(created.file_size, 9);
    let listed = store.children(root.local_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "new.txt");
}

#[tokio::test]
async fn local_modify_renames_and_flags_upload() {
    let store = make_store().await;
    store.remote_upsert("root", "", &folder("My Drive")).await.unwrap();
    let root = store.entry_by_remote_id("root").await.unwrap().unwrap();
    store
        .local_create(root.local_id, "old.txt", 3, false)
        .await
        .unwrap();

    store
        .local_modify(root.local_id, "old.txt", root.local_id, "new.txt", 7)
        .await
        .unwrap();

    assert!(store
        .child_by_name(root.local_id, "old.txt")
        .await
        .unwrap()
        .is_none());
    let renamed = store
        .child_by_name(root.local_id, "new.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.file_size, 7);
    assert_eq!(renamed.op, PendingOp::Upload);
}

#[tokio::test]
async fn local_remove_tombstones_matching_entry() {
    let store = make_store().await;
    store.remote_upsert("root", "", &folder("My Drive")).await.unwrap();
    let root = store.entry_by_remote_id("root").await.unwrap().unwrap();
    store
        .local_create(root.local_id, "gone.txt", 1, false)
        .await
        .unwrap();

    store
        .local_remove(root.local_id, "gone.txt", false)
        .await
        .unwrap();

    assert!(store.children(root.local_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn name_is_reusable_after_tombstone() {
    let store = make_store().await;
    store.remote_upsert("root", "", &folder("My Drive")).await.unwrap();
    let root = store.entry_by_remote_id("root").await.unwrap().unwrap();

    store
        .remote_upsert("F1", "root", &file("a.txt", "abc", 5))
        .await
        .unwrap();
    store.remote_tombstone("F1").await.unwrap();
    store
        .remote_upsert("F2", "root", &file("a.txt", "def", 6))
        .await
        .unwrap();

    // Only the live entry is visible under the shared name.
    let visible = store
        .child_by_name(root.local_id, "a.txt")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(visible.remote_id, "F2");
    assert_eq!(store.children(root.local_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn list_downloads_respects_size_classes() {
    let store = make_store().await;
    store
        .remote_upsert("S", "", &file("small.bin", "s", 500))
        .await
        .unwrap();
    store
        .remote_upsert("L", "", &file("large.bin", "l", 10_000_000))
        .await
        .unwrap();

    let small = store.list_downloads(5, 0, 1 << 20).await.unwrap();
    assert_eq!(small.len(), 1);
    assert_eq!(small[0].remote_id, "S");
    assert!(small.iter().all(|e| e.file_size < (1 << 20)));

    let large = store.list_downloads(5, 1 << 20, i64::MAX).await.unwrap();
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].remote_id, "L");
    assert!(large.iter().all(|e| e.file_size >= (1 << 20)));
}

#[tokio::test]
async fn list_downloads_excludes_other_ops_and_honors_limit() {
    let store = make_store().await;
    for i in 0..7 {
        store
            .remote_upsert(
                &format!("F{i}"),
                "",
                &RemoteSnapshot {
                    name: format!("f{i}.bin"),
                    is_dir: false,
                    file_size: 10,
                    checksum: format!("c{i}"),
                    etag: String::new(),
                    last_mod: 1_700_000_000 + i,
                },
            )
            .await
            .unwrap();
    }
    let done = store.entry_by_remote_id("F0").await.unwrap().unwrap();
    store.set_op(done.local_id, PendingOp::None).await.unwrap();
    store.remote_tombstone("F1").await.unwrap();

    let listed = store.list_downloads(5, 0, i64::MAX).await.unwrap();
    assert_eq!(listed.len(), 5);
    assert!(listed.iter().all(|e| e.op == PendingOp::Download));
    assert!(listed.iter().all(|e| e.remote_id != "F0" && e.remote_id != "F1"));
    // Oldest modification first.
    assert_eq!(listed[0].remote_id, "F2");
}

#[tokio::test]
async fn set_op_clears_download_flag() {
    let store = make_store().await;
    store
        .remote_upsert("F1", "", &file("a.txt", "abc", 5))
        .await
        .unwrap();
    let entry = store.entry_by_remote_id("F1").await.unwrap().unwrap();

    let before = store.list_downloads(5, 0, i64::MAX).await.unwrap().len();
    store.set_op(entry.local_id, PendingOp::None).await.unwrap();
    let after = store.list_downloads(5, 0, i64::MAX).await.unwrap().len();

    assert_eq!(before - after, 1);
}

#[tokio::test]
async fn largest_change_id_defaults_to_zero_and_roundtrips() {
    let store = make_store().await;
    assert_eq!(store.get_largest_change_id().await.unwrap(), 0);

    store.save_largest_change_id(17).await.unwrap();
    assert_eq!(store.get_largest_change_id().await.unwrap(), 17);

    store.save_largest_change_id(42).await.unwrap();
    assert_eq!(store.get_largest_change_id().await.unwrap(), 42);
}

#[tokio::test]
async fn open_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data/meta.sql");
    let store = MetaStore::open(&db_path).await.unwrap();
    store
        .remote_upsert("root", "", &folder("My Drive"))
        .await
        .unwrap();
    assert!(db_path.exists());
}

#[cfg(not(feature = "fuse-mount"))]
fn main() {
    eprintln!("gdrive-fuse binary requires --features fuse-mount");
    std::process::exit(1);
}

#[cfg(feature = "fuse-mount")]
mod app {
    use std::ffi::OsStr;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use anyhow::Context;
    use fuser::{
        FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory,
        ReplyEntry, ReplyOpen, Request, FUSE_ROOT_ID,
    };
    use libc::{EIO, EISDIR, ENOENT};
    use tokio::runtime::Runtime;

    use gdrive_fuse::{parse_mount_args, Node, TreeView};
    use gdrived::config;
    use gdrived::daemon::{resolve_data_dir, DaemonRuntime};
    use gdrived::metadata::FileEntry;

    const TTL: Duration = Duration::from_secs(1);

    /// Kernel-facing filesystem over the tree view. Inodes are derived
    /// from stable `local_id`s: the root entry is pinned to the kernel's
    /// root inode, every other entry maps to `local_id + 1`.
    struct DriveFs {
        handle: tokio::runtime::Handle,
        tree: TreeView,
        root_local_id: i64,
    }

    impl DriveFs {
        fn ino_for(&self, local_id: i64) -> u64 {
            if local_id == self.root_local_id {
                FUSE_ROOT_ID
            } else {
                local_id as u64 + 1
            }
        }

        fn local_id_for(&self, ino: u64) -> i64 {
            if ino == FUSE_ROOT_ID {
                self.root_local_id
            } else {
                ino as i64 - 1
            }
        }

        fn node_for_ino(&self, ino: u64) -> Option<Node> {
            self.handle
                .block_on(self.tree.node_by_local_id(self.local_id_for(ino)))
                .ok()
                .flatten()
        }

        fn attr_for(&self, node: &Node) -> FileAttr {
            let entry = node.entry();
            let kind = if entry.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            let size = if entry.is_dir {
                0
            } else {
                entry.file_size.max(0) as u64
            };
            let mtime = unix_to_system_time(entry.last_mod);
            FileAttr {
                ino: self.ino_for(entry.local_id),
                size,
                blocks: size.div_ceil(512),
                atime: mtime,
                mtime,
                ctime: mtime,
                crtime: mtime,
                kind,
                perm: 0o400,
                nlink: if entry.is_dir { 2 } else { 1 },
                uid: unsafe { libc::geteuid() },
                gid: unsafe { libc::getegid() },
                rdev: 0,
                flags: 0,
                blksize: 512,
            }
        }
    }

    impl Filesystem for DriveFs {
        fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let Some(name) = name.to_str() else {
                reply.error(ENOENT);
                return;
            };
            let parent_local_id = self.local_id_for(parent);
            match self.handle.block_on(self.tree.lookup(parent_local_id, name)) {
                Ok(Some(node)) => reply.entry(&TTL, &self.attr_for(&node), 0),
                Ok(None) => reply.error(ENOENT),
                Err(_) => reply.error(EIO),
            }
        }

        fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
            match self.node_for_ino(ino) {
                Some(node) => reply.attr(&TTL, &self.attr_for(&node)),
                None => reply.error(ENOENT),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request<'_>,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let Some(node) = self.node_for_ino(ino) else {
                reply.error(ENOENT);
                return;
            };
            if !node.is_dir() {
                reply.error(ENOENT);
                return;
            }

            let children: Vec<FileEntry> = match self
                .handle
                .block_on(self.tree.readdir(node.entry().local_id))
            {
                Ok(children) => children,
                Err(_) => {
                    reply.error(EIO);
                    return;
                }
            };

            let mut entries: Vec<(u64, FileType, String)> = Vec::with_capacity(children.len() + 2);
            entries.push((ino, FileType::Directory, ".".to_string()));
            entries.push((ino, FileType::Directory, "..".to_string()));
            for child in children {
                let kind = if child.is_dir {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                };
                entries.push((self.ino_for(child.local_id), kind, child.name));
            }

            for (idx, (entry_ino, entry_type, name)) in
                entries.iter().enumerate().skip(offset as usize)
            {
                let next = (idx + 1) as i64;
                if reply.add(*entry_ino, next, *entry_type, name) {
                    break;
                }
            }
            reply.ok();
        }

        fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
            if self.node_for_ino(ino).is_none() {
                reply.error(ENOENT);
                return;
            }
            reply.opened(0, 0);
        }

        fn read(
            &mut self,
            _req: &Request<'_>,
            ino: u64,
            _fh: u64,
            offset: i64,
            size: u32,
            _flags: i32,
            _lock_owner: Option<u64>,
            reply: ReplyData,
        ) {
            let Some(node) = self.node_for_ino(ino) else {
                reply.error(ENOENT);
                return;
            };
            if node.is_dir() {
                reply.error(EISDIR);
                return;
            }
            match self
                .handle
                .block_on(self.tree.read(node.entry(), offset, size as usize))
            {
                Ok(bytes) => reply.data(&bytes),
                Err(_) => reply.error(EIO),
            }
        }
    }

    pub fn run() -> anyhow::Result<()> {
        dotenvy::dotenv().ok();
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();

        let args = parse_mount_args(std::env::args())?;
        if args.help {
            println!("Usage: gdrive-fuse [--mount <dir>] [--datapath <dir>] [--blocksync]");
            return Ok(());
        }

        let rt = Runtime::new()?;
        let (tree, _handles) = rt.block_on(async {
            let data_dir = resolve_data_dir(args.data_path.clone())?;
            let daemon = DaemonRuntime::bootstrap(data_dir).await?;
            // One blocking round up front so the synthetic root exists
            // before the kernel asks for it.
            daemon.sync_once(args.block_sync).await?;
            let handles = daemon.start_background();
            let tree = TreeView::open(daemon.meta(), daemon.blobs())
                .await
                .context("resolving mount root failed")?;
            Ok::<_, anyhow::Error>((tree, handles))
        })?;

        let mountpoint: PathBuf = match args.mountpoint {
            Some(path) => path,
            None => config::default_mountpoint()?,
        };
        std::fs::create_dir_all(&mountpoint)
            .with_context(|| format!("failed to create mountpoint {}", mountpoint.display()))?;

        let root_local_id = tree.root().entry().local_id;
        let fs = DriveFs {
            handle: rt.handle().clone(),
            tree,
            root_local_id,
        };
        let options = vec![
            MountOption::FSName("gdrive-fuse".to_string()),
            MountOption::RO,
            MountOption::DefaultPermissions,
        ];
        fuser::mount2(fs, &mountpoint, &options)?;
        Ok(())
    }

    fn unix_to_system_time(ts: i64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(ts.max(0) as u64)
    }
}

#[cfg(feature = "fuse-mount")]
fn main() -> anyhow::Result<()> {
    app::run()
}

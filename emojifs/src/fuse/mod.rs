//! FUSE adapter and request handling
//!
//! Translates inode-based rfuse3 requests into the path-based calls of
//! [`EmojiFs`]:
//! - `inode`: name <-> inode table for the flat namespace.
//! - `mount`: mounting helpers around rfuse3 `Session`.
//!
//! The root directory is inode 1 and is the only directory. Every other
//! inode is a file directly below it.
pub mod inode;
pub mod mount;

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{self, Stream};
use rfuse3::Result as FuseResult;
use rfuse3::raw::Filesystem;
use rfuse3::raw::Request;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyCreated, ReplyData,
    ReplyDirectory, ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs,
    ReplyWrite,
};
use rfuse3::{FileType as FuseFileType, SetAttr, Timestamp};
use tokio::sync::{Mutex, RwLock};

use crate::error::EmojiFsError;
use crate::vfs::{Attributes, EmojiFs, FileKind};
use inode::{InodeTable, ROOT_INO};

const TTL: Duration = Duration::from_secs(1);
const MAX_WRITE: NonZeroU32 = NonZeroU32::new(1024 * 1024).unwrap();

/// Bypass the page cache: reported sizes are nominal, so the kernel must not
/// serve or truncate reads based on them.
const FOPEN_DIRECT_IO: u32 = 1;

pub struct EmojiFuse {
    fs: EmojiFs,
    inodes: RwLock<InodeTable>,
    // fh -> path for handles holding a write buffer
    write_handles: Mutex<HashMap<u64, String>>,
    next_fh: AtomicU64,
}

impl EmojiFuse {
    pub fn new(fs: EmojiFs) -> Self {
        Self {
            fs,
            inodes: RwLock::new(InodeTable::default()),
            write_handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    pub fn fs(&self) -> &EmojiFs {
        &self.fs
    }

    async fn path_of(&self, ino: u64) -> FuseResult<String> {
        self.inodes
            .read()
            .await
            .path_of(ino)
            .ok_or_else(|| libc::ENOENT.into())
    }

    async fn remember(&self, name: &str) -> u64 {
        self.inodes.write().await.remember(name)
    }

    /// Path of `name` inside `parent`, which must be the root.
    fn child_path(parent: u64, name: &OsStr) -> FuseResult<String> {
        if parent != ROOT_INO {
            return Err(libc::ENOTDIR.into());
        }
        let name = name.to_str().ok_or(libc::ENOENT)?;
        Ok(format!("/{name}"))
    }

    async fn attr_of(&self, ino: u64, path: &str) -> FuseResult<FileAttr> {
        let attr = self.fs.get_attributes(path).await?;
        Ok(to_fuse_attr(ino, &attr))
    }

    async fn open_write_handle(&self, path: &str, truncate: bool) -> FuseResult<u64> {
        self.fs.open_for_write(path, truncate).await?;
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.write_handles.lock().await.insert(fh, path.to_string());
        Ok(fh)
    }

    /// Listing of `ino` past `offset`, dots included, as
    /// `(entry offset, inode, name, attr)`. Attributes come from the same
    /// catalog snapshot as the names. With `counted`, every file entry takes a
    /// kernel lookup reference, as readdirplus replies do.
    async fn dir_entries(
        &self,
        ino: u64,
        offset: u64,
        counted: bool,
    ) -> FuseResult<Vec<(i64, u64, OsString, FileAttr)>> {
        if ino != ROOT_INO {
            self.path_of(ino).await?;
            return Err(libc::ENOTDIR.into());
        }
        let entries = self.fs.list_directory_with_attributes("/").await?;
        let mut inodes = self.inodes.write().await;
        Ok(entries
            .into_iter()
            .enumerate()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .map(|(i, entry)| {
                let inode = if entry.name == "." || entry.name == ".." {
                    ROOT_INO
                } else if counted {
                    inodes.remember(&entry.name)
                } else {
                    inodes.ino_for(&entry.name)
                };
                let attr = to_fuse_attr(inode, &entry.attr);
                (i as i64 + 1, inode, OsString::from(entry.name), attr)
            })
            .collect())
    }
}

impl Filesystem for EmojiFuse {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        tracing::info!("emojifs session initialised");
        Ok(ReplyInit {
            max_write: MAX_WRITE,
        })
    }

    async fn destroy(&self, _req: Request) {
        let pending = self.fs.buffers().paths().await;
        if !pending.is_empty() {
            tracing::warn!("Discarding {} unreleased write buffer(s)", pending.len());
        }
        for path in pending {
            self.fs.buffers().remove(&path).await;
        }
    }

    async fn lookup(&self, _req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        tracing::debug!("lookup {parent} {name:?}");
        let path = Self::child_path(parent, name)?;
        let attr = self.fs.get_attributes(&path).await?;
        let ino = self.remember(&path[1..]).await;
        Ok(ReplyEntry {
            ttl: TTL,
            attr: to_fuse_attr(ino, &attr),
            generation: 0,
        })
    }

    async fn forget(&self, _req: Request, inode: u64, nlookup: u64) {
        self.inodes.write().await.forget(inode, nlookup);
    }

    async fn batch_forget(&self, _req: Request, inodes: &[(u64, u64)]) {
        let mut table = self.inodes.write().await;
        for &(inode, nlookup) in inodes {
            table.forget(inode, nlookup);
        }
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        tracing::debug!("getattr {ino}");
        let path = self.path_of(ino).await?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: self.attr_of(ino, &path).await?,
        })
    }

    // Only size changes on buffered files are honoured; catalog files are read-only.
    async fn setattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        set_attr: SetAttr,
    ) -> FuseResult<ReplyAttr> {
        tracing::debug!("setattr {ino} size={:?}", set_attr.size);
        let path = self.path_of(ino).await?;
        if let Some(size) = set_attr.size {
            match self.fs.truncate(&path, size).await {
                Ok(()) => {}
                Err(EmojiFsError::NotWritable(_)) => return Err(libc::EACCES.into()),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ReplyAttr {
            ttl: TTL,
            attr: self.attr_of(ino, &path).await?,
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        tracing::debug!("open {ino} flags={flags:#o}");
        if ino == ROOT_INO {
            return Err(libc::EISDIR.into());
        }
        let path = self.path_of(ino).await?;
        let flags = flags as libc::c_int;
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            let fh = self
                .open_write_handle(&path, flags & libc::O_TRUNC != 0)
                .await?;
            return Ok(ReplyOpen { fh, flags: 0 });
        }
        self.fs.get_attributes(&path).await?;
        Ok(ReplyOpen {
            fh: 0,
            flags: FOPEN_DIRECT_IO,
        })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        if ino != ROOT_INO {
            self.path_of(ino).await?;
            return Err(libc::ENOTDIR.into());
        }
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        tracing::debug!("read {ino} offset={offset} size={size}");
        if ino == ROOT_INO {
            return Err(libc::EISDIR.into());
        }
        let path = self.path_of(ino).await?;
        let data = self.fs.read(&path, size as usize, offset).await?;
        Ok(ReplyData { data })
    }

    async fn write(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        data: &[u8],
        _write_flags: u32,
        _flags: u32,
    ) -> FuseResult<ReplyWrite> {
        tracing::debug!("write {ino} offset={offset} len={}", data.len());
        let path = self.path_of(ino).await?;
        let written = self.fs.write(&path, offset, data).await?;
        Ok(ReplyWrite {
            written: written as u32,
        })
    }

    async fn create(
        &self,
        _req: Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _flags: u32,
    ) -> FuseResult<ReplyCreated> {
        tracing::debug!("create {parent} {name:?}");
        let path = Self::child_path(parent, name)?;
        let fh = self.open_write_handle(&path, true).await?;
        let ino = self.remember(&path[1..]).await;
        Ok(ReplyCreated {
            ttl: TTL,
            attr: self.attr_of(ino, &path).await?,
            generation: 0,
            fh,
            flags: 0,
        })
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        let path = self.write_handles.lock().await.remove(&fh);
        if let Some(path) = path {
            self.fs.release(&path).await;
        }
        Ok(())
    }

    // Buffers are never persisted, so there is nothing to flush or sync.
    async fn flush(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _lock_owner: u64,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn fsync(&self, _req: Request, _inode: u64, _fh: u64, _datasync: bool) -> FuseResult<()> {
        Ok(())
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        Ok(())
    }

    // offset is the offset of the last entry already returned
    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        tracing::debug!("readdir {ino} offset={offset}");
        let entries = self.dir_entries(ino, offset.max(0) as u64, false).await?;
        let all: Vec<DirectoryEntry> = entries
            .into_iter()
            .map(|(offset, inode, name, attr)| DirectoryEntry {
                inode,
                kind: attr.kind,
                name,
                offset,
            })
            .collect();
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream::iter(all.into_iter().map(Ok)));
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        tracing::debug!("readdirplus {ino} offset={offset}");
        let entries = self.dir_entries(ino, offset, true).await?;
        let all: Vec<DirectoryEntryPlus> = entries
            .into_iter()
            .map(|(offset, inode, name, attr)| DirectoryEntryPlus {
                inode,
                generation: 0,
                kind: attr.kind,
                name,
                offset,
                attr,
                entry_ttl: TTL,
                attr_ttl: TTL,
            })
            .collect();
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream::iter(all.into_iter().map(Ok)));
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    // Sizes are nominal, so block counts are placeholders.
    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: 0,
            ffree: 0,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }
}

fn kind_to_fuse(kind: FileKind) -> FuseFileType {
    match kind {
        FileKind::Directory => FuseFileType::Directory,
        FileKind::RegularFile => FuseFileType::RegularFile,
    }
}

fn to_fuse_attr(ino: u64, attr: &Attributes) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: Timestamp::from(attr.atime),
        mtime: Timestamp::from(attr.mtime),
        ctime: Timestamp::from(attr.ctime),
        #[cfg(target_os = "macos")]
        crtime: Timestamp::from(attr.ctime),
        kind: kind_to_fuse(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}

//! Path-based view of the emoji catalog: one flat directory of image files.
//!
//! Every call is stateless apart from the shared caches and the write
//! buffers. Attribute queries report a fixed nominal size instead of the real
//! image length, which is only known after downloading the body; `read` is the
//! source of truth for the bytes.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::buffer::{MAX_BUFFER_SIZE, WriteBuffer, WriteBufferStore, byte_range};
use crate::catalog::{Catalog, CatalogClient};
use crate::config::CacheConfig;
use crate::content_type::ContentTypeResolver;
use crate::error::{EmojiFsError, Result};
use crate::filename::{FilenameMapper, SuffixTable, logical_name_from_path};
use crate::remote::{Emoji, MattermostClient};

pub const ROOT_PATH: &str = "/";

/// Size reported for every catalog file by `get_attributes`.
pub const NOMINAL_FILE_SIZE: u64 = 1024 * 1024;

// Content-type probes in flight while listing the root.
const PROBE_CONCURRENCY: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub kind: FileKind,
    pub perm: u16,
    pub size: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

/// One name in a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attr: Attributes,
}

/// Owner stamped on every synthetic attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::geteuid().as_raw(),
            gid: nix::unistd::getegid().as_raw(),
        }
    }
}

pub struct EmojiFs {
    remote: MattermostClient,
    catalog: CatalogClient,
    filenames: FilenameMapper,
    buffers: WriteBufferStore,
    identity: Identity,
}

impl EmojiFs {
    pub fn new(remote: MattermostClient, cache: &CacheConfig, suffixes: SuffixTable) -> Self {
        let catalog = CatalogClient::new(remote.clone(), cache);
        let resolver = Arc::new(ContentTypeResolver::new(remote.clone(), cache));
        Self {
            remote,
            catalog,
            filenames: FilenameMapper::new(resolver, suffixes),
            buffers: WriteBufferStore::new(),
            identity: Identity::current(),
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn catalog(&self) -> &CatalogClient {
        &self.catalog
    }

    pub fn filenames(&self) -> &FilenameMapper {
        &self.filenames
    }

    pub fn buffers(&self) -> &WriteBufferStore {
        &self.buffers
    }

    fn is_root(path: &str) -> bool {
        path.is_empty() || path == ROOT_PATH
    }

    async fn entry_for(&self, path: &str) -> Result<Emoji> {
        let catalog = self.catalog.list_all().await?;
        catalog
            .get(&logical_name_from_path(path))
            .cloned()
            .ok_or_else(|| EmojiFsError::NotFound(path.to_string()))
    }

    /// Names in `path`, including `.` and `..`. Only the root has files; an
    /// emoji whose filename cannot be worked out is left out with a warning.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let entries = self.list_directory_with_attributes(path).await?;
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    /// `list_directory` with each entry's attributes taken from the same
    /// catalog snapshot, so a listing served from a stale catalog during an
    /// outage still carries attributes.
    pub async fn list_directory_with_attributes(&self, path: &str) -> Result<Vec<DirEntry>> {
        let now = SystemTime::now();
        if !Self::is_root(path) {
            return Ok(Self::dots(self.directory_attributes(&Catalog::default(), now)));
        }

        let catalog = self.catalog.list_all_or_stale().await?;
        let filenames = &self.filenames;
        let resolved: Vec<_> = stream::iter(catalog.entries().cloned().collect::<Vec<_>>())
            .map(move |e| async move {
                let filename = filenames.filename_for(&e).await;
                (e, filename)
            })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await;

        let mut files = Vec::with_capacity(resolved.len());
        for (e, filename) in resolved {
            match filename {
                Ok(name) => files.push((name, e)),
                Err(err) => {
                    tracing::warn!("Failed to determine filename for {:?} ({}): {err}", e.name, e.id)
                }
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut entries = Self::dots(self.directory_attributes(&catalog, now));
        for (name, e) in files {
            let attr = match self.buffers.get(&format!("/{name}")).await {
                Some(buffer) => self.buffered_attributes(&buffer, now).await,
                None => self.entry_attributes(&e, now),
            };
            entries.push(DirEntry { name, attr });
        }
        Ok(entries)
    }

    pub async fn get_attributes(&self, path: &str) -> Result<Attributes> {
        let now = SystemTime::now();

        if Self::is_root(path) {
            let catalog = self.catalog.list_all().await?;
            return Ok(self.directory_attributes(&catalog, now));
        }

        if let Some(buffer) = self.buffers.get(path).await {
            return Ok(self.buffered_attributes(&buffer, now).await);
        }

        let e = self.entry_for(path).await?;
        Ok(self.entry_attributes(&e, now))
    }

    fn dots(dir: Attributes) -> Vec<DirEntry> {
        vec![
            DirEntry {
                name: ".".to_string(),
                attr: dir.clone(),
            },
            DirEntry {
                name: "..".to_string(),
                attr: dir,
            },
        ]
    }

    fn directory_attributes(&self, catalog: &Catalog, now: SystemTime) -> Attributes {
        Attributes {
            kind: FileKind::Directory,
            perm: 0o555 | libc::S_IWUSR as u16,
            size: 0,
            nlink: 2,
            uid: self.identity.uid,
            gid: self.identity.gid,
            atime: now,
            mtime: catalog.newest_update().unwrap_or(now),
            ctime: catalog.oldest_create().unwrap_or(now),
        }
    }

    async fn buffered_attributes(&self, buffer: &WriteBuffer, now: SystemTime) -> Attributes {
        Attributes {
            kind: FileKind::RegularFile,
            perm: 0o644,
            size: buffer.len().await,
            nlink: 1,
            uid: self.identity.uid,
            gid: self.identity.gid,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    fn entry_attributes(&self, e: &Emoji, now: SystemTime) -> Attributes {
        Attributes {
            kind: FileKind::RegularFile,
            perm: 0o444,
            size: NOMINAL_FILE_SIZE,
            nlink: 1,
            uid: self.identity.uid,
            gid: self.identity.gid,
            atime: now,
            mtime: e.updated(),
            ctime: e.created(),
        }
    }

    /// Up to `size` bytes at `offset`. Past the end yields an empty result.
    pub async fn read(&self, path: &str, size: usize, offset: u64) -> Result<Bytes> {
        if let Some(buffer) = self.buffers.get(path).await {
            return Ok(buffer.read_at(offset, size).await);
        }

        let e = self.entry_for(path).await?;
        let body = self.remote.image(&e.id).await?;
        let range = byte_range(&body, offset, size);
        Ok(body.slice_ref(range))
    }

    /// Register a write handle on `path`, creating its buffer if needed.
    pub async fn open_for_write(&self, path: &str, truncate: bool) -> Result<()> {
        if Self::is_root(path) {
            return Err(EmojiFsError::NotWritable(path.to_string()));
        }
        let buffer = self.buffers.open(path).await;
        if truncate {
            buffer.truncate(0).await;
        }
        tracing::debug!("Opened write buffer for {path}");
        Ok(())
    }

    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let buffer = self
            .buffers
            .get(path)
            .await
            .ok_or_else(|| EmojiFsError::NotWritable(path.to_string()))?;
        buffer
            .write_at(offset, data)
            .await
            .ok_or_else(|| Self::too_large(path))
    }

    pub async fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let buffer = self
            .buffers
            .get(path)
            .await
            .ok_or_else(|| EmojiFsError::NotWritable(path.to_string()))?;
        buffer.truncate(size).await.ok_or_else(|| Self::too_large(path))
    }

    fn too_large(path: &str) -> EmojiFsError {
        EmojiFsError::TooLarge {
            path: path.to_string(),
            limit: MAX_BUFFER_SIZE,
        }
    }

    /// Drop one write handle on `path`; the buffer is discarded with the last.
    pub async fn release(&self, path: &str) {
        if self.buffers.release(path).await {
            tracing::debug!("Discarded write buffer for {path}");
        }
    }
}

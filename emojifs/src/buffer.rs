//! In-memory write buffers, one per path.
//!
//! A buffer is created when a path is opened for writing and dropped when the
//! last write handle on that path is released. Nothing here is ever sent to
//! the server. Handles on the same path share one buffer.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};

/// `data[offset .. offset + size]`, clamped to the end of `data`.
pub fn byte_range(data: &[u8], offset: u64, size: usize) -> &[u8] {
    let len = data.len();
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(len);
    let end = start.saturating_add(size).min(len);
    &data[start..end]
}

/// Largest size a write buffer may reach; emoji images are far smaller.
pub const MAX_BUFFER_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct WriteBuffer {
    data: Mutex<Vec<u8>>,
}

impl WriteBuffer {
    pub async fn read_at(&self, offset: u64, size: usize) -> Bytes {
        let data = self.data.lock().await;
        Bytes::copy_from_slice(byte_range(&data, offset, size))
    }

    /// Write `buf` at `offset`, zero-filling any gap past the current end.
    /// Returns `None` when the result would exceed `MAX_BUFFER_SIZE`.
    pub async fn write_at(&self, offset: u64, buf: &[u8]) -> Option<usize> {
        let end = offset
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= MAX_BUFFER_SIZE)?;
        let (start, end) = (usize::try_from(offset).ok()?, usize::try_from(end).ok()?);
        let mut data = self.data.lock().await;
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Some(buf.len())
    }

    /// Shrink or zero-extend to `size`. Returns `None` past `MAX_BUFFER_SIZE`.
    pub async fn truncate(&self, size: u64) -> Option<()> {
        if size > MAX_BUFFER_SIZE {
            return None;
        }
        let size = usize::try_from(size).ok()?;
        self.data.lock().await.resize(size, 0);
        Some(())
    }

    pub async fn len(&self) -> u64 {
        self.data.lock().await.len() as u64
    }

    pub async fn is_empty(&self) -> bool {
        self.data.lock().await.is_empty()
    }
}

struct Slot {
    buffer: Arc<WriteBuffer>,
    handles: usize,
}

type Slots = HashMap<String, Slot>;

#[derive(Default)]
pub struct WriteBufferStore {
    slots: RwLock<Slots>,
}

impl WriteBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<Arc<WriteBuffer>> {
        self.slots.read().await.get(path).map(|s| s.buffer.clone())
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.slots.read().await.contains_key(path)
    }

    /// Buffer for `path`, created empty if there is none yet.
    pub async fn get_or_create(&self, path: &str) -> Arc<WriteBuffer> {
        Self::slot_for(&mut *self.slots.write().await, path)
            .buffer
            .clone()
    }

    /// Drop the buffer of `path` regardless of open handles.
    pub async fn remove(&self, path: &str) -> Option<Arc<WriteBuffer>> {
        Self::take(&mut *self.slots.write().await, path)
    }

    /// `get_or_create` plus one more open write handle on `path`, under one lock.
    pub async fn open(&self, path: &str) -> Arc<WriteBuffer> {
        let mut slots = self.slots.write().await;
        let slot = Self::slot_for(&mut slots, path);
        slot.handles += 1;
        slot.buffer.clone()
    }

    /// Drop one write handle; the last one `remove`s the buffer.
    /// Returns true when the buffer was removed.
    pub async fn release(&self, path: &str) -> bool {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get_mut(path) else {
            return false;
        };
        slot.handles = slot.handles.saturating_sub(1);
        slot.handles == 0 && Self::take(&mut slots, path).is_some()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }

    fn slot_for<'a>(slots: &'a mut Slots, path: &str) -> &'a mut Slot {
        slots.entry(path.to_string()).or_insert_with(|| Slot {
            buffer: Arc::default(),
            handles: 0,
        })
    }

    fn take(slots: &mut Slots, path: &str) -> Option<Arc<WriteBuffer>> {
        slots.remove(path).map(|s| s.buffer)
    }
}

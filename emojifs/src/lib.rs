//! emojifs: a Mattermost instance's custom emoji as a flat FUSE directory.
//!
//! Layers, leaf first:
//! - `remote`: REST client over a pluggable HTTP transport.
//! - `catalog` / `content_type`: TTL caches in front of the listing and the
//!   per-emoji type probe.
//! - `filename`: emoji name + type suffix <-> filename.
//! - `buffer`: local write buffers, never uploaded.
//! - `vfs`: path-based filesystem operations.
//! - `fuse`: rfuse3 adapter and mount helpers.

pub mod buffer;
pub mod catalog;
pub mod config;
pub mod content_type;
pub mod error;
pub mod filename;
pub mod fuse;
pub mod remote;
pub mod vfs;

pub use error::{EmojiFsError, Result};
pub use fuse::EmojiFuse;
pub use vfs::EmojiFs;

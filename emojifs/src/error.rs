//! Error taxonomy shared by the remote client, the caches and the FUSE layer.
//!
//! Every failure coming out of a remote call is classified here before it
//! reaches the filesystem boundary, so `ENOENT` (an emoji that does not exist)
//! can never be confused with `EIO` (the server could not be reached).

use std::sync::Arc;

use thiserror::Error;

pub type Result<T, E = EmojiFsError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmojiFsError {
    /// Transport error or non-2xx response from the Mattermost API.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The image probe answered without a `Content-Type` header.
    #[error("cannot infer file type of emoji {id}: response has no Content-Type")]
    TypeUnknown { id: String },

    /// The image has a content type with no configured filename suffix.
    #[error("unsupported emoji Content-Type '{content_type}' for {name}")]
    UnsupportedType { name: String, content_type: String },

    /// The path does not map to any catalog entry or write buffer.
    #[error("no such entry: {0}")]
    NotFound(String),

    /// Write against a path that has no open write buffer.
    #[error("{0} is not open for writing")]
    NotWritable(String),

    /// Write or truncate past the largest buffer a path may hold.
    #[error("{path} would grow past {limit} bytes")]
    TooLarge { path: String, limit: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EmojiFsError {
    pub fn remote(context: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        Self::RemoteUnavailable(format!("{context}: {cause}"))
    }

    /// The errno handed back to the kernel for this failure.
    pub fn errno(&self) -> libc::c_int {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::NotWritable(_) => libc::EBADF,
            Self::TooLarge { .. } => libc::EFBIG,
            Self::InvalidConfig(_) => libc::EINVAL,
            Self::RemoteUnavailable(_) | Self::TypeUnknown { .. } | Self::UnsupportedType { .. } => {
                libc::EIO
            }
        }
    }
}

// moka hands back init failures wrapped in an Arc shared by every waiter.
impl From<Arc<EmojiFsError>> for EmojiFsError {
    fn from(e: Arc<EmojiFsError>) -> Self {
        Arc::unwrap_or_clone(e)
    }
}

impl From<EmojiFsError> for rfuse3::Errno {
    fn from(e: EmojiFsError) -> Self {
        e.errno().into()
    }
}

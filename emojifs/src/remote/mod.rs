//! Mattermost REST client
//!
//! Responsibilities:
//! - Speak the handful of v4 endpoints emojifs needs: the paginated emoji
//!   listing, the per-emoji image (HEAD for the type, GET for the bytes) and
//!   `users/me` for the startup login check.
//! - Turn every transport failure and non-2xx status into
//!   `EmojiFsError::RemoteUnavailable`.
//!
//! Submodules:
//! - `transport`: the HTTP primitive and its reqwest implementation
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;

use crate::error::{EmojiFsError, Result};
use transport::{RemoteResponse, Transport};

/// Page size of the emoji listing; a shorter page marks the end.
pub const PAGE_SIZE: usize = 100;

/// One custom emoji as returned by `GET api/v4/emoji`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Emoji {
    pub id: String,
    pub name: String,
    /// Epoch milliseconds.
    pub create_at: i64,
    /// Epoch milliseconds.
    pub update_at: i64,
}

impl Emoji {
    pub fn created(&self) -> SystemTime {
        millis_to_system_time(self.create_at)
    }

    pub fn updated(&self) -> SystemTime {
        millis_to_system_time(self.update_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

pub fn millis_to_system_time(ms: i64) -> SystemTime {
    let magnitude = Duration::from_millis(ms.unsigned_abs());
    if ms >= 0 {
        UNIX_EPOCH + magnitude
    } else {
        UNIX_EPOCH - magnitude
    }
}

#[derive(Clone)]
pub struct MattermostClient {
    transport: Arc<dyn Transport>,
}

impl MattermostClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn request(&self, method: Method, path: &str) -> Result<RemoteResponse> {
        tracing::trace!("{method} {path}");
        let resp = self.transport.send(method.clone(), path).await?;
        if !resp.status.is_success() {
            return Err(EmojiFsError::remote(
                format!("{method} {path}"),
                format!("unexpected status {}", resp.status),
            ));
        }
        Ok(resp)
    }

    fn emoji_image_path(id: &str) -> String {
        format!("api/v4/emoji/{id}/image")
    }

    /// One page of the name-sorted emoji listing.
    pub async fn list_page(&self, page: u32) -> Result<Vec<Emoji>> {
        let path = format!("api/v4/emoji?page={page}&per_page={PAGE_SIZE}&sort=name");
        let resp = self.request(Method::GET, &path).await?;
        serde_json::from_slice(&resp.body)
            .map_err(|e| EmojiFsError::remote(format!("GET {path}"), format!("bad listing: {e}")))
    }

    /// Content type of an emoji image without transferring the body.
    pub async fn content_type(&self, id: &str) -> Result<String> {
        let resp = self.request(Method::HEAD, &Self::emoji_image_path(id)).await?;
        resp.content_type()
            .map(str::to_string)
            .ok_or_else(|| EmojiFsError::TypeUnknown { id: id.to_string() })
    }

    /// Full image body of an emoji.
    pub async fn image(&self, id: &str) -> Result<Bytes> {
        let resp = self.request(Method::GET, &Self::emoji_image_path(id)).await?;
        Ok(resp.body)
    }

    /// The user owning the access token.
    pub async fn me(&self) -> Result<User> {
        let path = "api/v4/users/me";
        let resp = self.request(Method::GET, path).await?;
        serde_json::from_slice(&resp.body)
            .map_err(|e| EmojiFsError::remote(format!("GET {path}"), format!("bad user: {e}")))
    }
}

//! Scripted in-process Mattermost used by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};

use super::transport::{RemoteResponse, Transport};
use super::{Emoji, MattermostClient, PAGE_SIZE};
use crate::error::{EmojiFsError, Result};

pub fn emoji(id: &str, name: &str, create_at: i64, update_at: i64) -> Emoji {
    Emoji {
        id: id.to_string(),
        name: name.to_string(),
        create_at,
        update_at,
    }
}

/// Deterministic body for an emoji image, long enough for slicing tests.
pub fn image_bytes(id: &str) -> Bytes {
    let mut body = b"\x89PNG\r\n\x1a\n".to_vec();
    body.extend((0..64u8).map(|i| i ^ id.len() as u8));
    Bytes::from(body)
}

#[derive(Default)]
struct State {
    emojis: Vec<Emoji>,
    content_types: HashMap<String, Option<String>>,
    images: HashMap<String, Bytes>,
    requests: Vec<String>,
    fail_all: bool,
    fail_page: Option<u32>,
    delay: Duration,
}

#[derive(Clone, Default)]
pub struct FakeMattermost {
    state: Arc<Mutex<State>>,
}

impl FakeMattermost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emoji(self, e: Emoji, content_type: &str) -> Self {
        self.add(e, Some(content_type.to_string()));
        self
    }

    pub fn with_untyped_emoji(self, e: Emoji) -> Self {
        self.add(e, None);
        self
    }

    pub fn with_image(self, id: &str, body: &[u8]) -> Self {
        self.state
            .lock()
            .unwrap()
            .images
            .insert(id.to_string(), Bytes::copy_from_slice(body));
        self
    }

    /// `count` PNG emojis named `e0000`, `e0001`, ...
    pub fn with_generated(self, count: usize) -> Self {
        for i in 0..count {
            self.add(
                emoji(&format!("id{i}"), &format!("e{i:04}"), 1000, 2000),
                Some("image/png".into()),
            );
        }
        self
    }

    fn add(&self, e: Emoji, content_type: Option<String>) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(e.id.clone(), image_bytes(&e.id));
        state.content_types.insert(e.id.clone(), content_type);
        state.emojis.push(e);
    }

    pub fn set_content_type(&self, id: &str, content_type: &str) {
        self.state
            .lock()
            .unwrap()
            .content_types
            .insert(id.to_string(), Some(content_type.to_string()));
    }

    pub fn remove_emoji(&self, name: &str) {
        self.state.lock().unwrap().emojis.retain(|e| e.name != name);
    }

    pub fn fail_all(&self, fail: bool) {
        self.state.lock().unwrap().fail_all = fail;
    }

    pub fn fail_page(&self, page: Option<u32>) {
        self.state.lock().unwrap().fail_page = page;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    pub fn client(&self) -> MattermostClient {
        MattermostClient::new(Arc::new(self.clone()))
    }

    fn respond(&self, method: &Method, path: &str) -> Result<RemoteResponse> {
        let state = self.state.lock().unwrap();
        if state.fail_all {
            return Err(EmojiFsError::remote(format!("{method} {path}"), "connection refused"));
        }

        if path == "api/v4/users/me" {
            return Ok(json(r#"{"id":"u1","username":"tester"}"#.into()));
        }

        if let Some(query) = path.strip_prefix("api/v4/emoji?") {
            let page: u32 = query
                .split('&')
                .find_map(|kv| kv.strip_prefix("page="))
                .and_then(|p| p.parse().ok())
                .unwrap_or(0);
            if state.fail_page == Some(page) {
                return Ok(status(StatusCode::INTERNAL_SERVER_ERROR));
            }
            let mut sorted = state.emojis.clone();
            sorted.sort_by(|a, b| a.name.cmp(&b.name));
            let items: Vec<_> = sorted
                .iter()
                .skip(page as usize * PAGE_SIZE)
                .take(PAGE_SIZE)
                .map(|e| {
                    serde_json::json!({
                        "id": e.id,
                        "creator_id": "u1",
                        "name": e.name,
                        "create_at": e.create_at,
                        "update_at": e.update_at,
                        "delete_at": 0,
                    })
                })
                .collect();
            return Ok(json(serde_json::Value::Array(items).to_string()));
        }

        if let Some(id) = path
            .strip_prefix("api/v4/emoji/")
            .and_then(|rest| rest.strip_suffix("/image"))
        {
            let Some(content_type) = state.content_types.get(id) else {
                return Ok(status(StatusCode::NOT_FOUND));
            };
            let mut headers = HeaderMap::new();
            if let Some(ct) = content_type {
                headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
            }
            let body = if *method == Method::HEAD {
                Bytes::new()
            } else {
                state.images.get(id).cloned().unwrap_or_default()
            };
            return Ok(RemoteResponse {
                status: StatusCode::OK,
                headers,
                body,
            });
        }

        Ok(status(StatusCode::NOT_FOUND))
    }
}

fn status(code: StatusCode) -> RemoteResponse {
    RemoteResponse {
        status: code,
        headers: HeaderMap::new(),
        body: Bytes::new(),
    }
}

fn json(body: String) -> RemoteResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    RemoteResponse {
        status: StatusCode::OK,
        headers,
        body: Bytes::from(body),
    }
}

#[async_trait]
impl Transport for FakeMattermost {
    async fn send(&self, method: Method, path: &str) -> Result<RemoteResponse> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(format!("{method} {path}"));
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.respond(&method, path)
    }
}

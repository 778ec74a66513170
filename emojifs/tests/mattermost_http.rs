//! End-to-end checks against a local HTTP server speaking the subset of the
//! Mattermost v4 API emojifs uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use emojifs::config::CacheConfig;
use emojifs::filename::SuffixTable;
use emojifs::remote::MattermostClient;
use emojifs::remote::transport::{HttpTransport, TransportConfig};
use emojifs::{EmojiFs, EmojiFsError};
use serde_json::json;
use tokio::net::TcpListener;

const TOKEN: &str = "s3cr3t";
const SMILE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nsmile-bytes";
const WAVE_GIF: &[u8] = b"GIF89a-wave";

#[derive(Clone, Default)]
struct ServerState {
    auth: Arc<Mutex<Vec<String>>>,
    broken: bool,
}

impl ServerState {
    fn record(&self, headers: &HeaderMap) {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.auth.lock().unwrap().push(value);
    }
}

async fn me(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    state.record(&headers);
    Json(json!({"id": "u1", "username": "alice"})).into_response()
}

async fn list(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.record(&headers);
    if state.broken {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let page = query.get("page").map(String::as_str).unwrap_or("0");
    if page != "0" {
        return Json(json!([])).into_response();
    }
    Json(json!([
        {"id": "1", "name": "smile", "create_at": 1000, "update_at": 2000, "creator_id": "u1"},
        {"id": "2", "name": "wave", "create_at": 3000, "update_at": 4000, "creator_id": "u1"},
    ]))
    .into_response()
}

async fn image(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    state.record(&headers);
    match id.as_str() {
        "1" => ([(header::CONTENT_TYPE, "image/png")], SMILE_PNG).into_response(),
        "2" => ([(header::CONTENT_TYPE, "image/gif")], WAVE_GIF).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve(state: ServerState) -> String {
    let app = Router::new()
        .route("/api/v4/users/me", get(me))
        .route("/api/v4/emoji", get(list))
        .route("/api/v4/emoji/{id}/image", get(image))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: &str) -> MattermostClient {
    let transport = HttpTransport::new(&TransportConfig::new(base_url, TOKEN)).unwrap();
    MattermostClient::new(Arc::new(transport))
}

#[tokio::test]
async fn login_check_sends_bearer_token() {
    let state = ServerState::default();
    let url = serve(state.clone()).await;

    let user = client(&url).me().await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(
        state.auth.lock().unwrap().as_slice(),
        [format!("Bearer {TOKEN}")]
    );
}

#[tokio::test]
async fn mount_view_lists_and_reads_over_http() {
    let state = ServerState::default();
    let url = serve(state.clone()).await;
    // A base URL given with a trailing slash must resolve to the same API paths.
    let fs = EmojiFs::new(
        client(&format!("{url}/")),
        &CacheConfig::default(),
        SuffixTable::default(),
    );

    let names = fs.list_directory("/").await.unwrap();
    assert_eq!(names, [".", "..", "smile.png", "wave.gif"]);

    let whole = fs.read("/smile.png", 4096, 0).await.unwrap();
    assert_eq!(&whole[..], SMILE_PNG);
    let tail = fs.read("/wave.gif", 4, 7).await.unwrap();
    assert_eq!(&tail[..], b"wave");
    let past_end = fs.read("/wave.gif", 16, 1 << 20).await.unwrap();
    assert!(past_end.is_empty());

    let attrs = fs.get_attributes("/smile.png").await.unwrap();
    assert_eq!(attrs.perm, 0o444);
    assert_eq!(attrs.ctime, UNIX_EPOCH + Duration::from_secs(1));
    assert_eq!(attrs.mtime, UNIX_EPOCH + Duration::from_secs(2));

    assert!(
        state
            .auth
            .lock()
            .unwrap()
            .iter()
            .all(|v| v == &format!("Bearer {TOKEN}"))
    );
}

#[tokio::test]
async fn server_error_surfaces_as_remote_unavailable() {
    let state = ServerState {
        broken: true,
        ..ServerState::default()
    };
    let url = serve(state).await;
    let fs = EmojiFs::new(client(&url), &CacheConfig::default(), SuffixTable::default());

    let err = fs.list_directory("/").await.unwrap_err();
    assert!(matches!(err, EmojiFsError::RemoteUnavailable(_)));
    assert_eq!(err.errno(), libc::EIO);
}

#[tokio::test]
async fn unknown_file_is_not_found() {
    let url = serve(ServerState::default()).await;
    let fs = EmojiFs::new(client(&url), &CacheConfig::default(), SuffixTable::default());

    let err = fs.get_attributes("/nope.png").await.unwrap_err();
    assert_eq!(err, EmojiFsError::NotFound("/nope.png".to_string()));
}

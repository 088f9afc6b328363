use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub file_path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct RecordedMetaRequest {
    pub path: String,
    pub refresh: bool,
}

#[derive(Debug, Clone)]
pub struct RecordedDownload {
    pub path: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct MockInner {
    files: HashMap<String, Vec<u8>>,
    uploads: Vec<RecordedUpload>,
    meta_requests: Vec<RecordedMetaRequest>,
    delete_requests: Vec<JsonValue>,
    download_requests: Vec<RecordedDownload>,
    /// Remaining metadata lookups that report "not found" for a freshly written path
    pending_lag: HashMap<String, usize>,
    meta_lag: usize,
    serve_raw_url: bool,
    upload_status: Option<StatusCode>,
    list_status: Option<StatusCode>,
}

#[derive(Clone)]
struct MockState {
    base_url: String,
    inner: Arc<Mutex<MockInner>>,
}

/// In-process stand-in for an OpenList file service.
pub struct MockOpenList {
    pub base_url: String,
    inner: Arc<Mutex<MockInner>>,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl MockOpenList {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let inner = Arc::new(Mutex::new(MockInner {
            serve_raw_url: true,
            ..MockInner::default()
        }));
        let state = MockState {
            base_url: base_url.clone(),
            inner: inner.clone(),
        };

        let app = Router::new()
            .route("/api/fs/put", put(handle_put))
            .route("/api/fs/get", post(handle_get_meta))
            .route("/api/fs/list", post(handle_list))
            .route("/api/fs/remove", post(handle_remove))
            .route("/api/fs/download", get(handle_endpoint_download))
            .route("/raw/*path", get(handle_download))
            .route("/d/*path", get(handle_download))
            .with_state(state);

        let server_handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        sleep(Duration::from_millis(50)).await;

        Ok(Self {
            base_url,
            inner,
            _server_handle: server_handle,
        })
    }

    /// Number of metadata lookups that miss after each upload.
    pub fn set_meta_lag(&self, lookups: usize) {
        self.inner.lock().unwrap().meta_lag = lookups;
    }

    pub fn set_serve_raw_url(&self, enabled: bool) {
        self.inner.lock().unwrap().serve_raw_url = enabled;
    }

    pub fn fail_uploads_with(&self, status: StatusCode) {
        self.inner.lock().unwrap().upload_status = Some(status);
    }

    pub fn fail_listing_with(&self, status: StatusCode) {
        self.inner.lock().unwrap().list_status = Some(status);
    }

    pub fn put_file(&self, absolute_path: &str, content: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert(absolute_path.to_string(), content.to_vec());
    }

    pub fn file(&self, absolute_path: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().files.get(absolute_path).cloned()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.inner.lock().unwrap().uploads.clone()
    }

    pub fn meta_requests(&self) -> Vec<RecordedMetaRequest> {
        self.inner.lock().unwrap().meta_requests.clone()
    }

    pub fn delete_requests(&self) -> Vec<JsonValue> {
        self.inner.lock().unwrap().delete_requests.clone()
    }

    pub fn download_requests(&self) -> Vec<RecordedDownload> {
        self.inner.lock().unwrap().download_requests.clone()
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn not_found_envelope() -> Json<JsonValue> {
    Json(json!({"code": 500, "message": "object not found", "data": null}))
}

async fn handle_put(State(state): State<MockState>, headers: HeaderMap, body: Bytes) -> Response {
    let file_path = header_string(&headers, "file-path").unwrap_or_default();
    let decoded = urlencoding::decode(&file_path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| file_path.clone());

    let mut inner = state.inner.lock().unwrap();
    inner.uploads.push(RecordedUpload {
        file_path,
        authorization: header_string(&headers, "authorization"),
        content_type: header_string(&headers, "content-type"),
        body: body.to_vec(),
    });

    if let Some(status) = inner.upload_status {
        return (status, "upload rejected").into_response();
    }

    let lag = inner.meta_lag;
    inner.pending_lag.insert(decoded.clone(), lag);
    inner.files.insert(decoded, body.to_vec());
    Json(json!({"code": 200, "message": "success", "data": null})).into_response()
}

async fn handle_get_meta(
    State(state): State<MockState>,
    Json(request): Json<JsonValue>,
) -> Json<JsonValue> {
    let path = request["path"].as_str().unwrap_or_default().to_string();
    let refresh = request["refresh"].as_bool().unwrap_or(false);

    let mut inner = state.inner.lock().unwrap();
    inner.meta_requests.push(RecordedMetaRequest {
        path: path.clone(),
        refresh,
    });

    if let Some(remaining) = inner.pending_lag.get_mut(&path) {
        if *remaining > 0 {
            *remaining -= 1;
            return not_found_envelope();
        }
    }

    let Some(content) = inner.files.get(&path) else {
        return not_found_envelope();
    };

    let name = path.rsplit('/').next().unwrap_or_default();
    let raw_url = if inner.serve_raw_url {
        format!("{}/raw{}", state.base_url, path)
    } else {
        String::new()
    };

    Json(json!({
        "code": 200,
        "message": "success",
        "data": {
            "name": name,
            "size": content.len(),
            "is_dir": false,
            "modified": "2024-05-01T10:00:00Z",
            "raw_url": raw_url,
        }
    }))
}

async fn handle_list(State(state): State<MockState>, Json(request): Json<JsonValue>) -> Response {
    let dir = request["path"].as_str().unwrap_or("/").trim_end_matches('/');
    let inner = state.inner.lock().unwrap();

    if let Some(status) = inner.list_status {
        return (status, "listing failed").into_response();
    }

    let mut content: Vec<JsonValue> = inner
        .files
        .iter()
        .filter_map(|(path, bytes)| {
            let name = path.strip_prefix(dir)?.strip_prefix('/')?;
            Some(json!({
                "name": name,
                "size": bytes.len(),
                "is_dir": false,
                "modified": "2024-05-01T10:00:00Z",
            }))
        })
        .collect();
    content.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    Json(json!({
        "code": 200,
        "message": "success",
        "data": { "content": content, "total": content.len() }
    }))
    .into_response()
}

async fn handle_remove(
    State(state): State<MockState>,
    Json(request): Json<JsonValue>,
) -> Json<JsonValue> {
    let dir = request["dir"].as_str().unwrap_or("/").trim_end_matches('/').to_string();
    let mut inner = state.inner.lock().unwrap();
    if let Some(names) = request["names"].as_array() {
        for name in names.iter().filter_map(JsonValue::as_str) {
            inner.files.remove(&format!("{}/{}", dir, name));
        }
    }
    inner.delete_requests.push(request);
    Json(json!({"code": 200, "message": "success", "data": null}))
}

async fn handle_download(State(state): State<MockState>, Path(path): Path<String>) -> Response {
    let inner = state.inner.lock().unwrap();
    match inner.files.get(&format!("/{}", path)) {
        Some(content) => content.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_endpoint_download(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let path = params.get("path").cloned();
    let mut inner = state.inner.lock().unwrap();
    inner.download_requests.push(RecordedDownload {
        path: path.clone(),
        authorization: header_string(&headers, "authorization"),
    });

    let content = path.and_then(|p| inner.files.get(&format!("/{}", p)).cloned());
    match content {
        Some(content) => content.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

//! Loopback fixture API for exercising the real transport.
//!
//! # Design
//! A small GitHub-flavoured API: a seeded user directory behind an envelope
//! (`/search/users`), per-status error bodies, an echo endpoint that reflects
//! whatever encoding the client chose, a multipart summary, a deliberately
//! slow route for cancellation and a counter-backed flaky route for retries.
//! Error bodies always carry a `message` field.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub login: String,
    pub site_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub total_count: usize,
    pub items: Vec<User>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub json: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadSummary {
    pub files: Vec<UploadedFile>,
    pub fields: BTreeMap<String, String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct SlowQuery {
    #[serde(default = "default_delay_ms")]
    pub ms: u64,
}

fn default_delay_ms() -> u64 {
    2_000
}

#[derive(Deserialize)]
pub struct FlakyQuery {
    #[serde(default)]
    pub fail: u32,
}

#[derive(Clone, Default)]
pub struct AppState {
    users: Arc<RwLock<BTreeMap<String, User>>>,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
}

impl AppState {
    pub fn seeded() -> Self {
        let users = (1u64..)
            .zip(["octocat", "hubot", "monalisa", "rustacean"])
            .map(|(id, login)| {
                let user = User {
                    id,
                    login: login.to_string(),
                    site_admin: id == 1,
                };
                (user.login.clone(), user)
            })
            .collect();
        Self {
            users: Arc::new(RwLock::new(users)),
            attempts: Arc::default(),
        }
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/search/users", get(search_users))
        .route("/users/{login}", get(get_user).delete(delete_user))
        .route("/status/{code}", any(status))
        .route("/echo", any(echo))
        .route("/upload", post(upload))
        .route("/slow", get(slow))
        .route("/flaky/{key}", get(flaky))
        .with_state(AppState::seeded())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<SearchResult> {
    let users = state.users.read().await;
    let items: Vec<User> = users
        .values()
        .filter(|u| u.login.contains(&query.q))
        .cloned()
        .collect();
    Json(SearchResult {
        total_count: items.len(),
        items,
    })
}

async fn get_user(State(state): State<AppState>, Path(login): Path<String>) -> Response {
    match state.users.read().await.get(&login) {
        Some(user) => Json(user.clone()).into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(login): Path<String>,
) -> Response {
    if !headers.contains_key("authorization") {
        return error(StatusCode::UNAUTHORIZED, "Requires authentication");
    }
    match state.users.write().await.remove(&login) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => error(status, status.canonical_reason().unwrap_or("Unknown")),
        Err(_) => error(StatusCode::BAD_REQUEST, "Invalid status code"),
    }
}

async fn echo(
    method: Method,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let json = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(json) => json,
            Err(_) => return error(StatusCode::BAD_REQUEST, "Problems parsing JSON"),
        }
    };
    let headers = headers
        .iter()
        .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
        .collect();
    Json(Echo {
        method: method.to_string(),
        query,
        headers,
        json,
    })
    .into_response()
}

async fn upload(mut multipart: Multipart) -> Response {
    let mut summary = UploadSummary {
        files: Vec::new(),
        fields: BTreeMap::new(),
    };
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return error(StatusCode::BAD_REQUEST, &err.body_text()),
        };
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(err) => return error(StatusCode::BAD_REQUEST, &err.body_text()),
        };
        if filename.is_some() {
            summary.files.push(UploadedFile {
                name,
                filename,
                content_type,
                size: data.len(),
            });
        } else {
            summary
                .fields
                .insert(name, String::from_utf8_lossy(&data).into_owned());
        }
    }
    tracing::info!(files = summary.files.len(), fields = summary.fields.len(), "upload received");
    (StatusCode::CREATED, Json(summary)).into_response()
}

async fn slow(Query(query): Query<SlowQuery>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(query.ms)).await;
    Json(json!({ "done": true }))
}

/// Fails with 503 until `key` has been requested more than `fail` times.
async fn flaky(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<FlakyQuery>,
) -> Response {
    let attempt = {
        let mut attempts = state.attempts.lock().await;
        let count = attempts.entry(key).or_default();
        *count += 1;
        *count
    };
    if attempt <= query.fail {
        error(StatusCode::SERVICE_UNAVAILABLE, "Try again later")
    } else {
        Json(json!({ "attempts": attempt })).into_response()
    }
}

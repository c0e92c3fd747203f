// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub(crate) mod constants;
pub mod error;
pub mod store;
pub mod upload;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Router,
    extract::{DefaultBodyLimit, Path as UrlPath, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, post},
};
use constants::*;

use rand::RngExt;
use sha2::{Digest, Sha256};
use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio::fs;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{debug, info};

use crate::protocol::{
    ApiResult, BLOCK_PATH, BlocklistSnapshot, CSRF_HEADER, CUSTOM_PATH, CustomCreateRequest,
    FIXED_PATH, FixedToggleRequest,
};
use crate::web::error::WebError;
use crate::web::store::BlockStore;

#[derive(Clone)]
pub struct AppState {
    pub upload_dir: PathBuf,
    pub store: Arc<BlockStore>,
    pub csrf_secret: String,
}

impl AppState {
    pub fn new(upload_dir: PathBuf, block_config: PathBuf, csrf_secret: String) -> Self {
        Self {
            upload_dir,
            store: Arc::new(BlockStore::new(block_config)),
            csrf_secret,
        }
    }
}

/// Where the server listens and keeps its files.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub upload_dir: PathBuf,
    pub block_config: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN_ADDRESS.to_string(),
            upload_dir: PathBuf::from("data"),
            block_config: PathBuf::from("block_config.json"),
        }
    }
}

#[derive(Debug)]
struct FixedView {
    ext: String,
    checked: bool,
}

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
struct IndexTemplate {
    fixed: Vec<FixedView>,
    custom: Vec<String>,
    custom_count: usize,
    max_custom: usize,
    csrf_token: String,
}

fn sign(payload: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// `timestamp:nonce:signature`, valid for an hour.
pub(crate) fn generate_csrf_token(secret: &str) -> String {
    let nonce: u64 = rand::rng().random();
    let payload = format!("{}:{nonce}", unix_now());
    let signature = sign(&payload, secret);
    format!("{payload}:{signature}")
}

pub(crate) fn validate_csrf_token(token: &str, secret: &str) -> Result<(), WebError> {
    let invalid = || WebError::Forbidden("Invalid CSRF Token".to_string());

    let mut parts = token.split(':');
    let (Some(timestamp), Some(nonce), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let issued: u64 = timestamp.parse().map_err(|_| invalid())?;
    let now = unix_now();
    if now.saturating_sub(issued) > CSRF_TOKEN_MAX_AGE_SECS {
        debug!(issued, now, "CSRF token expired");
        return Err(invalid());
    }

    if sign(&format!("{timestamp}:{nonce}"), secret) == signature {
        Ok(())
    } else {
        Err(invalid())
    }
}

fn require_csrf(headers: &HeaderMap, secret: &str) -> Result<(), WebError> {
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| WebError::Forbidden("Invalid CSRF Token".to_string()))?;
    validate_csrf_token(token, secret)
}

async fn index(State(state): State<AppState>) -> Result<IndexTemplate, WebError> {
    let cfg = state.store.load().await?;
    Ok(IndexTemplate {
        fixed: cfg
            .fixed
            .into_iter()
            .map(|(ext, checked)| FixedView { ext, checked })
            .collect(),
        custom_count: cfg.custom.len(),
        custom: cfg.custom,
        max_custom: crate::gatekeeper::extension::MAX_CUSTOM_EXTENSIONS,
        csrf_token: generate_csrf_token(&state.csrf_secret),
    })
}

async fn get_blocklist(State(state): State<AppState>) -> Result<Json<BlocklistSnapshot>, WebError> {
    let cfg = state.store.load().await?;
    Ok(Json(BlocklistSnapshot {
        fixed: cfg.fixed,
        custom: cfg.custom,
        csrf_token: Some(generate_csrf_token(&state.csrf_secret)),
    }))
}

async fn set_fixed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<FixedToggleRequest>,
) -> Result<Json<ApiResult>, WebError> {
    require_csrf(&headers, &state.csrf_secret)?;
    let result = state.store.set_fixed(&body.ext, body.checked).await?;
    info!(ext = %body.ext, checked = body.checked, success = result.success, "Fixed extension toggled");
    Ok(Json(result))
}

async fn add_custom(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CustomCreateRequest>,
) -> Result<Json<ApiResult>, WebError> {
    require_csrf(&headers, &state.csrf_secret)?;
    let result = state.store.add_custom(&body.ext).await?;
    info!(ext = %body.ext, success = result.success, error = ?result.error, "Custom extension add requested");
    Ok(Json(result))
}

async fn remove_custom(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(ext): UrlPath<String>,
) -> Result<Json<ApiResult>, WebError> {
    require_csrf(&headers, &state.csrf_secret)?;
    let result = state.store.remove_custom(&ext).await?;
    info!(ext = %ext, "Custom extension removed");
    Ok(Json(result))
}

async fn handler_404() -> WebError {
    WebError::NotFound("Not found".to_string())
}

pub fn create_router(state: AppState) -> Router {
    let data_dir = ServeDir::new(&state.upload_dir);
    Router::new()
        .route("/", get(index))
        .route(BLOCK_PATH, get(get_blocklist))
        .route(FIXED_PATH, post(set_fixed))
        .route(CUSTOM_PATH, post(add_custom))
        .route(&format!("{CUSTOM_PATH}/{{ext}}"), delete(remove_custom))
        .route("/upload", get(upload::list_files).post(upload::upload_file))
        .route("/delete/{filename}", delete(upload::delete_file))
        .nest_service("/data", data_dir)
        .fallback(handler_404)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Binds `config.listen`, returning the listener and the address actually bound.
pub async fn bind(config: &ServerConfig) -> Result<(TcpListener, SocketAddr), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(config.listen.as_str()).await?;
    let address = listener.local_addr()?;
    Ok((listener, address))
}

pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.upload_dir).await?;

    let csrf_secret = hex::encode(rand::rng().random::<[u8; 32]>());
    let state = AppState::new(config.upload_dir, config.block_config, csrf_secret);
    let app = create_router(state);

    axum::serve(listener, app).await?;
    Ok(())
}

pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (listener, address) = bind(&config).await?;
    info!(
        "Web server listening on http://{}, press Ctrl+C to stop",
        address
    );
    serve(listener, config).await
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Upload endpoints. Every stored file is checked against the allowed list and
//! the current blocklist, whatever the browser-side filter decided.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::{
    extract::{Multipart, Path as UrlPath, State},
    response::Json,
};
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::AppState;
use super::constants::{IGNORED_FILES, NOT_ALLOWED_MSG, is_allowed_extension};
use super::error::WebError;
use crate::gatekeeper::extension::Blocklist;

/// One entry of an upload or listing response, in the shape the upload widget reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResult {
    fn stored(name: &str, content_type: Option<String>, size: u64) -> Self {
        let encoded = urlencoding::encode(name);
        Self {
            name: name.to_string(),
            content_type,
            size,
            url: Some(format!("/data/{encoded}")),
            delete_url: Some(format!("/delete/{encoded}")),
            delete_type: Some("DELETE".to_string()),
            error: None,
        }
    }

    fn rejected(name: &str, content_type: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            content_type,
            size: 0,
            url: None,
            delete_url: None,
            delete_type: None,
            error: Some(NOT_ALLOWED_MSG.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<FileResult>,
}

/// Needs an extension, the extension must be allowed, and it must not be blocked.
pub(crate) fn is_upload_allowed(file_name: &str, blocklist: &Blocklist) -> bool {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    is_allowed_extension(ext) && !blocklist.contains(ext)
}

/// Reduces a client-supplied name to a safe single path component.
pub(crate) fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `a.txt`, then `a_1.txt`, `a_2.txt`, ... for `counter` 0, 1, 2, ...
fn numbered_name(file_name: &str, counter: u32) -> String {
    if counter == 0 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{counter}.{ext}"),
        _ => format!("{file_name}_{counter}"),
    }
}

/// Writes `data` to the first free numbered variant of `file_name` in `dir` and
/// returns the name used. Names are claimed with `create_new`, so two uploads
/// never end up sharing one.
pub(crate) async fn store_unique(
    dir: &Path,
    file_name: &str,
    data: &[u8],
) -> Result<String, WebError> {
    let mut counter = 0u32;
    loop {
        let candidate = numbered_name(file_name, counter);
        let opened = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&candidate))
            .await;
        match opened {
            Ok(mut file) => {
                file.write_all(data).await?;
                file.flush().await?;
                return Ok(candidate);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => counter += 1,
            Err(err) => return Err(err.into()),
        }
    }
}

/// Resolves `file_name` inside `base_dir`, refusing anything that escapes it.
fn resolve_stored_file(base_dir: &Path, file_name: &str) -> Result<PathBuf, WebError> {
    let canonical_base = base_dir
        .canonicalize()
        .map_err(|e| WebError::Internal(format!("Upload directory error: {e}")))?;
    let canonical_full = base_dir
        .join(file_name)
        .canonicalize()
        .map_err(|_| WebError::NotFound(format!("{file_name} not found")))?;

    if !canonical_full.starts_with(&canonical_base) {
        warn!("Path traversal attempt detected: {file_name}");
        return Err(WebError::BadRequest(
            "Path outside upload directory".to_string(),
        ));
    }
    if !canonical_full.is_file() {
        return Err(WebError::NotFound(format!("{file_name} not found")));
    }
    Ok(canonical_full)
}

/// Stores every `file` field of the form, one result per field in form order.
pub(crate) async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileList>, WebError> {
    let blocklist = state.store.load().await?.blocklist();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let safe_name = secure_filename(&original);

        if !is_upload_allowed(&original, &blocklist) {
            warn!(file = %original, "Refused upload with disallowed extension");
            files.push(FileResult::rejected(&safe_name, content_type));
            continue;
        }

        let data = field.bytes().await?;
        let file_name = store_unique(&state.upload_dir, &safe_name, &data).await?;
        info!(file = %file_name, size = data.len(), "Stored upload");
        files.push(FileResult::stored(
            &file_name,
            content_type,
            data.len() as u64,
        ));
    }

    if files.is_empty() {
        return Err(WebError::BadRequest("Missing file field".to_string()));
    }
    Ok(Json(FileList { files }))
}

pub(crate) async fn list_files(State(state): State<AppState>) -> Result<Json<FileList>, WebError> {
    let mut entries = fs::read_dir(&state.upload_dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || IGNORED_FILES.contains(&name.as_str()) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        files.push(FileResult::stored(&name, None, metadata.len()));
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(FileList { files }))
}

pub(crate) async fn delete_file(
    State(state): State<AppState>,
    UrlPath(file_name): UrlPath<String>,
) -> Result<Json<BTreeMap<String, String>>, WebError> {
    let full_path = resolve_stored_file(&state.upload_dir, &file_name)?;

    let outcome = match fs::remove_file(&full_path).await {
        Ok(()) => {
            info!(file = %file_name, "Deleted upload");
            "True"
        }
        Err(err) => {
            warn!(file = %file_name, error = %err, "Failed to delete upload");
            "False"
        }
    };
    Ok(Json(BTreeMap::from([(file_name, outcome.to_string())])))
}

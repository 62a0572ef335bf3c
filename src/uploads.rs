//! Stored uploads: blog images and shared documents
//!
//! Files live under `upload_dir/<kind>/<uuid>_<name>`; rows keep the public
//! path `/uploads/<kind>/<uuid>_<name>`.

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::{AppError, AppResult};

pub const IMAGE_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];
pub const DOCUMENT_EXTENSIONS: [&str; 6] = [".pdf", ".doc", ".docx", ".txt", ".xls", ".xlsx"];

/// Largest accepted document (10 MiB)
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

const PUBLIC_PREFIX: &str = "/uploads/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Blogs,
    Documents,
}

impl UploadKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            UploadKind::Blogs => "blogs",
            UploadKind::Documents => "documents",
        }
    }
}

/// A file part of a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Multipart form split into text fields and files
#[derive(Debug, Clone, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_file(mut self, name: &str, file_name: &str, bytes: impl Into<Bytes>) -> Self {
        self.files.insert(
            name.to_string(),
            UploadedFile {
                file_name: file_name.to_string(),
                bytes: bytes.into(),
            },
        );
        self
    }

    /// Trimmed text field, `None` when missing or blank
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Read a whole multipart form into memory
pub async fn read_form(mut multipart: Multipart) -> AppResult<FormData> {
    let mut form = FormData::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match field.file_name().map(str::to_string) {
            // Browsers send an empty part for an untouched file input
            Some(file_name) if file_name.is_empty() => {}
            Some(file_name) => {
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    form.files.insert(name, UploadedFile { file_name, bytes });
                }
            }
            None => {
                let text = field.text().await.map_err(multipart_error)?;
                form.fields.insert(name, text);
            }
        }
    }

    Ok(form)
}

/// Lower-cased extension including the dot, or empty
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

pub fn is_allowed(file_name: &str, allowed: &[&str]) -> bool {
    let ext = extension_of(file_name);
    allowed.iter().any(|a| *a == ext)
}

/// Base name of a client-supplied file name with unsafe characters replaced
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Write an upload and return its public path
pub async fn store(
    root: &Path,
    kind: UploadKind,
    file_name: &str,
    bytes: &[u8],
) -> std::io::Result<String> {
    let dir = root.join(kind.dir_name());
    fs::create_dir_all(&dir).await?;

    let stored = format!("{}_{}", uuid::Uuid::new_v4(), sanitize_file_name(file_name));
    fs::write(dir.join(&stored), bytes).await?;

    Ok(format!("{}{}/{}", PUBLIC_PREFIX, kind.dir_name(), stored))
}

/// Map a public path back to a location under `root`
pub fn resolve(root: &Path, public_path: &str) -> Option<PathBuf> {
    let relative = public_path.strip_prefix(PUBLIC_PREFIX)?;
    let relative = Path::new(relative);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe || relative.as_os_str().is_empty() {
        return None;
    }
    Some(root.join(relative))
}

/// Delete a stored upload if it exists
pub async fn remove(root: &Path, public_path: &str) {
    let Some(path) = resolve(root, public_path) else {
        return;
    };
    match fs::remove_file(&path).await {
        Ok(()) => tracing::debug!("Removed upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove upload {}: {}", path.display(), e),
    }
}

/// Remove a freshly stored upload when the write referencing it failed
pub async fn discard_on_err<T, E>(root: &Path, stored: Option<&str>, result: Result<T, E>) -> Result<T, E> {
    if let (Err(_), Some(public_path)) = (&result, stored) {
        remove(root, public_path).await;
    }
    result
}

/// Original name of a stored file (the part after `<uuid>_`)
pub fn display_name(public_path: &str) -> &str {
    let stored = public_path.rsplit('/').next().unwrap_or(public_path);
    match stored.split_once('_') {
        Some((prefix, rest)) if uuid::Uuid::parse_str(prefix).is_ok() => rest,
        _ => stored,
    }
}

pub fn mime_type(file_name: &str) -> &'static str {
    match extension_of(file_name).as_str() {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".pdf" => "application/pdf",
        ".txt" => "text/plain",
        ".doc" => "application/msword",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".xls" => "application/vnd.ms-excel",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

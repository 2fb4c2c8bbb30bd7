//! Multipart parsing and image validation for report submissions.

use std::path::{Path, PathBuf};

use axum::{
    extract::multipart::{Field, Multipart, MultipartError},
    http::{StatusCode, header},
};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::reports::ReportForm;

/// Largest accepted image.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Transport limit for report submissions. Kept above [`MAX_IMAGE_BYTES`] so
/// oversized images reach the workflow and get a proper error.
pub const MAX_REPORT_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Only this many leading bytes are inspected when sniffing.
const SNIFF_LEN: usize = 512;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = b"\xff\xd8\xff";

const MAX_BASENAME_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }
}

/// Identify the image type from content alone; names and client-declared
/// content types are ignored.
pub fn sniff_image(bytes: &[u8]) -> Option<ImageKind> {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    if head.starts_with(PNG_SIGNATURE) {
        Some(ImageKind::Png)
    } else if head.starts_with(JPEG_SIGNATURE) {
        Some(ImageKind::Jpeg)
    } else {
        None
    }
}

/// Reduce a client-supplied file name to a safe basename: directories and
/// traversal are stripped and anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let normalized = name.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return "upload".to_string();
    }
    // ASCII only at this point, so byte slicing is safe
    cleaned[..cleaned.len().min(MAX_BASENAME_LEN)].to_string()
}

/// `<unix-nanos>_<sanitized basename>`
pub fn stored_filename(original: &str, now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros());
    format!("{}_{}", nanos, sanitize_filename(original))
}

/// A validated image held in memory until the report itself validates.
#[derive(Debug)]
pub struct UploadedImage {
    pub file_name: String,
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

/// Where an image ended up on disk and the URL it is served under.
#[derive(Debug)]
pub struct StoredImage {
    pub path: PathBuf,
    pub url: String,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::validation(err.body_text())
    }
}

/// Read a field's body, giving up as soon as more than `limit` bytes arrive.
/// This is what enforces the limit when the part declares no size.
async fn read_limited(field: &mut Field<'_>, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

fn declared_size(field: &Field<'_>) -> Option<u64> {
    field
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

async fn read_image(mut field: Field<'_>) -> Result<Option<UploadedImage>, ApiError> {
    let file_name = field.file_name().unwrap_or_default().to_string();

    if declared_size(&field).is_some_and(|size| size > MAX_IMAGE_BYTES as u64) {
        return Err(ApiError::PayloadTooLarge);
    }

    let bytes = read_limited(&mut field, MAX_IMAGE_BYTES).await?;

    // Browsers send an empty, unnamed part when no file was chosen
    if bytes.is_empty() && file_name.is_empty() {
        return Ok(None);
    }

    let kind = sniff_image(&bytes).ok_or(ApiError::InvalidFileType)?;

    Ok(Some(UploadedImage {
        file_name,
        kind,
        bytes,
    }))
}

/// Collect the text fields and the optional `image` part of a multipart
/// report submission. Unknown fields are skipped.
pub async fn read_report_form(
    mut multipart: Multipart,
) -> Result<(ReportForm, Option<UploadedImage>), ApiError> {
    let mut form = ReportForm::default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "location" => form.location = field.text().await.map_err(multipart_error)?,
            "description" => form.description = field.text().await.map_err(multipart_error)?,
            "category" => form.category = field.text().await.map_err(multipart_error)?,
            "image" => image = read_image(field).await?,
            _ => {}
        }
    }

    Ok((form, image))
}

/// Write the image under `dir` and return its `/uploads/...` URL.
pub async fn save_image(dir: &Path, image: &UploadedImage) -> Result<StoredImage, ApiError> {
    save_image_at(dir, image, Utc::now()).await
}

async fn save_image_at(
    dir: &Path,
    image: &UploadedImage,
    now: DateTime<Utc>,
) -> Result<StoredImage, ApiError> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", dir.display(), e);
        anyhow::anyhow!("could not create upload dir")
    })?;

    let file_name = stored_filename(&image.file_name, now);
    let path = dir.join(&file_name);

    // A name collision fails rather than overwriting an earlier upload
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(|e| {
            error!("Failed to create file {}: {}", path.display(), e);
            anyhow::anyhow!("could not save uploaded file")
        })?;
    file.write_all(&image.bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        anyhow::anyhow!("could not save uploaded file")
    })?;
    file.flush().await.map_err(|e| {
        error!("Failed to flush file {}: {}", path.display(), e);
        anyhow::anyhow!("could not save uploaded file")
    })?;

    debug!("Saved {} upload ({} bytes) to {}", image.kind.mime(), image.bytes.len(), path.display());

    Ok(StoredImage {
        url: format!("/uploads/{}", file_name),
        path,
    })
}

/// Best-effort removal of an image whose report could not be stored.
pub async fn discard_image(image: &StoredImage) {
    if let Err(e) = tokio::fs::remove_file(&image.path).await {
        warn!("Failed to remove orphaned upload {}: {}", image.path.display(), e);
    }
}

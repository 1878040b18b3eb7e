//! Admin image uploads onto the local public directory.

use std::path::PathBuf;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::routes::auth::AdminUser;
use crate::AppState;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Upload destinations are enumerated; nothing lands outside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCategory {
    BrandLogo,
    ProductImage,
}

impl UploadCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "brand-logo" => Some(Self::BrandLogo),
            "product-image" => Some(Self::ProductImage),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrandLogo => "brand-logo",
            Self::ProductImage => "product-image",
        }
    }
}

fn category_dir(public_dir: &str, category: UploadCategory) -> PathBuf {
    PathBuf::from(public_dir).join("uploads").join(category.as_str())
}

async fn upload_image(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(category): Path<String>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let category = UploadCategory::parse(&category)
        .ok_or_else(|| AppError::BadRequest(format!("unknown upload category {category}")))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .ok_or_else(|| AppError::BadRequest("file field has no filename".into()))?
            .to_string();
        let ext = filename
            .rsplit('.')
            .next()
            .map(str::to_lowercase)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| AppError::BadRequest(format!("unsupported file type: {filename}")))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        if data.is_empty() {
            return Err(AppError::BadRequest("empty file".into()));
        }

        let stored = format!("{}.{}", Uuid::now_v7(), ext);
        let dir = category_dir(&s.config.public_dir, category);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored), &data).await?;

        let url = format!("/public/uploads/{}/{}", category.as_str(), stored);
        tracing::info!("stored upload {url}");
        return Ok((StatusCode::CREATED, Json(serde_json::json!({ "url": url }))));
    }
    Err(AppError::BadRequest("missing file field".into()))
}

#[derive(Debug, Deserialize)]
pub struct DeleteUploadRequest {
    pub url: String,
}

/// Delete a previously uploaded file. The url must point inside one of
/// the enumerated category roots; anything else is rejected.
async fn delete_image(
    State(s): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<DeleteUploadRequest>,
) -> Result<StatusCode> {
    let rest = req
        .url
        .strip_prefix("/public/uploads/")
        .ok_or_else(|| AppError::BadRequest("url is not an upload path".into()))?;
    let (category, filename) = rest
        .split_once('/')
        .ok_or_else(|| AppError::BadRequest("url is not an upload path".into()))?;
    let category = UploadCategory::parse(category)
        .ok_or_else(|| AppError::BadRequest(format!("unknown upload category {category}")))?;
    if filename.is_empty() || filename.contains('/') || filename.contains("..") {
        return Err(AppError::BadRequest("invalid upload filename".into()));
    }
    let path = category_dir(&s.config.public_dir, category).join(filename);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound("upload")),
        Err(e) => Err(e.into()),
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/uploads/:category", post(upload_image))
        .route("/admin/uploads", delete(delete_image))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_round_trips() {
        for c in [UploadCategory::BrandLogo, UploadCategory::ProductImage] {
            assert_eq!(UploadCategory::parse(c.as_str()), Some(c));
        }
        assert!(UploadCategory::parse("avatars").is_none());
    }
}

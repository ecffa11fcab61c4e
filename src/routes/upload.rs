/**
 * Upload Routes
 * Authenticated image uploads, stored under the configured upload directory
 */
use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    routes::DataResponse,
    session::require_session,
    AppState,
};

pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB

const FILE_FIELD: &str = "file";
const INVALID_TYPE: &str = "Invalid file type. Allowed types: JPEG, PNG, GIF, WebP, SVG";
const TOO_LARGE: &str = "File is too large. Maximum size is 5MB";

/// How far into a document to look for the `<svg` root.
const SVG_SNIFF_WINDOW: usize = 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub url: String,
    pub filename: String,
    pub original_filename: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: usize,
}

fn is_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SVG_SNIFF_WINDOW)];
    let Ok(text) = std::str::from_utf8(head) else {
        // The window may cut a multi-byte character; fall back to lossy.
        return String::from_utf8_lossy(head).contains("<svg");
    };
    let text = text.trim_start_matches('\u{FEFF}').trim_start();
    (text.starts_with("<svg") || text.starts_with("<?xml") || text.starts_with("<!DOCTYPE svg"))
        && text.contains("<svg")
}

/// Identify an allowed image type from its leading bytes.
fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ if is_svg(bytes) => Some("image/svg+xml"),
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

/// Keep only the final path component of a client-supplied name.
fn display_name(name: Option<&str>) -> String {
    name.and_then(|n| n.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("upload")
        .to_string()
}

/// POST /api/uploads - multipart field `file`
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let session = require_session(&state.config, &headers)?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!(error = %e, "multipart error");
        ApiError::bad_request("Invalid multipart data")
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_filename = display_name(field.file_name());
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to read upload");
            ApiError::bad_request(TOO_LARGE)
        })?;
        upload = Some((original_filename, bytes));
        break;
    }

    let Some((original_filename, bytes)) = upload.filter(|(_, b)| !b.is_empty()) else {
        return Err(ApiError::bad_request("No file provided"));
    };

    if bytes.len() > MAX_FILE_SIZE {
        return Err(ApiError::bad_request(TOO_LARGE));
    }

    let mime_type = sniff_image_type(&bytes).ok_or_else(|| ApiError::bad_request(INVALID_TYPE))?;

    tokio::fs::create_dir_all(&state.config.upload_dir)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create upload directory: {}", e);
            ApiError::Internal("Failed to upload file".to_string())
        })?;

    let filename = format!("{}.{}", Uuid::new_v4(), extension_for(mime_type));
    let file_path = state.config.upload_dir.join(&filename);

    tokio::fs::write(&file_path, &bytes).await.map_err(|e| {
        tracing::error!("Failed to write upload file: {}", e);
        ApiError::Internal("Failed to upload file".to_string())
    })?;

    tracing::info!(
        file = %filename,
        size = bytes.len(),
        by = %session.user.email,
        "file uploaded"
    );

    Ok(Json(DataResponse::with_message(
        "File uploaded successfully",
        UploadedFile {
            url: format!("/uploads/{}", filename),
            filename,
            original_filename,
            mime_type: mime_type.to_string(),
            size: bytes.len(),
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use crate::test_support::{app, token};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn multipart_request(token: Option<&str>, field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "X-PORTFOLIO-BOUNDARY";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"{n}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = field,
                n = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        let mut builder = Request::post("/api/uploads").header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        );
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_sniff_image_types() {
        assert_eq!(sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_image_type(PNG), Some("image/png"));
        assert_eq!(sniff_image_type(b"GIF89a...."), Some("image/gif"));
        assert_eq!(sniff_image_type(b"RIFF\x10\x00\x00\x00WEBPVP8 "), Some("image/webp"));
        assert_eq!(
            sniff_image_type(b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
            Some("image/svg+xml")
        );
        assert_eq!(sniff_image_type(b"  <svg></svg>"), Some("image/svg+xml"));
        assert_eq!(sniff_image_type(b"<html><body>hi</body></html>"), None);
        assert_eq!(sniff_image_type(b"%PDF-1.7"), None);
    }

    #[test]
    fn test_display_name_strips_directories() {
        assert_eq!(display_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(display_name(Some("C:\\photos\\me.png")), "me.png");
        assert_eq!(display_name(None), "upload");
    }

    #[tokio::test]
    async fn test_upload_requires_session() {
        let res = app()
            .await
            .oneshot(multipart_request(None, "file", "a.png", PNG))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_rejects_disallowed_content() {
        let editor = token(Role::Editor);
        let res = app()
            .await
            .oneshot(multipart_request(Some(&editor), "file", "a.png", b"not an image"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(res).await["message"], INVALID_TYPE);
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let editor = token(Role::Editor);
        let res = app()
            .await
            .oneshot(multipart_request(Some(&editor), "other", "a.png", PNG))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(res).await["message"], "No file provided");
    }

    #[tokio::test]
    async fn test_upload_stores_png_under_uuid_name() {
        let editor = token(Role::Editor);
        let res = app()
            .await
            .oneshot(multipart_request(Some(&editor), "file", "photo.png", PNG))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = json(res).await;
        let filename = body["data"]["filename"].as_str().unwrap().to_string();
        assert!(filename.ends_with(".png"));
        assert_eq!(body["data"]["url"], format!("/uploads/{}", filename));
        assert_eq!(body["data"]["originalFilename"], "photo.png");
        assert_eq!(body["data"]["type"], "image/png");
        assert_eq!(body["data"]["size"], PNG.len());

        let stored = std::env::temp_dir()
            .join("portfolio-cms-test-uploads")
            .join(&filename);
        assert_eq!(tokio::fs::read(&stored).await.unwrap(), PNG);
        let _ = tokio::fs::remove_file(stored).await;
    }
}

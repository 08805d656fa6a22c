/**
 * Upload Routes
 * Cover-image upload for posts. The image is a follow-up write tied to an
 * existing post id: a post created moments earlier can exist without its
 * cover if this request fails, and nothing rolls the post back.
 */
use axum::{
    extract::{Multipart, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::routes::auth::{get_pool_or_unavailable, require_admin};
use crate::routes::{api_error, ApiError, MessageResponse};

const MAX_FILE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Sniff the upload's magic bytes; the client-supplied content type is not
/// trusted.
fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

/// POST /api/upload/:postId - attach a cover image to a post (admin only).
/// Expects a multipart body with an `image` field.
pub async fn upload_image(
    headers: HeaderMap,
    Path(post_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers).await?;

    let post_id = post_id
        .parse::<Uuid>()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Post not found"))?;

    let mut image: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                return Err(api_error(StatusCode::BAD_REQUEST, "Malformed upload"));
            }
        };

        if field.name() != Some("image") {
            continue;
        }

        let filename = field.file_name().unwrap_or("cover").to_string();
        let bytes = field.bytes().await.map_err(|e| {
            tracing::error!("Failed to read upload body: {}", e);
            api_error(StatusCode::BAD_REQUEST, "Malformed upload")
        })?;
        image = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = image
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "No file uploaded."))?;

    if bytes.len() > MAX_FILE_SIZE {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "File too large. Maximum size is 5MB",
        ));
    }

    if validate_image_magic_bytes(&bytes).is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "File is not a supported image format",
        ));
    }

    let pool = get_pool_or_unavailable()?;

    let result = sqlx::query(
        "UPDATE posts SET cover_image = $1, cover_image_name = $2 WHERE id = $3",
    )
    .bind(&bytes)
    .bind(&filename)
    .bind(post_id)
    .execute(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error storing cover image: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;

    if result.rows_affected() == 0 {
        return Err(api_error(StatusCode::NOT_FOUND, "Post not found"));
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Image uploaded successfully".to_string(),
        }),
    ))
}

/**
 * User Routes
 * Public profile reads plus the authenticated about-image update.
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{User, UserResponse};
use crate::routes::auth::{authenticate, current_user, get_pool_or_unavailable};
use crate::routes::{api_error, ApiError};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAboutImageRequest {
    pub about_image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfileResponse {
    pub result: UserResponse,
    pub message: String,
}

/// GET /api/user/public-profile
/// The portfolio owner's profile: the admin user is the site owner.
pub async fn get_public_profile() -> Result<impl IntoResponse, ApiError> {
    let pool = get_pool_or_unavailable()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, first_name, last_name, email, password_hash, role,
               phone, website, city, state, country, profile_picture, about_image, created_at
        FROM users
        WHERE role = 'admin'
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error loading public profile: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Admin user not found"))?;

    Ok((StatusCode::OK, Json(UserResponse::from(user))))
}

/// GET /api/user/:id
pub async fn get_user(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let user_id = id
        .parse::<Uuid>()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "User not found"))?;
    let pool = get_pool_or_unavailable()?;

    let user = current_user(pool.as_ref(), user_id).await?;

    Ok((StatusCode::OK, Json(UserResponse::from(user))))
}

/// PATCH /api/user/about-image
/// Replaces the stored about-image path. The previous file, if any, is
/// unlinked best-effort; a failed unlink only logs.
pub async fn update_about_image(
    headers: HeaderMap,
    Json(payload): Json<UpdateAboutImageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = authenticate(&headers)?;
    let pool = get_pool_or_unavailable()?;
    let user = current_user(pool.as_ref(), user_id).await?;

    if let Some(ref old_image) = user.about_image {
        if *old_image != payload.about_image {
            if let Err(e) = tokio::fs::remove_file(old_image).await {
                tracing::warn!("Failed to delete old about image {}: {}", old_image, e);
            }
        }
    }

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET about_image = $1 WHERE id = $2
        RETURNING id, first_name, last_name, email, password_hash, role,
                  phone, website, city, state, country, profile_picture, about_image, created_at
        "#,
    )
    .bind(&payload.about_image)
    .bind(user.id)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update about image: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    })?;

    Ok((
        StatusCode::OK,
        Json(UserProfileResponse {
            result: updated.into(),
            message: "About image updated successfully".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, patch};
    use axum::Router;
    use tower::ServiceExt;

    fn users_router() -> Router {
        Router::new()
            .route("/api/user/public-profile", get(get_public_profile))
            .route("/api/user/about-image", patch(update_about_image))
            .route("/api/user/{id}", get(get_user))
    }

    #[tokio::test]
    async fn test_update_about_image_without_token_is_unauthenticated() {
        let body = serde_json::to_vec(&UpdateAboutImageRequest {
            about_image: "uploads/about.png".to_string(),
        })
        .unwrap();
        let req = Request::patch("/api/user/about-image")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let res = users_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_user_with_bad_id_is_not_found() {
        let req = Request::get("/api/user/not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let res = users_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_profile_without_database_is_unavailable() {
        let req = Request::get("/api/user/public-profile")
            .body(Body::empty())
            .unwrap();
        let res = users_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

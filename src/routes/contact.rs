/**
 * Contact Routes
 * Public write-once contact submissions. Messages are read out-of-band;
 * there is no update or delete surface.
 */
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::db::models::ContactMessage;
use crate::routes::auth::get_pool_or_unavailable;
use crate::routes::{api_error, ApiError};

#[derive(Debug, Deserialize, Serialize)]
pub struct CreateMessageRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// POST /api/contact
pub async fn create_message(
    Json(payload): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.message.trim().is_empty()
    {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide all required fields",
        ));
    }

    let pool = get_pool_or_unavailable()?;

    let message = sqlx::query_as::<_, ContactMessage>(
        r#"
        INSERT INTO contact_messages (name, email, message)
        VALUES ($1, $2, $3)
        RETURNING id, name, email, message, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(&payload.message)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error saving contact message: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "An unknown error occurred")
    })?;

    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    use crate::routes::ErrorResponse;

    fn contact_router() -> Router {
        Router::new().route("/api/contact", post(create_message))
    }

    async fn post_json(
        app: Router,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let req = Request::post("/api/contact")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[tokio::test]
    async fn test_create_message_rejects_missing_fields() {
        let (status, bytes) = post_json(
            contact_router(),
            &CreateMessageRequest {
                name: "".to_string(),
                email: "a@x.com".to_string(),
                message: "hello".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Please provide all required fields");
    }

    #[tokio::test]
    async fn test_create_message_without_database_is_unavailable() {
        let (status, _) = post_json(
            contact_router(),
            &CreateMessageRequest {
                name: "Visitor".to_string(),
                email: "a@x.com".to_string(),
                message: "hello".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

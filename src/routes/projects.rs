/**
 * Project Routes
 * Portfolio entries: publicly readable, mutations admin-only. Projects
 * carry no ownership concept, only the role check.
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Project;
use crate::routes::auth::{get_pool_or_unavailable, require_admin};
use crate::routes::{api_error, ApiError, MessageResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for POST /api/projects. Repository and deployment links
/// use the literal "N/A" sentinel when intentionally absent; the server
/// stores whatever string the client sends.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
    pub frontend_repo: String,
    pub backend_repo: Option<String>,
    pub live_link: String,
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub tools_used: Vec<String>,
}

/// Request body for PATCH /api/projects/:id
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub frontend_repo: Option<String>,
    pub backend_repo: Option<String>,
    pub live_link: Option<String>,
    pub languages: Option<Vec<String>>,
    pub frameworks: Option<Vec<String>>,
    pub tools_used: Option<Vec<String>>,
}

fn parse_project_id(id: &str) -> Result<Uuid, ApiError> {
    id.parse::<Uuid>()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Project not found"))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/projects - public listing.
pub async fn list_projects() -> Result<impl IntoResponse, ApiError> {
    let pool = get_pool_or_unavailable()?;

    let projects = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, name, description, frontend_repo, backend_repo, live_link,
               languages, frameworks, tools_used, created_at
        FROM projects
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error listing projects: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;

    Ok((StatusCode::OK, Json(projects)))
}

/// GET /api/projects/:id - public lookup.
pub async fn get_project(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let project_id = parse_project_id(&id)?;
    let pool = get_pool_or_unavailable()?;

    let project = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, name, description, frontend_repo, backend_repo, live_link,
               languages, frameworks, tools_used, created_at
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error fetching project: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Project not found"))?;

    Ok((StatusCode::OK, Json(project)))
}

/// POST /api/projects - admin only.
pub async fn create_project(
    headers: HeaderMap,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers).await?;
    let pool = get_pool_or_unavailable()?;

    if payload.name.trim().is_empty()
        || payload.description.trim().is_empty()
        || payload.frontend_repo.trim().is_empty()
        || payload.live_link.trim().is_empty()
    {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide all required fields",
        ));
    }

    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (name, description, frontend_repo, backend_repo, live_link,
                              languages, frameworks, tools_used)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, name, description, frontend_repo, backend_repo, live_link,
                  languages, frameworks, tools_used, created_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(&payload.frontend_repo)
    .bind(&payload.backend_repo)
    .bind(&payload.live_link)
    .bind(&payload.languages)
    .bind(&payload.frameworks)
    .bind(&payload.tools_used)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error creating project: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;

    Ok((StatusCode::CREATED, Json(project)))
}

/// PATCH /api/projects/:id - admin only, merge semantics.
pub async fn update_project(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers).await?;
    let project_id = parse_project_id(&id)?;
    let pool = get_pool_or_unavailable()?;

    let existing = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, name, description, frontend_repo, backend_repo, live_link,
               languages, frameworks, tools_used, created_at
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error fetching project: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?
    .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Project not found"))?;

    let name = payload.name.unwrap_or(existing.name);
    let description = payload.description.unwrap_or(existing.description);
    let frontend_repo = payload.frontend_repo.unwrap_or(existing.frontend_repo);
    let backend_repo = payload.backend_repo.or(existing.backend_repo);
    let live_link = payload.live_link.unwrap_or(existing.live_link);
    let languages = payload.languages.unwrap_or(existing.languages);
    let frameworks = payload.frameworks.unwrap_or(existing.frameworks);
    let tools_used = payload.tools_used.unwrap_or(existing.tools_used);

    let project = sqlx::query_as::<_, Project>(
        r#"
        UPDATE projects
        SET name = $1, description = $2, frontend_repo = $3, backend_repo = $4,
            live_link = $5, languages = $6, frameworks = $7, tools_used = $8
        WHERE id = $9
        RETURNING id, name, description, frontend_repo, backend_repo, live_link,
                  languages, frameworks, tools_used, created_at
        "#,
    )
    .bind(&name)
    .bind(&description)
    .bind(&frontend_repo)
    .bind(&backend_repo)
    .bind(&live_link)
    .bind(&languages)
    .bind(&frameworks)
    .bind(&tools_used)
    .bind(project_id)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Database error updating project: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;

    Ok((StatusCode::OK, Json(project)))
}

/// DELETE /api/projects/:id - admin only.
pub async fn delete_project(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers).await?;
    let project_id = parse_project_id(&id)?;
    let pool = get_pool_or_unavailable()?;

    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(pool.as_ref())
        .await
        .map_err(|e| {
            tracing::error!("Database error deleting project: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        })?;

    if result.rows_affected() == 0 {
        return Err(api_error(StatusCode::NOT_FOUND, "Project not found"));
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Project deleted successfully.".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use crate::routes::ErrorResponse;

    fn projects_router() -> Router {
        Router::new()
            .route("/api/projects", get(list_projects).post(create_project))
            .route(
                "/api/projects/{id}",
                get(get_project).patch(update_project).delete(delete_project),
            )
    }

    fn sample_create() -> CreateProjectRequest {
        CreateProjectRequest {
            name: "Portfolio".to_string(),
            description: "Personal site".to_string(),
            frontend_repo: "https://github.com/me/site".to_string(),
            backend_repo: Some("N/A".to_string()),
            live_link: "https://example.com".to_string(),
            languages: vec!["Rust".to_string()],
            frameworks: vec!["Axum".to_string()],
            tools_used: vec!["PostgreSQL".to_string()],
        }
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> (StatusCode, axum::body::Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        if let Some(t) = token {
            builder = builder.header("authorization", format!("Bearer {}", t));
        }
        let req = builder
            .body(body.map(Body::from).unwrap_or_else(Body::empty))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[tokio::test]
    async fn test_create_project_without_token_is_unauthenticated() {
        let body = serde_json::to_vec(&sample_create()).unwrap();
        let (status, bytes) = send(projects_router(), "POST", "/api/projects", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "No token, authorization denied");
    }

    #[tokio::test]
    async fn test_update_project_without_token_is_unauthenticated() {
        let body = serde_json::to_vec(&UpdateProjectRequest::default()).unwrap();
        let uri = format!("/api/projects/{}", Uuid::new_v4());
        let (status, _) = send(projects_router(), "PATCH", &uri, None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_project_without_token_is_unauthenticated() {
        let uri = format!("/api/projects/{}", Uuid::new_v4());
        let (status, _) = send(projects_router(), "DELETE", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_projects_without_database_is_unavailable() {
        let (status, _) = send(projects_router(), "GET", "/api/projects", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

/**
 * Post Routes
 * CRUD API endpoints for blog posts, with ownership-scoped authorization:
 * any authenticated user may create, the author or an admin may update,
 * only an admin may delete.
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::Engine;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::PostWithAuthor;
use crate::routes::auth::{authenticate, current_user, get_pool_or_unavailable};
use crate::routes::{api_error, is_unique_violation, ApiError, MessageResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/posts
#[derive(Debug, Deserialize)]
pub struct PostListQuery {
    pub status: Option<String>,
}

/// Author display name embedded in post responses.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorInfo {
    pub first_name: String,
    pub last_name: String,
}

/// Full post as returned to clients. The cover image is inlined as a
/// `data:image/jpeg;base64,...` string when present.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub author_id: Option<Uuid>,
    pub author: Option<AuthorInfo>,
    pub tags: Vec<String>,
    pub cover_image: Option<String>,
    pub cover_image_name: Option<String>,
    pub meta_title: String,
    pub meta_description: String,
    pub og_image: String,
    pub status: String,
    pub publish_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<PostWithAuthor> for PostResponse {
    fn from(post: PostWithAuthor) -> Self {
        let author = match (post.author_first_name, post.author_last_name) {
            (Some(first_name), Some(last_name)) => Some(AuthorInfo {
                first_name,
                last_name,
            }),
            _ => None,
        };
        let cover_image = post.cover_image.map(|bytes| {
            format!(
                "data:image/jpeg;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )
        });
        PostResponse {
            id: post.id,
            title: post.title,
            slug: post.slug,
            content: post.content,
            author_id: post.author_id,
            author,
            tags: post.tags,
            cover_image,
            cover_image_name: post.cover_image_name,
            meta_title: post.meta_title,
            meta_description: post.meta_description,
            og_image: post.og_image,
            status: post.status,
            publish_date: post.publish_date,
            created_at: post.created_at,
        }
    }
}

/// Request body for POST /api/posts
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub og_image: Option<String>,
    pub status: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
}

/// Request body for PATCH /api/posts/:id
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub og_image: Option<String>,
    pub status: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
}

// ============================================================================
// Slug handling
// ============================================================================

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();

    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9]+").unwrap();
}

fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Derive a URL-safe slug from a title: lowercase, non-alphanumeric runs
/// collapsed to single hyphens.
fn slugify(title: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(&title.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

const VALID_STATUSES: &[&str] = &["draft", "published"];

/// A colliding slug keeps the requested text and gains a millisecond
/// timestamp suffix, so both posts stay individually addressable.
fn suffixed_slug(slug: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", slug, at.timestamp_millis())
}

/// Updates are allowed for the recorded author or any admin. Posts whose
/// author row was deleted (author_id NULL) are admin-editable only.
fn may_update_post(role: &str, author_id: Option<Uuid>, acting_id: Uuid) -> bool {
    role == "admin" || author_id == Some(acting_id)
}

/// Deletion ignores authorship entirely; only the role decides.
fn may_delete_post(role: &str) -> bool {
    role == "admin"
}

/// If the candidate slug is already taken, disambiguate with a millisecond
/// timestamp suffix instead of rejecting the write. The check-then-insert
/// pair is not atomic: a concurrent create with the same slug can pass this
/// check and still hit the unique index, which surfaces as a 409.
async fn resolve_slug_collision(
    pool: &PgPool,
    slug: String,
    exclude_id: Option<Uuid>,
) -> Result<String, ApiError> {
    let taken: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM posts WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2)")
            .bind(&slug)
            .bind(exclude_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| {
                tracing::error!("Database error checking slug: {}", e);
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
            })?;

    if taken.is_some() {
        Ok(suffixed_slug(&slug, Utc::now()))
    } else {
        Ok(slug)
    }
}

// ============================================================================
// Queries
// ============================================================================

const POST_SELECT: &str = r#"
    SELECT p.id, p.title, p.slug, p.content, p.author_id,
           u.first_name AS author_first_name, u.last_name AS author_last_name,
           p.tags, p.cover_image, p.cover_image_name,
           p.meta_title, p.meta_description, p.og_image,
           p.status, p.publish_date, p.created_at
    FROM posts p
    LEFT JOIN users u ON u.id = p.author_id
"#;

async fn fetch_post(pool: &PgPool, id: Uuid) -> Result<Option<PostWithAuthor>, ApiError> {
    let query = format!("{} WHERE p.id = $1", POST_SELECT);
    sqlx::query_as::<_, PostWithAuthor>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!("Database error fetching post: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        })
}

fn parse_post_id(id: &str) -> Result<Uuid, ApiError> {
    id.parse::<Uuid>()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "No post with that id"))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/posts - public listing, optionally narrowed by status.
pub async fn list_posts(
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = get_pool_or_unavailable()?;

    let posts = if let Some(status) = query.status {
        let sql = format!("{} WHERE p.status = $1 ORDER BY p.created_at DESC", POST_SELECT);
        sqlx::query_as::<_, PostWithAuthor>(&sql)
            .bind(&status)
            .fetch_all(pool.as_ref())
            .await
    } else {
        let sql = format!("{} ORDER BY p.created_at DESC", POST_SELECT);
        sqlx::query_as::<_, PostWithAuthor>(&sql)
            .fetch_all(pool.as_ref())
            .await
    }
    .map_err(|e| {
        tracing::error!("Database error listing posts: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    })?;

    let items: Vec<PostResponse> = posts.into_iter().map(PostResponse::from).collect();
    Ok((StatusCode::OK, Json(items)))
}

/// GET /api/posts/user/:userId - posts authored by the given user
/// (authenticated view used by the "my posts" screen).
pub async fn list_posts_by_user(
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&headers)?;
    let author_id = user_id
        .parse::<Uuid>()
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "No user with that id"))?;
    let pool = get_pool_or_unavailable()?;

    let sql = format!(
        "{} WHERE p.author_id = $1 ORDER BY p.created_at DESC",
        POST_SELECT
    );
    let posts = sqlx::query_as::<_, PostWithAuthor>(&sql)
        .bind(author_id)
        .fetch_all(pool.as_ref())
        .await
        .map_err(|e| {
            tracing::error!("Database error listing posts by author: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        })?;

    let items: Vec<PostResponse> = posts.into_iter().map(PostResponse::from).collect();
    Ok((StatusCode::OK, Json(items)))
}

/// GET /api/posts/slug/:slug - public lookup by slug.
pub async fn get_post_by_slug(Path(slug): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let pool = get_pool_or_unavailable()?;

    let sql = format!("{} WHERE p.slug = $1", POST_SELECT);
    let post = sqlx::query_as::<_, PostWithAuthor>(&sql)
        .bind(&slug)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(|e| {
            tracing::error!("Database error fetching post by slug: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        })?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Post not found"))?;

    Ok((StatusCode::OK, Json(PostResponse::from(post))))
}

/// GET /api/posts/:id - public lookup by id.
pub async fn get_post(Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&id)?;
    let pool = get_pool_or_unavailable()?;

    let post = fetch_post(pool.as_ref(), post_id)
        .await?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Post not found"))?;

    Ok((StatusCode::OK, Json(PostResponse::from(post))))
}

/// POST /api/posts - create a post. Any authenticated identity may create;
/// the author is always the acting identity, never a client-supplied field.
pub async fn create_post(
    headers: HeaderMap,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author_id = authenticate(&headers)?;
    let pool = get_pool_or_unavailable()?;

    if payload.title.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    if payload.content.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Content is required"));
    }

    let status = payload.status.unwrap_or_else(|| "draft".to_string());
    if !VALID_STATUSES.contains(&status.as_str()) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Status must be either 'draft' or 'published'",
        ));
    }

    // Slug comes from the body when supplied, otherwise it is derived from
    // the title; either way it must be URL-safe.
    let slug = match payload.slug {
        Some(s) if !s.trim().is_empty() => {
            if !is_valid_slug(&s) {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "Slug must contain only lowercase letters, numbers, and hyphens",
                ));
            }
            s
        }
        _ => {
            let derived = slugify(&payload.title);
            if derived.is_empty() {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "Could not derive a slug from the title",
                ));
            }
            derived
        }
    };

    let slug = resolve_slug_collision(pool.as_ref(), slug, None).await?;

    let created: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO posts (title, slug, content, author_id, tags,
                           meta_title, meta_description, og_image, status, publish_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(&payload.title)
    .bind(&slug)
    .bind(&payload.content)
    .bind(author_id)
    .bind(&payload.tags)
    .bind(payload.meta_title.unwrap_or_default())
    .bind(payload.meta_description.unwrap_or_default())
    .bind(payload.og_image.unwrap_or_default())
    .bind(&status)
    .bind(payload.publish_date.unwrap_or_else(Utc::now))
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            api_error(StatusCode::CONFLICT, "A post with this slug already exists.")
        } else {
            tracing::error!("Database error creating post: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    })?;

    let post = fetch_post(pool.as_ref(), created.0)
        .await?
        .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong"))?;

    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

/// PATCH /api/posts/:id - update a post. Permitted for the recorded author
/// or any admin; everyone else gets 403 and the row is untouched.
pub async fn update_post(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let acting_id = authenticate(&headers)?;
    let post_id = parse_post_id(&id)?;
    let pool = get_pool_or_unavailable()?;

    let existing = fetch_post(pool.as_ref(), post_id)
        .await?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Post not found"))?;

    let acting = current_user(pool.as_ref(), acting_id).await?;
    if !may_update_post(&acting.role, existing.author_id, acting_id) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Not authorized to update this post",
        ));
    }

    if let Some(ref status) = payload.status {
        if !VALID_STATUSES.contains(&status.as_str()) {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "Status must be either 'draft' or 'published'",
            ));
        }
    }

    // Merge semantics: absent fields keep their stored values.
    let title = payload.title.unwrap_or(existing.title);
    let content = payload.content.unwrap_or(existing.content);
    let tags = payload.tags.unwrap_or(existing.tags);
    let meta_title = payload.meta_title.unwrap_or(existing.meta_title);
    let meta_description = payload.meta_description.unwrap_or(existing.meta_description);
    let og_image = payload.og_image.unwrap_or(existing.og_image);
    let status = payload.status.unwrap_or(existing.status);
    let publish_date = payload.publish_date.unwrap_or(existing.publish_date);

    let slug = match payload.slug {
        Some(s) if s != existing.slug => {
            if !is_valid_slug(&s) {
                return Err(api_error(
                    StatusCode::BAD_REQUEST,
                    "Slug must contain only lowercase letters, numbers, and hyphens",
                ));
            }
            resolve_slug_collision(pool.as_ref(), s, Some(post_id)).await?
        }
        _ => existing.slug,
    };

    sqlx::query(
        r#"
        UPDATE posts
        SET title = $1, slug = $2, content = $3, tags = $4,
            meta_title = $5, meta_description = $6, og_image = $7,
            status = $8, publish_date = $9
        WHERE id = $10
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(&content)
    .bind(&tags)
    .bind(&meta_title)
    .bind(&meta_description)
    .bind(&og_image)
    .bind(&status)
    .bind(publish_date)
    .bind(post_id)
    .execute(pool.as_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            api_error(StatusCode::CONFLICT, "A post with this slug already exists.")
        } else {
            tracing::error!("Database error updating post: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    })?;

    let post = fetch_post(pool.as_ref(), post_id)
        .await?
        .ok_or_else(|| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong"))?;

    Ok((StatusCode::OK, Json(PostResponse::from(post))))
}

/// DELETE /api/posts/:id - admin only, regardless of authorship.
pub async fn delete_post(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let acting_id = authenticate(&headers)?;
    let post_id = parse_post_id(&id)?;
    let pool = get_pool_or_unavailable()?;

    let acting = crate::routes::auth::find_user_by_id(pool.as_ref(), acting_id).await?;
    if !acting.is_some_and(|u| may_delete_post(&u.role)) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Not authorized to delete posts",
        ));
    }

    let result = sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(pool.as_ref())
        .await
        .map_err(|e| {
            tracing::error!("Database error deleting post: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        })?;

    if result.rows_affected() == 0 {
        return Err(api_error(StatusCode::NOT_FOUND, "Post not found"));
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Post deleted successfully".to_string(),
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

    use crate::routes::auth::create_token;
    use crate::routes::ErrorResponse;

    fn posts_router() -> Router {
        Router::new()
            .route("/api/posts", get(list_posts).post(create_post))
            .route("/api/posts/user/{user_id}", get(list_posts_by_user))
            .route("/api/posts/slug/{slug}", get(get_post_by_slug))
            .route(
                "/api/posts/{id}",
                get(get_post).patch(update_post).delete(delete_post),
            )
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

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust & Axum: a tour!  "), "rust-axum-a-tour");
        assert_eq!(slugify("already-a-slug"), "already-a-slug");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_update_permitted_for_author_and_admin_only() {
        let author = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        assert!(may_update_post("user", Some(author), author));
        assert!(may_update_post("admin", Some(author), stranger));
        assert!(!may_update_post("user", Some(author), stranger));

        // Orphaned posts (author row deleted) fall back to admin-only.
        assert!(!may_update_post("user", None, stranger));
        assert!(may_update_post("admin", None, stranger));
    }

    #[test]
    fn test_delete_requires_admin_even_for_author() {
        assert!(may_delete_post("admin"));
        assert!(!may_delete_post("user"));
    }

    #[test]
    fn test_taken_slug_gains_timestamp_suffix() {
        use chrono::TimeZone;

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let suffixed = suffixed_slug("hello-world", at);

        assert_eq!(suffixed, format!("hello-world-{}", at.timestamp_millis()));
        assert_ne!(suffixed, "hello-world");
        // The suffixed slug is itself URL-safe, so both posts stay reachable
        // under distinct slugs.
        assert!(is_valid_slug(&suffixed));
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("my-first-post"));
        assert!(is_valid_slug("post2"));
        assert!(!is_valid_slug("My-Post"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug("two--hyphens"));
        assert!(!is_valid_slug(""));
    }

    #[tokio::test]
    async fn test_create_post_without_token_is_unauthenticated() {
        let body = serde_json::to_vec(&CreatePostRequest {
            title: "A Post".to_string(),
            slug: None,
            content: "Body".to_string(),
            tags: vec![],
            meta_title: None,
            meta_description: None,
            og_image: None,
            status: None,
            publish_date: None,
        })
        .unwrap();
        let (status, bytes) = send(posts_router(), "POST", "/api/posts", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "No token, authorization denied");
    }

    #[tokio::test]
    async fn test_update_post_without_token_is_unauthenticated() {
        let body = serde_json::to_vec(&UpdatePostRequest::default()).unwrap();
        let uri = format!("/api/posts/{}", Uuid::new_v4());
        let (status, _) = send(posts_router(), "PATCH", &uri, None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_post_with_bad_id_is_not_found() {
        let token = create_token(Uuid::new_v4()).unwrap();
        let (status, bytes) = send(
            posts_router(),
            "DELETE",
            "/api/posts/not-a-uuid",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "No post with that id");
    }

    #[tokio::test]
    async fn test_list_posts_by_user_without_token_is_unauthenticated() {
        let uri = format!("/api/posts/user/{}", Uuid::new_v4());
        let (status, _) = send(posts_router(), "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_posts_without_database_is_unavailable() {
        let (status, _) = send(posts_router(), "GET", "/api/posts", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

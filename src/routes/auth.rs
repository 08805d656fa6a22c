/**
 * Authentication Routes
 * JWT-based authentication plus the access-control helpers the other
 * route modules build on (bearer extraction, identity load, admin check).
 */
use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{
    self,
    models::{User, UserResponse},
};
use crate::routes::{api_error, is_unique_violation, ApiError, MessageResponse};

// ============================================================================
// Configuration
// ============================================================================

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "default-jwt-secret-change-in-production".to_string());
}

/// Session tokens expire one hour after issuance. There is no refresh
/// mechanism; clients re-authenticate on expiry.
const TOKEN_EXPIRY_HOURS: i64 = 1;

/// Minimum accepted password length for registration and password change.
const MIN_PASSWORD_LENGTH: usize = 6;

// ============================================================================
// Types
// ============================================================================

/// JWT claims. Only the user id is embedded; role and profile data are
/// loaded fresh from the database on every protected request, so a stale
/// token can never carry an out-of-date role.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID
    pub exp: i64,    // Expiry timestamp
    pub iat: i64,    // Issued at timestamp
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `{ result, token }` returned by login and register. On register the
/// token belongs to the newly created user, not the acting admin.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub result: UserResponse,
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfilePictureRequest {
    pub profile_picture: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub result: UserResponse,
    pub message: String,
}

// ============================================================================
// Token issuer / verifier
// ============================================================================

/// Create a signed session token for the given user id.
pub fn create_token(user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::hours(TOKEN_EXPIRY_HOURS);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

/// Verify signature and expiry, yielding the embedded claims.
pub fn verify_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

// ============================================================================
// Access-control gate
// ============================================================================

/// Resolve the acting user id from the request headers. A missing token is
/// rejected separately from an invalid or expired one.
pub fn authenticate(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = extract_bearer_token(headers).ok_or_else(|| {
        api_error(StatusCode::UNAUTHORIZED, "No token, authorization denied")
    })?;

    let claims = verify_token(&token)
        .map_err(|_| api_error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| api_error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}

pub fn get_pool_or_unavailable() -> Result<Arc<PgPool>, ApiError> {
    db::get_pool()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "Database not available"))
}

/// Load the identity behind a verified token.
pub async fn current_user(pool: &PgPool, user_id: Uuid) -> Result<User, ApiError> {
    find_user_by_id(pool, user_id)
        .await?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "User not found"))
}

/// Composable admin check: authenticate, load the identity, and require the
/// `admin` role. A valid non-admin identity gets 403, distinct from the 401
/// of a missing or bad token.
pub async fn require_admin(headers: &HeaderMap) -> Result<User, ApiError> {
    let user_id = authenticate(headers)?;
    let pool = get_pool_or_unavailable()?;
    let user = current_user(pool.as_ref(), user_id).await?;

    if user.role != "admin" {
        return Err(api_error(StatusCode::FORBIDDEN, "Admin access required"));
    }

    Ok(user)
}

// ============================================================================
// Helper Functions
// ============================================================================

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, ApiError> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, first_name, last_name, email, password_hash, role,
               phone, website, city, state, country, profile_picture, about_image, created_at
        FROM users WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Database error loading user: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    })
}

/// Exact-match email lookup. Emails are stored and compared case-sensitively.
async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, first_name, last_name, email, password_hash, role,
               phone, website, city, state, country, profile_picture, about_image, created_at
        FROM users WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Database error loading user by email: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    })
}

/// Hash a password - bcrypt is intentionally CPU-intensive; run it outside
/// the async executor so it doesn't block other in-flight tasks.
async fn hash_password(password: String) -> Result<String, ApiError> {
    match tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST)).await {
        Ok(Ok(h)) => Ok(h),
        Ok(Err(e)) => {
            tracing::error!("Failed to hash password: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process password",
            ))
        }
        Err(e) => {
            tracing::error!("spawn_blocking panic during hash: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process password",
            ))
        }
    }
}

/// Compare a candidate password against a stored hash off the executor.
async fn verify_password(password: String, password_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify(&password, &password_hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
/// Create a new user. Only an authenticated admin may do this; the response
/// carries a session token for the newly created user.
pub async fn register(
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let acting_id = authenticate(&headers)?;
    let pool = get_pool_or_unavailable()?;

    // The acting identity must exist and hold the admin role. A vanished
    // user record is rejected the same way as a non-admin one.
    let acting = find_user_by_id(pool.as_ref(), acting_id).await?;
    if !acting.is_some_and(|u| u.role == "admin") {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Not authorized to register new users",
        ));
    }

    if payload.email.is_empty()
        || payload.password.is_empty()
        || payload.first_name.is_empty()
        || payload.last_name.is_empty()
    {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide all required fields",
        ));
    }

    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters long",
        ));
    }

    if find_user_by_email(pool.as_ref(), &payload.email)
        .await?
        .is_some()
    {
        return Err(api_error(
            StatusCode::CONFLICT,
            "User with that email already exists",
        ));
    }

    // Anything other than the two known roles is silently coerced to `user`.
    let role = match payload.role.as_deref() {
        Some("admin") => "admin",
        _ => "user",
    };

    let password_hash = hash_password(payload.password).await?;

    let created = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, first_name, last_name, email, password_hash, role,
                  phone, website, city, state, country, profile_picture, about_image, created_at
        "#,
    )
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(role)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            api_error(StatusCode::CONFLICT, "User with that email already exists")
        } else {
            tracing::error!("Failed to create user: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    })?;

    let token = create_token(created.id).map_err(|e| {
        tracing::error!("Failed to create token: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    })?;

    tracing::info!("User registered: {}", created.email);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            result: created.into(),
            token,
        }),
    ))
}

/// POST /api/auth/login
/// An unknown email reports 404; a wrong password reports 400 without
/// saying which field was wrong.
pub async fn login(Json(payload): Json<LoginRequest>) -> Result<impl IntoResponse, ApiError> {
    let pool = get_pool_or_unavailable()?;

    let user = find_user_by_email(pool.as_ref(), &payload.email)
        .await?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "User doesn't exist"))?;

    if !verify_password(payload.password, user.password_hash.clone()).await {
        tracing::warn!("Failed login attempt for: {}", user.email);
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid credentials"));
    }

    let token = create_token(user.id).map_err(|e| {
        tracing::error!("Failed to create token: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    })?;

    tracing::info!("Successful login for user: {}", user.email);

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            result: user.into(),
            token,
        }),
    ))
}

/// PATCH /api/auth/change-password
/// Re-hashes and persists; tokens already issued stay valid until expiry.
pub async fn change_password(
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = authenticate(&headers)?;

    if payload.old_password.is_empty() || payload.new_password.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide old and new passwords",
        ));
    }

    if payload.new_password.len() < MIN_PASSWORD_LENGTH {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "New password must be at least 6 characters long",
        ));
    }

    let pool = get_pool_or_unavailable()?;
    let user = current_user(pool.as_ref(), user_id).await?;

    if !verify_password(payload.old_password, user.password_hash.clone()).await {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid old password"));
    }

    let password_hash = hash_password(payload.new_password).await?;

    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(pool.as_ref())
        .await
        .map_err(|e| {
            tracing::error!("Failed to update password: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        })?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Password changed successfully".to_string(),
        }),
    ))
}

/// PATCH /api/auth/profile
/// Merge semantics: absent fields keep their prior values. The role field
/// is honored only when the acting identity is already an admin, so a
/// regular user cannot grant themselves admin through this path.
pub async fn update_profile(
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = authenticate(&headers)?;
    let pool = get_pool_or_unavailable()?;
    let user = current_user(pool.as_ref(), user_id).await?;

    let first_name = payload.first_name.unwrap_or(user.first_name);
    let last_name = payload.last_name.unwrap_or(user.last_name);
    let email = payload.email.unwrap_or(user.email);
    let phone = payload.phone.or(user.phone);
    let website = payload.website.or(user.website);
    let city = payload.city.or(user.city);
    let state = payload.state.or(user.state);
    let country = payload.country.or(user.country);

    let role = if user.role == "admin" {
        payload.role.unwrap_or(user.role)
    } else {
        user.role
    };

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET first_name = $1, last_name = $2, email = $3, phone = $4,
            website = $5, city = $6, state = $7, country = $8, role = $9
        WHERE id = $10
        RETURNING id, first_name, last_name, email, password_hash, role,
                  phone, website, city, state, country, profile_picture, about_image, created_at
        "#,
    )
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&phone)
    .bind(&website)
    .bind(&city)
    .bind(&state)
    .bind(&country)
    .bind(&role)
    .bind(user.id)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            api_error(StatusCode::CONFLICT, "User with that email already exists")
        } else {
            tracing::error!("Failed to update profile: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
        }
    })?;

    Ok((
        StatusCode::OK,
        Json(ProfileResponse {
            result: updated.into(),
            message: "Profile updated successfully".to_string(),
        }),
    ))
}

/// PATCH /api/auth/profile-picture (admin only)
pub async fn update_profile_picture(
    headers: HeaderMap,
    Json(payload): Json<UpdateProfilePictureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = authenticate(&headers)?;
    let pool = get_pool_or_unavailable()?;
    let user = current_user(pool.as_ref(), user_id).await?;

    if user.role != "admin" {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Not authorized to update profile picture",
        ));
    }

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET profile_picture = $1 WHERE id = $2
        RETURNING id, first_name, last_name, email, password_hash, role,
                  phone, website, city, state, country, profile_picture, about_image, created_at
        "#,
    )
    .bind(&payload.profile_picture)
    .bind(user.id)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        tracing::error!("Failed to update profile picture: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    })?;

    Ok((
        StatusCode::OK,
        Json(ProfileResponse {
            result: updated.into(),
            message: "Profile picture updated successfully".to_string(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{patch, post};
    use axum::Router;
    use tower::ServiceExt;

    use crate::routes::ErrorResponse;

    fn auth_router() -> Router {
        Router::new()
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/change-password", patch(change_password))
            .route("/api/auth/profile", patch(update_profile))
    }

    async fn send_json(
        app: Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(t) = token {
            builder = builder.header("authorization", format!("Bearer {}", t));
        }
        let req = builder
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[test]
    fn test_token_roundtrip_preserves_user_id() {
        let user_id = Uuid::new_v4();
        let token = create_token(user_id).unwrap();
        let claims = verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_verify_token_rejects_garbage() {
        assert!(verify_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_verify_token_rejects_expired() {
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: (now - Duration::hours(2)).timestamp(),
            iat: (now - Duration::hours(3)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_token(&token).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());

        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc123"));

        headers.insert("authorization", "Basic abc123".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_none());
    }

    #[tokio::test]
    async fn test_register_without_token_is_unauthenticated() {
        let (status, bytes) = send_json(
            auth_router(),
            "POST",
            "/api/auth/register",
            None,
            &RegisterRequest {
                first_name: "New".to_string(),
                last_name: "User".to_string(),
                email: "new@example.com".to_string(),
                password: "secret99".to_string(),
                role: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "No token, authorization denied");
    }

    #[tokio::test]
    async fn test_register_with_invalid_token_is_rejected() {
        let (status, bytes) = send_json(
            auth_router(),
            "POST",
            "/api/auth/register",
            Some("not-a-jwt"),
            &RegisterRequest {
                first_name: "New".to_string(),
                last_name: "User".to_string(),
                email: "new@example.com".to_string(),
                password: "secret99".to_string(),
                role: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_login_without_database_is_unavailable() {
        let (status, _) = send_json(
            auth_router(),
            "POST",
            "/api/auth/login",
            None,
            &LoginRequest {
                email: "a@x.com".to_string(),
                password: "right".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_change_password_without_token_is_unauthenticated() {
        let (status, _) = send_json(
            auth_router(),
            "PATCH",
            "/api/auth/change-password",
            None,
            &ChangePasswordRequest {
                old_password: "old-secret".to_string(),
                new_password: "new-secret".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_password_rejects_short_new_password() {
        // Validation runs after authentication, so a real token is needed.
        let token = create_token(Uuid::new_v4()).unwrap();
        let (status, bytes) = send_json(
            auth_router(),
            "PATCH",
            "/api/auth/change-password",
            Some(&token),
            &ChangePasswordRequest {
                old_password: "old-secret".to_string(),
                new_password: "tiny".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "New password must be at least 6 characters long");
    }

    #[tokio::test]
    async fn test_update_profile_without_token_is_unauthenticated() {
        let (status, _) = send_json(
            auth_router(),
            "PATCH",
            "/api/auth/profile",
            None,
            &UpdateProfileRequest::default(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}

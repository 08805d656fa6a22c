//! Database models - structs representing table rows (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User row, including the password hash. Never serialized to the wire
/// directly; convert to [`UserResponse`] first.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub profile_picture: Option<String>,
    pub about_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// User as returned to clients - same fields minus the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub profile_picture: Option<String>,
    pub about_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
            phone: user.phone,
            website: user.website,
            city: user.city,
            state: user.state,
            country: user.country,
            profile_picture: user.profile_picture,
            about_image: user.about_image,
            created_at: user.created_at,
        }
    }
}

/// Post row joined with its author's display name.
#[derive(Debug, Clone, FromRow)]
pub struct PostWithAuthor {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub author_id: Option<Uuid>,
    pub author_first_name: Option<String>,
    pub author_last_name: Option<String>,
    pub tags: Vec<String>,
    pub cover_image: Option<Vec<u8>>,
    pub cover_image_name: Option<String>,
    pub meta_title: String,
    pub meta_description: String,
    pub og_image: String,
    pub status: String,
    pub publish_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Project row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub frontend_repo: String,
    pub backend_repo: Option<String>,
    pub live_link: String,
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub tools_used: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Contact message row. Write-once; there is no update or delete path.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

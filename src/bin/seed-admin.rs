//! One-time admin seed. Creates the portfolio owner from env vars if no
//! user with ADMIN_EMAIL exists yet.
//!
//! Usage: cargo run --bin seed-admin
//! Required env: DATABASE_URL, ADMIN_EMAIL, ADMIN_PASSWORD,
//! ADMIN_FIRST_NAME, ADMIN_LAST_NAME

use bcrypt::{hash, DEFAULT_COST};

fn require_env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        eprintln!("Missing required env var: {}", name);
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let email = require_env("ADMIN_EMAIL");
    let password = require_env("ADMIN_PASSWORD");
    let first_name = require_env("ADMIN_FIRST_NAME");
    let last_name = require_env("ADMIN_LAST_NAME");

    let pool = match portfolio_api::db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = portfolio_api::db::run_migrations(&pool).await {
        eprintln!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    let existing: Option<(uuid::Uuid,)> =
        match sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(pool.as_ref())
            .await
        {
            Ok(row) => row,
            Err(e) => {
                eprintln!("Failed to check for existing admin: {}", e);
                std::process::exit(1);
            }
        };

    if existing.is_some() {
        println!("Admin user already exists");
        return;
    }

    let password_hash = match hash(&password, DEFAULT_COST) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Failed to hash password: {}", e);
            std::process::exit(1);
        }
    };

    match sqlx::query(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, 'admin')
        "#,
    )
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&password_hash)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => println!("Admin user created successfully"),
        Err(e) => {
            eprintln!("Error seeding admin user: {}", e);
            std::process::exit(1);
        }
    }
}

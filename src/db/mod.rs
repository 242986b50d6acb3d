use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

pub mod store;

use crate::error::HookError;
use crate::model::{Build, Commit, Repo, User};
pub use store::SqlStore;

/// Storage collaborator consumed by the build pipeline.
///
/// "Not found" is an expected result and is modelled as `Ok(None)`;
/// an `Err` always means the lookup itself failed.
#[async_trait]
pub trait Database: Send + Sync {
    async fn commit_by_hash_and_repo(
        &self,
        hash: &str,
        repo_id: i64,
    ) -> Result<Option<Commit>, HookError>;

    async fn repo_by_slug(&self, slug: &str) -> Result<Option<Repo>, HookError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, HookError>;

    /// Persist a repository, returning its assigned id.
    async fn save_repo(&self, repo: &Repo) -> Result<i64, HookError>;

    /// Persist a commit, returning its assigned id.
    async fn save_commit(&self, commit: &Commit) -> Result<i64, HookError>;

    /// Persist a build, returning its assigned id.
    async fn save_build(&self, build: &Build) -> Result<i64, HookError>;

    /// Persist a user, returning its assigned id.
    async fn save_user(&self, user: &User) -> Result<i64, HookError>;
}

pub type SharedDatabase = Arc<dyn Database>;

/// Initialize the SQLite database connection pool and run migrations
pub async fn init_db(db_path: impl AsRef<Path>) -> Result<SqlitePool, HookError> {
    let db_path = db_path.as_ref();
    let db_path_str = db_path.to_string_lossy();

    // Ensure the database file exists or create it
    if !db_path.exists() {
        info!("Database file not found at {}, creating...", db_path_str);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HookError::DatabaseError(format!("Failed to create database directory: {}", e))
            })?;
        }
        std::fs::File::create(db_path).map_err(|e| {
            HookError::DatabaseError(format!("Failed to create database file: {}", e))
        })?;
    }

    let db_url = format!("sqlite:{}", db_path_str);
    info!("Connecting to database at {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .map_err(|e| HookError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| HookError::DatabaseError(format!("Failed to run migrations: {}", e)))?;

    info!("Database initialized successfully");
    Ok(pool)
}

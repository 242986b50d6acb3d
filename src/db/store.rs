use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::db::Database;
use crate::error::HookError;
use crate::model::{Build, BuildStatus, Commit, Repo, ScmKind, User};

/// SQLite-backed implementation of the [`Database`] collaborator
#[derive(Clone)]
pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// Helper structs to map DB rows onto the domain types

#[derive(FromRow)]
struct RepoRow {
    id: i64,
    user_id: i64,
    slug: String,
    host: String,
    owner: String,
    name: String,
    url: String,
    private: bool,
}

impl From<RepoRow> for Repo {
    fn from(row: RepoRow) -> Self {
        Repo {
            id: row.id,
            user_id: row.user_id,
            slug: row.slug,
            host: row.host,
            owner: row.owner,
            name: row.name,
            scm: ScmKind::Git,
            url: row.url,
            private: row.private,
        }
    }
}

#[derive(FromRow)]
struct CommitRow {
    id: i64,
    repo_id: i64,
    branch: String,
    hash: String,
    status: String,
    created_at: String,
    timestamp: String,
    message: String,
    author: String,
}

impl From<CommitRow> for Commit {
    fn from(row: CommitRow) -> Self {
        Commit {
            id: row.id,
            repo_id: row.repo_id,
            branch: row.branch,
            hash: row.hash,
            status: parse_status(&row.status),
            created_at: parse_timestamp(&row.created_at),
            timestamp: row.timestamp,
            message: row.message,
            author: row.author,
        }
    }
}

fn parse_status(raw: &str) -> BuildStatus {
    raw.parse().unwrap_or(BuildStatus::Failed)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Database for SqlStore {
    async fn commit_by_hash_and_repo(
        &self,
        hash: &str,
        repo_id: i64,
    ) -> Result<Option<Commit>, HookError> {
        let row = sqlx::query_as::<_, CommitRow>(
            r#"
            SELECT id, repo_id, branch, hash, status, created_at, timestamp, message, author
            FROM commits
            WHERE hash = ? AND repo_id = ?
            LIMIT 1
            "#,
        )
        .bind(hash)
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HookError::DatabaseError(format!("Failed to fetch commit: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    async fn repo_by_slug(&self, slug: &str) -> Result<Option<Repo>, HookError> {
        let row = sqlx::query_as::<_, RepoRow>(
            r#"
            SELECT id, user_id, slug, host, owner, name, url, private
            FROM repos
            WHERE slug = ?
            LIMIT 1
            "#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HookError::DatabaseError(format!("Failed to fetch repo: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, HookError> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, email, name FROM users WHERE email = ? LIMIT 1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| HookError::DatabaseError(format!("Failed to fetch user: {}", e)))?;

        Ok(row.map(|(id, email, name)| User { id, email, name }))
    }

    async fn save_repo(&self, repo: &Repo) -> Result<i64, HookError> {
        let result = sqlx::query(
            r#"
            INSERT INTO repos (user_id, slug, host, owner, name, scm, url, private)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(repo.user_id)
        .bind(&repo.slug)
        .bind(&repo.host)
        .bind(&repo.owner)
        .bind(&repo.name)
        .bind(repo.scm.as_str())
        .bind(&repo.url)
        .bind(repo.private)
        .execute(&self.pool)
        .await
        .map_err(|e| HookError::DatabaseError(format!("Failed to save repo: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    async fn save_commit(&self, commit: &Commit) -> Result<i64, HookError> {
        let result = sqlx::query(
            r#"
            INSERT INTO commits (repo_id, branch, hash, status, created_at, timestamp, message, author)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(commit.repo_id)
        .bind(&commit.branch)
        .bind(&commit.hash)
        .bind(commit.status.as_str())
        .bind(commit.created_at.to_rfc3339())
        .bind(&commit.timestamp)
        .bind(&commit.message)
        .bind(&commit.author)
        .execute(&self.pool)
        .await
        .map_err(|e| HookError::DatabaseError(format!("Failed to save commit: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    async fn save_build(&self, build: &Build) -> Result<i64, HookError> {
        let result = sqlx::query(
            r#"
            INSERT INTO builds (commit_id, slug, status, created_at, finished_at, output)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(build.commit_id)
        .bind(&build.slug)
        .bind(build.status.as_str())
        .bind(build.created_at.to_rfc3339())
        .bind(build.finished_at.map(|dt| dt.to_rfc3339()))
        .bind(&build.output)
        .execute(&self.pool)
        .await
        .map_err(|e| HookError::DatabaseError(format!("Failed to save build: {}", e)))?;

        Ok(result.last_insert_rowid())
    }

    async fn save_user(&self, user: &User) -> Result<i64, HookError> {
        let result = sqlx::query("INSERT INTO users (email, name) VALUES (?, ?)")
            .bind(&user.email)
            .bind(&user.name)
            .execute(&self.pool)
            .await
            .map_err(|e| HookError::DatabaseError(format!("Failed to save user: {}", e)))?;

        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqlStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqlStore::new(pool)
    }

    #[tokio::test]
    async fn repo_round_trips_by_slug() {
        let store = store().await;

        let user_id = store
            .save_user(&User {
                id: 0,
                email: "owner@acme.io".to_string(),
                name: "acme".to_string(),
            })
            .await
            .unwrap();

        let mut repo = Repo::new(
            "gogs.local",
            "acme",
            "widget",
            ScmKind::Git,
            "http://gogs.local/acme/widget",
        );
        repo.user_id = user_id;
        repo.private = true;
        let repo_id = store.save_repo(&repo).await.unwrap();

        let found = store
            .repo_by_slug("gogs.local/acme/widget")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, repo_id);
        assert_eq!(found.user_id, user_id);
        assert!(found.private);

        assert!(store.repo_by_slug("gogs.local/no/such").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_lookup_distinguishes_not_found() {
        let store = store().await;

        let commit = Commit::new(
            1,
            "main".to_string(),
            "abc123".to_string(),
            "fix".to_string(),
            "a".to_string(),
        );
        let id = store.save_commit(&commit).await.unwrap();

        let found = store
            .commit_by_hash_and_repo("abc123", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.status, BuildStatus::Pending);
        assert_eq!(found.branch, "main");

        // Same hash, different repo: expected miss, not an error.
        assert!(store
            .commit_by_hash_and_repo("abc123", 2)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn failed_build_keeps_its_output() {
        let store = store().await;

        let build = Build::failed(9, "Could not parse".to_string());
        let id = store.save_build(&build).await.unwrap();
        assert!(id > 0);

        let (status, output): (String, Option<String>) =
            sqlx::query_as("SELECT status, output FROM builds WHERE id = ?")
                .bind(id)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(status, "failed");
        assert_eq!(output.as_deref(), Some("Could not parse"));
    }

    #[tokio::test]
    async fn user_lookup_by_email() {
        let store = store().await;
        assert!(store.user_by_email("ghost@acme.io").await.unwrap().is_none());

        store
            .save_user(&User {
                id: 0,
                email: "a@acme.io".to_string(),
                name: "a".to_string(),
            })
            .await
            .unwrap();

        let user = store.user_by_email("a@acme.io").await.unwrap().unwrap();
        assert_eq!(user.name, "a");
    }
}

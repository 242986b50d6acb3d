use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::script::BuildPlan;

/// Slug assigned to every build record. Placeholder until builds
/// are numbered per commit.
pub const DEFAULT_BUILD_SLUG: &str = "1";

/// Lifecycle status shared by commits and builds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "pending" => Ok(BuildStatus::Pending),
            "success" => Ok(BuildStatus::Success),
            "failed" => Ok(BuildStatus::Failed),
            _ => Err(()),
        }
    }
}

/// Source-control kind of a repository
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScmKind {
    Git,
}

impl ScmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScmKind::Git => "git",
        }
    }
}

/// A user known to the system, resolved by email when a repository
/// is first registered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
}

/// Durable representation of a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub user_id: i64,
    /// host/owner/name, derived from the canonical URL path segments
    pub slug: String,
    pub host: String,
    pub owner: String,
    pub name: String,
    pub scm: ScmKind,
    pub url: String,
    pub private: bool,
}

impl Repo {
    /// Create an unsaved repository from its URL segments.
    /// The owning user and the private flag are filled in by the pipeline.
    pub fn new(host: &str, owner: &str, name: &str, scm: ScmKind, url: &str) -> Self {
        Self {
            id: 0,
            user_id: 0,
            slug: format!("{}/{}/{}", host, owner, name),
            host: host.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
            scm,
            url: url.to_string(),
            private: false,
        }
    }
}

/// One build-triggering commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: i64,
    pub repo_id: i64,
    pub branch: String,
    pub hash: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    /// Display timestamp, kept as a rendered string
    pub timestamp: String,
    pub message: String,
    pub author: String,
}

impl Commit {
    pub fn new(repo_id: i64, branch: String, hash: String, message: String, author: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            repo_id,
            branch,
            hash,
            status: BuildStatus::Pending,
            created_at: now,
            timestamp: now.to_rfc3339(),
            message,
            author,
        }
    }
}

/// One build attempt tied to exactly one commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    pub commit_id: i64,
    pub slug: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Populated by the failed-build diagnostic path
    pub output: Option<String>,
}

impl Build {
    /// Create a pending build for a commit
    pub fn pending(commit_id: i64) -> Self {
        Self {
            id: 0,
            commit_id,
            slug: DEFAULT_BUILD_SLUG.to_string(),
            status: BuildStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
            output: None,
        }
    }

    /// Create an already-failed build carrying a diagnostic message.
    /// Used when the build definition does not parse.
    pub fn failed(commit_id: i64, output: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            commit_id,
            slug: DEFAULT_BUILD_SLUG.to_string(),
            status: BuildStatus::Failed,
            created_at: now,
            finished_at: Some(now),
            output: Some(output),
        }
    }
}

/// Unit of work handed to the dispatch queue. Owned by the queue after
/// submission, then by the executing worker for the duration of the run.
#[derive(Debug, Clone)]
pub struct BuildTask {
    pub repo: Repo,
    pub commit: Commit,
    pub build: Build,
    pub plan: BuildPlan,
}

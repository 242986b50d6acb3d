//! The event-to-build pipeline
//!
//! Turns one raw push notification into one submitted build task, or into a
//! tagged terminal outcome. Stages run strictly in order and there is no
//! rollback: a later failure leaves earlier writes in place, which is why
//! every failure carries the stage it happened in.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::db::SharedDatabase;
use crate::error::HookError;
use crate::fetch::{SharedFetcher, definition_url};
use crate::model::{Build, BuildTask, Commit, Repo, ScmKind};
use crate::notification::Notification;
use crate::queue::DispatchQueue;
use crate::script::SharedScriptParser;

/// Reason a request was turned away before or instead of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Undecodable or invalid payload, or one we cannot derive a build from
    BadRequest,
    /// The duplicate-commit lookup itself failed
    UpstreamUnavailable,
    /// No user matches the repository owner's email
    OwnerNotFound,
    /// The build definition does not parse; a diagnostic build was recorded
    BadDefinition,
}

/// Stage at which a pipeline run failed after side effects had started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RepoPersist,
    CommitPersist,
    DefinitionFetch,
    FailedBuildPersist,
    BuildPersist,
    Submit,
}

/// Terminal result of one pipeline invocation
#[derive(Debug)]
pub enum Outcome {
    /// A build task was handed to the dispatch queue
    Submitted,
    /// Turned away; no writes beyond the bad-definition diagnostic
    Rejected(RejectReason),
    /// Stopped mid-flight; earlier stages may have written durably
    Failed(Stage, HookError),
}

/// Pipeline configuration fixed at construction time
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Overrides the hosting-service endpoint used for definition fetches.
    /// When unset, the host segment of the repository URL is used.
    pub definition_endpoint: Option<String>,
}

/// Orchestrates dedup check, repository resolution, record creation,
/// definition retrieval/parse and task submission.
pub struct BuildPipeline {
    db: SharedDatabase,
    fetcher: SharedFetcher,
    parser: SharedScriptParser,
    queue: DispatchQueue,
    config: PipelineConfig,
}

impl BuildPipeline {
    pub fn new(
        db: SharedDatabase,
        fetcher: SharedFetcher,
        parser: SharedScriptParser,
        queue: DispatchQueue,
        config: PipelineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            fetcher,
            parser,
            queue,
            config,
        })
    }

    /// Process one raw hook body end to end.
    pub async fn handle(&self, raw: &[u8]) -> Outcome {
        let hook = match Notification::parse(raw) {
            Ok(hook) => hook,
            Err(e) => {
                info!("Discarding notification: {}", e);
                return Outcome::Rejected(RejectReason::BadRequest);
            }
        };

        // parse() guarantees the repository is present.
        let Some(descriptor) = hook.repository.clone() else {
            return Outcome::Rejected(RejectReason::BadRequest);
        };
        let Some(head) = hook.head_commit().cloned() else {
            warn!(repo = %descriptor.url, "Push notification carries no commits");
            return Outcome::Rejected(RejectReason::BadRequest);
        };

        // Duplicate-commit lookup. Known gap: a hit is logged but allowed
        // through to a second build; only a failed lookup terminates the
        // request.
        match self
            .db
            .commit_by_hash_and_repo(&head.id, descriptor.id)
            .await
        {
            Ok(Some(existing)) => {
                warn!(hash = %head.id, commit_id = existing.id, "Commit already built, proceeding anyway");
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Duplicate-commit lookup failed: {}", e);
                return Outcome::Rejected(RejectReason::UpstreamUnavailable);
            }
        }

        let Some((host, owner, name)) = split_repo_url(&descriptor.url) else {
            warn!(url = %descriptor.url, "Repository URL has too few path segments");
            return Outcome::Rejected(RejectReason::BadRequest);
        };

        let repo = match self
            .resolve_repo(host, owner, name, &descriptor.url, &descriptor.owner.email, descriptor.private)
            .await
        {
            Ok(repo) => repo,
            Err(outcome) => return outcome,
        };

        let mut commit = Commit::new(
            repo.id,
            hook.branch().to_string(),
            head.id.clone(),
            head.message.clone(),
            head.author.name.clone(),
        );
        match self.db.save_commit(&commit).await {
            Ok(id) => commit.id = id,
            Err(e) => return Outcome::Failed(Stage::CommitPersist, e),
        }

        let endpoint = self
            .config
            .definition_endpoint
            .as_deref()
            .unwrap_or(&repo.host);
        let url = definition_url(endpoint, &repo.owner, &repo.name, &commit.hash);
        info!(%url, "Fetching build definition");

        let raw_definition = match self.fetcher.fetch(&url).await {
            Ok(body) => body,
            Err(e) => return Outcome::Failed(Stage::DefinitionFetch, e),
        };

        // Repository-level parameter overrides are not sourced from anywhere
        // yet, so the parser always sees an empty set.
        let params: HashMap<String, String> = HashMap::new();
        let plan = match self.parser.parse_build(&raw_definition, &params) {
            Ok(plan) => plan,
            Err(e) => {
                let diagnostic = format!(
                    "Could not parse your .drone.yml file. It needs to be a valid drone yaml file.\n\n{}\n",
                    e
                );
                warn!(hash = %commit.hash, "Build definition rejected: {}", e);
                let failed = Build::failed(commit.id, diagnostic);
                if let Err(persist_err) = self.db.save_build(&failed).await {
                    return Outcome::Failed(Stage::FailedBuildPersist, persist_err);
                }
                return Outcome::Rejected(RejectReason::BadDefinition);
            }
        };

        let mut build = Build::pending(commit.id);
        match self.db.save_build(&build).await {
            Ok(id) => build.id = id,
            Err(e) => return Outcome::Failed(Stage::BuildPersist, e),
        }

        let task = BuildTask {
            repo,
            commit,
            build,
            plan,
        };
        if let Err(e) = self.queue.submit(task).await {
            return Outcome::Failed(Stage::Submit, e);
        }

        Outcome::Submitted
    }

    /// Look a repository up by slug, creating and persisting it on first
    /// sight. The owning user comes from the notification's owner email.
    async fn resolve_repo(
        &self,
        host: &str,
        owner: &str,
        name: &str,
        url: &str,
        owner_email: &str,
        private: bool,
    ) -> Result<Repo, Outcome> {
        let slug = format!("{}/{}/{}", host, owner, name);
        match self.db.repo_by_slug(&slug).await {
            Ok(Some(repo)) => {
                info!(%slug, "Repository already registered");
                return Ok(repo);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(%slug, "Repository lookup failed: {}", e);
                return Err(Outcome::Rejected(RejectReason::BadRequest));
            }
        }

        info!(%slug, "Registering new repository");
        let mut repo = Repo::new(host, owner, name, ScmKind::Git, url);

        let user = match self.db.user_by_email(owner_email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(email = %owner_email, "No user matches repository owner");
                return Err(Outcome::Rejected(RejectReason::OwnerNotFound));
            }
            Err(e) => {
                warn!(email = %owner_email, "Owner lookup failed: {}", e);
                return Err(Outcome::Rejected(RejectReason::OwnerNotFound));
            }
        };

        repo.user_id = user.id;
        repo.private = private;

        match self.db.save_repo(&repo).await {
            Ok(id) => {
                repo.id = id;
                Ok(repo)
            }
            Err(e) => Err(Outcome::Failed(Stage::RepoPersist, e)),
        }
    }
}

/// Split a canonical repository URL (`http://host/owner/name`) into its
/// host, owner and name segments.
fn split_repo_url(url: &str) -> Option<(&str, &str, &str)> {
    let mut parts = url.split('/').skip(2);
    let host = parts.next().filter(|s| !s.is_empty())?;
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next().filter(|s| !s.is_empty())?;
    Some((host, owner, name))
}

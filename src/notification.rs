//! Decoding of inbound Gogs push notifications

use serde::Deserialize;

use crate::error::HookError;

/// Prefix Gogs puts in front of branch refs
const BRANCH_REF_PREFIX: &str = "refs/heads/";

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitEntry {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub url: String,
    pub author: Author,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryDescriptor {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub watchers: i64,
    #[serde(rename = "author")]
    pub owner: Author,
    #[serde(default)]
    pub private: bool,
}

/// The decoded inbound push event
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub secret: String,
    /// Absent in non-push payloads; decodes to empty and is rejected
    /// by validation rather than by the decoder.
    #[serde(rename = "ref", default)]
    pub r#ref: String,
    #[serde(default)]
    pub commits: Vec<CommitEntry>,
    pub repository: Option<RepositoryDescriptor>,
    pub pusher: Option<Author>,
}

impl Notification {
    /// Decode a raw hook body.
    ///
    /// A payload can be valid JSON and still not be a push notification
    /// (another hosting provider may use an overlapping schema), so the
    /// repository and ref fields are checked after decoding.
    pub fn parse(raw: &[u8]) -> Result<Self, HookError> {
        let hook: Notification = serde_json::from_slice(raw)
            .map_err(|e| HookError::MalformedPayload(e.to_string()))?;

        if hook.repository.is_none() {
            return Err(HookError::InvalidNotification("missing repository"));
        }
        if hook.r#ref.is_empty() {
            return Err(HookError::InvalidNotification("empty ref"));
        }

        Ok(hook)
    }

    /// Short branch name, with the `refs/heads/` prefix stripped.
    /// A ref without the prefix is returned unchanged.
    pub fn branch(&self) -> &str {
        self.r#ref
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(&self.r#ref)
    }

    /// The commit that triggers the build: the last entry in the push.
    pub fn head_commit(&self) -> Option<&CommitEntry> {
        self.commits.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_body() -> serde_json::Value {
        serde_json::json!({
            "secret": "s3cret",
            "ref": "refs/heads/main",
            "commits": [
                {
                    "id": "abc123",
                    "message": "fix",
                    "url": "http://gogs.local/acme/widget/commit/abc123",
                    "author": { "name": "a", "email": "a@acme.io" }
                }
            ],
            "repository": {
                "id": 42,
                "name": "widget",
                "url": "http://gogs.local/acme/widget",
                "description": "",
                "website": "",
                "watchers": 1,
                "author": { "name": "acme", "email": "owner@acme.io" },
                "private": true
            },
            "pusher": { "name": "a", "email": "a@acme.io" }
        })
    }

    #[test]
    fn parses_a_push_notification() {
        let body = serde_json::to_vec(&push_body()).unwrap();
        let hook = Notification::parse(&body).unwrap();

        assert_eq!(hook.branch(), "main");
        assert_eq!(hook.head_commit().unwrap().id, "abc123");
        let repo = hook.repository.as_ref().unwrap();
        assert_eq!(repo.id, 42);
        assert!(repo.private);
        assert_eq!(repo.owner.email, "owner@acme.io");
    }

    #[test]
    fn rejects_non_json_bodies() {
        let err = Notification::parse(b"not json").unwrap_err();
        assert!(matches!(err, HookError::MalformedPayload(_)));
    }

    #[test]
    fn rejects_missing_repository() {
        let mut body = push_body();
        body.as_object_mut().unwrap().remove("repository");
        let err = Notification::parse(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(err, HookError::InvalidNotification(_)));
    }

    #[test]
    fn rejects_empty_ref() {
        let mut body = push_body();
        body["ref"] = serde_json::json!("");
        let err = Notification::parse(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(err, HookError::InvalidNotification(_)));
    }

    #[test]
    fn absent_ref_is_rejected_as_invalid_not_malformed() {
        let mut body = push_body();
        body.as_object_mut().unwrap().remove("ref");
        let err = Notification::parse(&serde_json::to_vec(&body).unwrap()).unwrap_err();
        assert!(matches!(err, HookError::InvalidNotification("empty ref")));
    }

    #[test]
    fn branch_without_prefix_is_unchanged() {
        let mut body = push_body();
        body["ref"] = serde_json::json!("main");
        let hook = Notification::parse(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(hook.branch(), "main");
    }

    #[test]
    fn head_commit_is_the_last_entry() {
        let mut body = push_body();
        body["commits"].as_array_mut().unwrap().push(serde_json::json!({
            "id": "def456",
            "message": "more",
            "url": "",
            "author": { "name": "b", "email": "b@acme.io" }
        }));
        let hook = Notification::parse(&serde_json::to_vec(&body).unwrap()).unwrap();
        assert_eq!(hook.head_commit().unwrap().id, "def456");
    }
}

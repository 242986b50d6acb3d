//! Retrieval of build definition files from the hosting service

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::HookError;

/// Fixed name of the build definition file in every repository
pub const DEFINITION_FILE: &str = ".drone.yml";

/// Raw-file URL on the hosting service
pub fn definition_url(endpoint: &str, owner: &str, name: &str, hash: &str) -> String {
    format!(
        "http://{}/{}/{}/raw/{}/{}",
        endpoint, owner, name, hash, DEFINITION_FILE
    )
}

/// Collaborator that fetches a build definition over the network
#[async_trait]
pub trait DefinitionFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HookError>;
}

/// reqwest-backed fetcher used in production
pub struct HttpDefinitionFetcher {
    client: reqwest::Client,
}

impl HttpDefinitionFetcher {
    pub fn new() -> Result<Self, HookError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HookError::FetchError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DefinitionFetcher for HttpDefinitionFetcher {
    /// Only transport failures are errors; a non-2xx response still has its
    /// body handed to the definition parser, which will reject it.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HookError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HookError::FetchError(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| HookError::FetchError(e.to_string()))?;

        Ok(body.to_vec())
    }
}

pub type SharedFetcher = Arc<dyn DefinitionFetcher>;

//! Person/work metadata collaborator
//!
//! Used only to enrich owners and episodes. Results are optional extras;
//! nothing in curation depends on them.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::directory_client::{classify_request_error, classify_status, RateLimiter};
use crate::config::LookupSettings;
use crate::utils::LookupError;

const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/w500";

/// Best person match
#[derive(Debug, Clone, PartialEq)]
pub struct PersonResult {
    pub external_id: String,
    pub image_url: Option<String>,
    /// Titles the person is known for
    pub work_history: Vec<String>,
}

/// Best work (film/show) match
#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult {
    pub id: String,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub genre_ids: Vec<u32>,
}

/// Metadata collaborator interface
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn search_person(&self, name: &str) -> Result<Option<PersonResult>, LookupError>;
    async fn search_work(&self, title: &str) -> Result<Option<WorkResult>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PersonHit {
    id: u64,
    profile_path: Option<String>,
    #[serde(default)]
    known_for: Vec<KnownFor>,
}

#[derive(Debug, Deserialize)]
struct KnownFor {
    title: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkHit {
    id: u64,
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    genre_ids: Vec<u32>,
}

impl From<PersonHit> for PersonResult {
    fn from(hit: PersonHit) -> Self {
        Self {
            external_id: hit.id.to_string(),
            image_url: hit.profile_path.map(|p| format!("{}{}", IMAGE_BASE_URL, p)),
            work_history: hit
                .known_for
                .into_iter()
                .filter_map(|k| k.title.or(k.name))
                .collect(),
        }
    }
}

impl From<WorkHit> for WorkResult {
    fn from(hit: WorkHit) -> Self {
        Self {
            id: hit.id.to_string(),
            title: hit.title.or(hit.name).unwrap_or_default(),
            overview: hit.overview.filter(|o| !o.trim().is_empty()),
            release_date: hit.release_date.or(hit.first_air_date).filter(|d| !d.is_empty()),
            genre_ids: hit.genre_ids,
        }
    }
}

/// TMDb-style HTTP metadata client
pub struct HttpMetadataClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: String,
}

impl HttpMetadataClient {
    /// Build a client; requires `lookup.metadata_api_key`
    pub fn new(settings: &LookupSettings) -> Result<Self, LookupError> {
        let api_key = settings
            .metadata_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LookupError::Permanent("metadata API key not configured".to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout())
            .build()
            .map_err(|e| LookupError::Permanent(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(settings.rate_limit_ms)),
            base_url: settings.metadata_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn search<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<Vec<T>, LookupError> {
        self.rate_limiter.wait().await;

        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!(url = %url, query = %query, "Querying metadata service");

        let response = self
            .http_client
            .get(&url)
            .query(&[("query", query), ("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let parsed: SearchResponse<T> = response
            .json()
            .await
            .map_err(|e| LookupError::Permanent(format!("Parse error: {}", e)))?;

        Ok(parsed.results)
    }
}

#[async_trait]
impl MetadataLookup for HttpMetadataClient {
    async fn search_person(&self, name: &str) -> Result<Option<PersonResult>, LookupError> {
        let hits: Vec<PersonHit> = self.search("search/person", name).await?;
        Ok(hits.into_iter().next().map(PersonResult::from))
    }

    async fn search_work(&self, title: &str) -> Result<Option<WorkResult>, LookupError> {
        let hits: Vec<WorkHit> = self.search("search/multi", title).await?;
        Ok(hits.into_iter().next().map(WorkResult::from))
    }
}

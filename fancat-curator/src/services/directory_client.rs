//! Directory/booking site collaborator
//!
//! Best-effort lookup of an entity's page on a restaurant/shop directory and
//! point-in-time verification of a stored page. Requests are rate limited.

use async_trait::async_trait;
use fancat_common::Entity;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::LookupSettings;
use crate::utils::text::{contains_substring, normalize_name};
use crate::utils::LookupError;

/// Result of checking a stored directory URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Page reachable and describes this entity
    Verified,
    /// Page reports permanent closure
    Closed,
    /// Page reports the business moved
    Relocated,
    /// Page gone, or describes some other place
    UrlInvalid,
}

/// Directory collaborator interface
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Find a directory page for `name` (optionally near `address`)
    async fn resolve_url(
        &self,
        name: &str,
        address: Option<&str>,
    ) -> Result<Option<String>, LookupError>;

    /// Check that `url` is reachable and still describes `entity`
    async fn verify(&self, url: &str, entity: &Entity) -> Result<VerificationOutcome, LookupError>;
}

/// Minimum-interval rate limiter shared by all requests of one client
pub(crate) struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub(crate) fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with rate limit
    pub(crate) async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Classify a reqwest failure
pub(crate) fn classify_request_error(err: &reqwest::Error) -> LookupError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        LookupError::Transient(err.to_string())
    } else {
        LookupError::Permanent(err.to_string())
    }
}

/// Classify a non-success HTTP status
pub(crate) fn classify_status(status: reqwest::StatusCode) -> LookupError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        LookupError::Transient(format!("HTTP {}", status.as_u16()))
    } else {
        LookupError::Permanent(format!("HTTP {}", status.as_u16()))
    }
}

// Status statements only. Bare words like 閉店 or 移転 also appear in the
// standing "report a closure" links every directory page carries.
const CLOSED_MARKERS: &[&str] = &[
    "閉店しました",
    "閉店しております",
    "この店舗は閉店",
    "営業を終了しました",
    "permanently closed",
    "this restaurant has closed",
];
const RELOCATED_MARKERS: &[&str] = &[
    "移転しました",
    "移転のため",
    "この店舗は移転",
    "has moved to",
    "has relocated",
    "this restaurant has moved",
];

/// HTTP directory client
///
/// `resolve_url` requests the configured search URL and takes the first link
/// into one of the configured directory domains. `verify` fetches the page and
/// inspects its text.
pub struct HttpDirectoryClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    search_url: Option<String>,
    directory_domains: Vec<String>,
}

impl HttpDirectoryClient {
    pub fn new(
        settings: &LookupSettings,
        directory_domains: Vec<String>,
    ) -> Result<Self, LookupError> {
        let http_client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout())
            .build()
            .map_err(|e| LookupError::Permanent(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(settings.rate_limit_ms)),
            search_url: settings.directory_search_url.clone(),
            directory_domains,
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<(reqwest::StatusCode, String), LookupError> {
        self.rate_limiter.wait().await;

        tracing::debug!(url = %url, "Querying directory");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_request_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Transient(e.to_string()))?;

        Ok((status, body))
    }
}

#[async_trait]
impl DirectoryLookup for HttpDirectoryClient {
    async fn resolve_url(
        &self,
        name: &str,
        address: Option<&str>,
    ) -> Result<Option<String>, LookupError> {
        let Some(template) = &self.search_url else {
            return Ok(None);
        };

        let query = match address {
            Some(addr) => format!("{} {}", name, addr),
            None => name.to_string(),
        };
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let search = template.replace("{query}", &encoded);

        let (status, body) = self.fetch_text(&search).await?;
        if !status.is_success() {
            return Err(classify_status(status));
        }

        Ok(first_directory_link(&body, &self.directory_domains))
    }

    async fn verify(&self, url: &str, entity: &Entity) -> Result<VerificationOutcome, LookupError> {
        let (status, body) = self.fetch_text(url).await?;

        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Ok(VerificationOutcome::UrlInvalid);
        }
        if !status.is_success() {
            return Err(classify_status(status));
        }

        Ok(classify_page(&body, &entity.name))
    }
}

/// Decide what a fetched directory page says about an entity
///
/// Anchor text is ignored when looking for closure/relocation statements.
pub fn classify_page(body: &str, entity_name: &str) -> VerificationOutcome {
    let status_text = without_anchor_text(body);
    if CLOSED_MARKERS.iter().any(|m| contains_substring(&status_text, m)) {
        return VerificationOutcome::Closed;
    }
    if RELOCATED_MARKERS.iter().any(|m| contains_substring(&status_text, m)) {
        return VerificationOutcome::Relocated;
    }

    let wanted = normalize_name(entity_name);
    if wanted.is_empty() || !normalize_name(body).contains(&wanted) {
        return VerificationOutcome::UrlInvalid;
    }
    VerificationOutcome::Verified
}

/// `body` with the contents of every `<a>...</a>` element removed
fn without_anchor_text(body: &str) -> String {
    let lowered = body.to_ascii_lowercase();
    let mut out = String::with_capacity(body.len());
    let mut pos = 0;

    while let Some(start) = find_anchor_open(&lowered, pos) {
        out.push_str(&body[pos..start]);
        match lowered[start..].find("</a>") {
            Some(end) => pos = start + end + "</a>".len(),
            None => return out,
        }
    }
    out.push_str(&body[pos..]);
    out
}

fn find_anchor_open(lowered: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(offset) = lowered[search..].find("<a") {
        let start = search + offset;
        match lowered[start + 2..].chars().next() {
            Some(c) if c == '>' || c.is_ascii_whitespace() => return Some(start),
            _ => search = start + 2,
        }
    }
    None
}

/// First `href="..."` in `body` pointing into a directory domain
fn first_directory_link(body: &str, domains: &[String]) -> Option<String> {
    body.split("href=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .filter_map(|href| url::Url::parse(href).ok())
        .find(|parsed| {
            parsed
                .host_str()
                .map(|host| host_in_domains(host, domains))
                .unwrap_or(false)
        })
        .map(|parsed| parsed.to_string())
}

/// True when `host` equals or is a subdomain of one of `domains`
pub fn host_in_domains(host: &str, domains: &[String]) -> bool {
    let host = host.to_ascii_lowercase();
    domains.iter().any(|domain| {
        let domain = domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{}", domain))
    })
}

//! Upstream fetch abstraction
//!
//! The handler never talks to the network directly; it goes through a
//! `Fetcher` so embedders can swap in their own client.

use crate::error::{QueryCacheError, QueryCacheResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Options accompanying an upstream fetch
///
/// Headers are kept sorted so the serialized form is stable for hashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub method: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl FetchOptions {
    /// HTTP method, `GET` when unspecified
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }
}

/// A fetch as posted to the cache server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub options: FetchOptions,
}

/// Response captured from upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetch implementation used for cache misses
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> QueryCacheResult<FetchResponse>;
}

/// Default fetcher backed by a blocking `ureq` agent
#[derive(Clone)]
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(timeout: Duration) -> Self {
        // Upstream error statuses are data for the caller, not transport failures
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self { agent }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Fetcher for UreqFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> QueryCacheResult<FetchResponse> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let options = options.clone();

        tokio::task::spawn_blocking(move || fetch_blocking(&agent, &url, &options))
            .await
            .map_err(|e| QueryCacheError::Internal(format!("fetch task failed: {}", e)))?
    }
}

fn fetch_blocking(
    agent: &ureq::Agent,
    url: &str,
    options: &FetchOptions,
) -> QueryCacheResult<FetchResponse> {
    debug!("Fetching {} {}", options.method(), url);

    let mut builder = ureq::http::Request::builder()
        .method(options.method())
        .uri(url);
    for (name, value) in &options.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let result = match &options.body {
        Some(body) => builder
            .body(body.clone())
            .map_err(|e| QueryCacheError::fetch(url, e))
            .and_then(|req| agent.run(req).map_err(|e| QueryCacheError::fetch(url, e))),
        None => builder
            .body(())
            .map_err(|e| QueryCacheError::fetch(url, e))
            .and_then(|req| agent.run(req).map_err(|e| QueryCacheError::fetch(url, e))),
    };
    let mut response = result?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| QueryCacheError::fetch(url, e))?;

    Ok(FetchResponse {
        status,
        headers,
        body,
    })
}

//! Caching proxy request handler
//!
//! Answers fetches posted by build output at runtime. Each request is a JSON
//! `FetchRequest`; the handler derives a cache key, serves a stored response
//! when one exists, and otherwise fetches upstream and stores the result.
//!
//! | Outcome | `x-query-cache` | Stored |
//! |---------|-----------------|--------|
//! | Key present | `hit` | - |
//! | Upstream 2xx | `miss` | yes |
//! | Upstream non-2xx | `miss` | no |
//! | Upstream unreachable | `miss` (502) | no |

pub mod fetch;
pub mod key;
pub mod store;

pub use fetch::{FetchOptions, FetchRequest, FetchResponse, Fetcher, UreqFetcher};
pub use key::{CacheKeyStrategy, DefaultCacheKey, FnCacheKey};
pub use store::ResponseCache;

use crate::error::QueryCacheResult;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Response header reporting whether the cache answered
pub const CACHE_STATUS_HEADER: &str = "x-query-cache";

/// Whether a response came from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// Shared handler state mounted on the cache server
#[derive(Clone)]
pub struct RequestHandler {
    fetcher: Arc<dyn Fetcher>,
    cache_key: Arc<dyn CacheKeyStrategy>,
    cache: Arc<ResponseCache>,
}

impl RequestHandler {
    /// Create a handler; without a key strategy `DefaultCacheKey` is used
    pub fn new(fetcher: Arc<dyn Fetcher>, cache_key: Option<Arc<dyn CacheKeyStrategy>>) -> Self {
        Self {
            fetcher,
            cache_key: cache_key.unwrap_or_else(|| Arc::new(DefaultCacheKey)),
            cache: Arc::new(ResponseCache::new()),
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Serve a fetch from cache, or from upstream on a miss
    pub async fn handle(
        &self,
        request: &FetchRequest,
    ) -> QueryCacheResult<(CacheStatus, FetchResponse)> {
        let key = self
            .cache_key
            .cache_key(&request.url, &request.options)
            .await?;

        if let Some(cached) = self.cache.get(&key).await {
            debug!("Cache hit for {}", request.url);
            return Ok((CacheStatus::Hit, cached));
        }

        debug!("Cache miss for {}", request.url);
        let response = self.fetcher.fetch(&request.url, &request.options).await?;
        self.cache.insert(key, response.clone()).await;

        Ok((CacheStatus::Miss, response))
    }
}

/// Build the router served by the cache server
pub fn router(handler: RequestHandler) -> Router {
    Router::new()
        .route("/", post(handle_fetch))
        .route("/health", get(health_check))
        .with_state(handler)
}

async fn handle_fetch(
    State(handler): State<RequestHandler>,
    Json(request): Json<FetchRequest>,
) -> Response {
    match handler.handle(&request).await {
        Ok((status, response)) => (
            StatusCode::OK,
            [(CACHE_STATUS_HEADER, status.as_str())],
            Json(response),
        )
            .into_response(),
        Err(e) => {
            warn!(url = %request.url, error = %e, "Upstream fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                [(CACHE_STATUS_HEADER, CacheStatus::Miss.as_str())],
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Liveness plus the number of stored responses
async fn health_check(State(handler): State<RequestHandler>) -> Json<serde_json::Value> {
    let entries = handler.cache().len().await;
    Json(serde_json::json!({ "status": "ok", "entries": entries }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryCacheError;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        status: u16,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &str, _: &FetchOptions) -> QueryCacheResult<FetchResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(FetchResponse {
                status: self.status,
                headers: BTreeMap::new(),
                body: format!("{}#{}", url, n),
            })
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, url: &str, _: &FetchOptions) -> QueryCacheResult<FetchResponse> {
            Err(QueryCacheError::fetch(url, "connection refused"))
        }
    }

    fn request(url: &str) -> FetchRequest {
        FetchRequest {
            url: url.to_string(),
            options: FetchOptions::default(),
        }
    }

    #[tokio::test]
    async fn second_fetch_is_a_hit() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            status: 200,
        });
        let handler = RequestHandler::new(fetcher.clone(), None);

        let (first, a) = handler.handle(&request("http://up/a")).await.unwrap();
        let (second, b) = handler.handle(&request("http://up/a")).await.unwrap();

        assert_eq!(first, CacheStatus::Miss);
        assert_eq!(second, CacheStatus::Hit);
        assert_eq!(a, b);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_status_is_not_cached() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            status: 503,
        });
        let handler = RequestHandler::new(fetcher.clone(), None);

        handler.handle(&request("http://up/a")).await.unwrap();
        let (status, _) = handler.handle(&request("http://up/a")).await.unwrap();

        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_key_collapses_urls() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            status: 200,
        });
        let key: Arc<dyn CacheKeyStrategy> =
            Arc::new(FnCacheKey(|_: &str, _: &FetchOptions| "same".to_string()));
        let handler = RequestHandler::new(fetcher.clone(), Some(key));

        handler.handle(&request("http://up/a")).await.unwrap();
        let (status, resp) = handler.handle(&request("http://up/b")).await.unwrap();

        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(resp.body, "http://up/a#1");
    }

    #[tokio::test]
    async fn upstream_failure_propagates() {
        let handler = RequestHandler::new(Arc::new(FailingFetcher), None);
        let err = handler.handle(&request("http://up/a")).await.unwrap_err();
        assert!(matches!(err, QueryCacheError::Fetch { .. }));
        assert_eq!(handler.cache().len().await, 0);
    }

    #[tokio::test]
    async fn health_reports_stored_entries() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
            status: 200,
        });
        let handler = RequestHandler::new(fetcher, None);

        let Json(before) = health_check(State(handler.clone())).await;
        assert_eq!(before["status"], "ok");
        assert_eq!(before["entries"], 0);

        handler.handle(&request("http://up/a")).await.unwrap();
        handler.handle(&request("http://up/b")).await.unwrap();

        let Json(after) = health_check(State(handler)).await;
        assert_eq!(after["entries"], 2);
    }
}

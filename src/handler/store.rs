//! In-memory response store

use crate::handler::fetch::FetchResponse;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Responses keyed by cache key, held for the life of the process
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<String, FetchResponse>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<FetchResponse> {
        self.entries.read().await.get(key).cloned()
    }

    /// Store a response. Only successful responses are kept; returns whether
    /// the response was stored.
    pub async fn insert(&self, key: String, response: FetchResponse) -> bool {
        if !response.is_success() {
            debug!("Not caching status {} for {}", response.status, key);
            return false;
        }
        self.entries.write().await.insert(key, response);
        true
    }

    /// Number of stored responses
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

//! Cache key derivation

use crate::error::QueryCacheResult;
use crate::handler::fetch::FetchOptions;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Derives the cache key for a fetch
///
/// Async so that key functions which need to await (e.g. hash a streamed
/// body) fit the same slot as plain ones.
#[async_trait]
pub trait CacheKeyStrategy: Send + Sync {
    async fn cache_key(&self, url: &str, options: &FetchOptions) -> QueryCacheResult<String>;
}

/// SHA256 over the URL and the JSON form of the options, hex encoded
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCacheKey;

#[async_trait]
impl CacheKeyStrategy for DefaultCacheKey {
    async fn cache_key(&self, url: &str, options: &FetchOptions) -> QueryCacheResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(options)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// Adapts a plain closure into a `CacheKeyStrategy`
pub struct FnCacheKey<F>(pub F);

#[async_trait]
impl<F> CacheKeyStrategy for FnCacheKey<F>
where
    F: Fn(&str, &FetchOptions) -> String + Send + Sync,
{
    async fn cache_key(&self, url: &str, options: &FetchOptions) -> QueryCacheResult<String> {
        Ok((self.0)(url, options))
    }
}

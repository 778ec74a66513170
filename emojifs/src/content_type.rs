//! Per-emoji MIME type lookup, memoized in a bounded LRU cache with a TTL.

use moka::future::Cache;
use moka::policy::EvictionPolicy;

use crate::config::CacheConfig;
use crate::error::{EmojiFsError, Result};
use crate::remote::MattermostClient;

pub struct ContentTypeResolver {
    remote: MattermostClient,
    cache: Cache<String, String>,
}

impl ContentTypeResolver {
    pub fn new(remote: MattermostClient, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .name("emoji_content_type")
            .max_capacity(config.content_type_capacity)
            .time_to_live(config.content_type_ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { remote, cache }
    }

    /// MIME type of the emoji image `id`, probed with a HEAD request on a miss.
    /// Failures are not cached, so a later call probes again.
    pub async fn resolve(&self, id: &str) -> Result<String> {
        let content_type = self
            .cache
            .try_get_with_by_ref(id, async {
                let content_type = self.remote.content_type(id).await?;
                tracing::debug!("Emoji {id} has Content-Type {content_type}");
                Ok::<_, EmojiFsError>(content_type)
            })
            .await?;
        Ok(content_type)
    }

    /// Forget the cached type of `id` so the next resolve probes the server.
    pub async fn invalidate(&self, id: &str) {
        self.cache.invalidate(id).await;
    }
}

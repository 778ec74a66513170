//! Remote emoji catalog with a single-slot TTL cache.
//!
//! The whole catalog is refetched page by page on a miss and published
//! atomically: a refresh that fails halfway publishes nothing. Concurrent
//! misses share one in-flight refresh through `Cache::try_get_with`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use moka::future::Cache;
use tokio::sync::RwLock;

use crate::config::CacheConfig;
use crate::error::{EmojiFsError, Result};
use crate::remote::{Emoji, MattermostClient, PAGE_SIZE};

/// Snapshot of every emoji keyed by its logical name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, Emoji>,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&Emoji> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Emoji> {
        self.entries.values()
    }

    pub fn newest_update(&self) -> Option<SystemTime> {
        self.entries.values().map(Emoji::updated).max()
    }

    pub fn oldest_create(&self) -> Option<SystemTime> {
        self.entries.values().map(Emoji::created).min()
    }
}

impl FromIterator<Emoji> for Catalog {
    fn from_iter<I: IntoIterator<Item = Emoji>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }
}

pub struct CatalogClient {
    remote: MattermostClient,
    cache: Cache<(), Arc<Catalog>>,
    last_good: RwLock<Option<Arc<Catalog>>>,
}

impl CatalogClient {
    pub fn new(remote: MattermostClient, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .name("emoji_catalog")
            .max_capacity(1)
            .time_to_live(config.catalog_ttl)
            .build();
        Self {
            remote,
            cache,
            last_good: RwLock::new(None),
        }
    }

    /// Current catalog, refreshed from the server when the cached one expired.
    pub async fn list_all(&self) -> Result<Arc<Catalog>> {
        let catalog = self
            .cache
            .try_get_with((), async {
                let catalog = Arc::new(fetch_catalog(&self.remote).await?);
                *self.last_good.write().await = Some(catalog.clone());
                Ok::<_, EmojiFsError>(catalog)
            })
            .await?;
        Ok(catalog)
    }

    /// Like `list_all`, but serves the last good snapshot when the server is unreachable.
    pub async fn list_all_or_stale(&self) -> Result<Arc<Catalog>> {
        match self.list_all().await {
            Ok(catalog) => Ok(catalog),
            Err(EmojiFsError::RemoteUnavailable(cause)) => {
                match self.last_good.read().await.clone() {
                    Some(stale) => {
                        tracing::warn!("Serving stale emoji catalog, refresh failed: {cause}");
                        Ok(stale)
                    }
                    None => Err(EmojiFsError::RemoteUnavailable(cause)),
                }
            }
            Err(e) => Err(e),
        }
    }
}

async fn fetch_catalog(remote: &MattermostClient) -> Result<Catalog> {
    let mut entries: Vec<Emoji> = Vec::new();
    let mut page = 0u32;
    loop {
        let batch = remote.list_page(page).await?;
        let last = batch.len() < PAGE_SIZE;
        entries.extend(batch);
        if last {
            break;
        }
        page += 1;
    }
    let catalog: Catalog = entries.into_iter().collect();
    tracing::debug!("Fetched {} emojis in {} page(s)", catalog.len(), page + 1);
    Ok(catalog)
}

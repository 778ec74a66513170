use std::time::Duration;

/// TTLs and bounds of the two remote caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub catalog_ttl: Duration,
    pub content_type_ttl: Duration,
    pub content_type_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            catalog_ttl: Duration::from_secs(600),
            content_type_ttl: Duration::from_secs(600),
            content_type_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MountConfig {
    /// Let users other than the mounting one see the files.
    pub allow_other: bool,
    /// Mount through /dev/fuse directly instead of fusermount3.
    pub privileged: bool,
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use emojifs::Result;
use emojifs::config::{CacheConfig, MountConfig};
use emojifs::filename::SuffixTable;
use emojifs::remote::transport::TransportConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Args {
    /// Base URL of the Mattermost instance
    #[arg(long, env = "EMOJIFS_URL")]
    pub(crate) url: String,

    /// Personal access token used as bearer token
    #[arg(long, env = "EMOJIFS_TOKEN", hide_env_values = true)]
    pub(crate) token: String,

    /// Empty directory to mount the emoji on
    pub(crate) mountpoint: PathBuf,

    /// Seconds the emoji listing is cached
    #[arg(long, env = "EMOJIFS_CATALOG_TTL_SECS", default_value_t = 600)]
    pub(crate) catalog_ttl_secs: u64,

    /// Seconds a resolved Content-Type is cached
    #[arg(long, env = "EMOJIFS_CONTENT_TYPE_TTL_SECS", default_value_t = 600)]
    pub(crate) content_type_ttl_secs: u64,

    /// Maximum number of cached Content-Types
    #[arg(long, env = "EMOJIFS_CONTENT_TYPE_CAPACITY", default_value_t = 1000)]
    pub(crate) content_type_capacity: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "EMOJIFS_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub(crate) request_timeout_secs: u64,

    /// Allow other users to access the mount
    #[arg(long)]
    pub(crate) allow_other: bool,

    /// Mount directly instead of through fusermount3 (needs root)
    #[arg(long)]
    pub(crate) privileged: bool,

    /// Extra Content-Type to filename suffix mapping, e.g. image/webp=.webp
    #[arg(long = "suffix", value_name = "MIME=.EXT")]
    pub(crate) suffixes: Vec<String>,
}

impl Args {
    pub(crate) fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            ..TransportConfig::new(&self.url, &self.token)
        }
    }

    pub(crate) fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            catalog_ttl: Duration::from_secs(self.catalog_ttl_secs),
            content_type_ttl: Duration::from_secs(self.content_type_ttl_secs),
            content_type_capacity: self.content_type_capacity,
        }
    }

    pub(crate) fn mount_config(&self) -> MountConfig {
        MountConfig {
            allow_other: self.allow_other,
            privileged: self.privileged,
        }
    }

    pub(crate) fn suffix_table(&self) -> Result<SuffixTable> {
        let mut table = SuffixTable::default();
        for raw in &self.suffixes {
            let (mime, suffix) = SuffixTable::parse_mapping(raw)?;
            table.insert(&mime, &suffix);
        }
        Ok(table)
    }
}

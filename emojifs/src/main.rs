mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use emojifs::fuse::mount::mount_emojifs;
use emojifs::remote::MattermostClient;
use emojifs::remote::transport::HttpTransport;
use emojifs::{EmojiFs, EmojiFuse};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let transport = HttpTransport::new(&args.transport_config())?;
    let remote = MattermostClient::new(Arc::new(transport));
    let me = remote
        .me()
        .await
        .with_context(|| format!("Failed to log into Mattermost at {}", args.url))?;
    tracing::info!("Logged into Mattermost instance at {} as {}", args.url, me.username);

    let fs = EmojiFs::new(remote, &args.cache_config(), args.suffix_table()?);

    std::fs::create_dir_all(&args.mountpoint).with_context(|| {
        format!("Failed to create mount point {}", args.mountpoint.display())
    })?;
    let mut mount_handle = mount_emojifs(EmojiFuse::new(fs), &args.mountpoint, &args.mount_config())
        .await
        .with_context(|| {
            format!(
                "Failed to mount at {} (is FUSE with fusermount3 available?)",
                args.mountpoint.display()
            )
        })?;

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => res?,
        _ = signal::ctrl_c() => {
            tracing::info!("Unmounting {}", args.mountpoint.display());
            mount_handle.unmount().await?;
        }
    }
    Ok(())
}

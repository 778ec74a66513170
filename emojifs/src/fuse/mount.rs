//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Linux. Unprivileged mounts go through fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs.

use std::path::Path;

use rfuse3::MountOptions;

use super::EmojiFuse;
use crate::config::MountConfig;
use crate::vfs::Identity;

/// Mount options for emojifs: files owned by `owner`, no `allow_other` unless asked.
pub fn mount_options(config: &MountConfig, owner: Identity) -> MountOptions {
    let mut mo = MountOptions::default();
    mo.fs_name("emojifs")
        .uid(owner.uid)
        .gid(owner.gid)
        .allow_other(config.allow_other);
    mo
}

/// Mount `fs` on the given directory and return the handle driving the session.
#[cfg(target_os = "linux")]
pub async fn mount_emojifs(
    fs: EmojiFuse,
    mount_point: impl AsRef<Path>,
    config: &MountConfig,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let opts = mount_options(config, Identity::current());
    let session = rfuse3::raw::Session::new(opts);
    tracing::info!(
        "Mounting emojifs at {} ({})",
        mount_point.as_ref().display(),
        if config.privileged { "privileged" } else { "unprivileged" }
    );
    if config.privileged {
        session.mount(fs, mount_point).await
    } else {
        session.mount_with_unprivileged(fs, mount_point).await
    }
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_emojifs(
    _fs: EmojiFuse,
    _mount_point: impl AsRef<Path>,
    _config: &MountConfig,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod mount_tests {
    use std::fs;
    use std::time::Duration;

    use super::*;
    use crate::config::CacheConfig;
    use crate::filename::SuffixTable;
    use crate::remote::mock::{FakeMattermost, emoji, image_bytes};
    use crate::vfs::EmojiFs;

    // Needs /dev/fuse and fusermount3; enabled with EMOJIFS_FUSE_TEST=1.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_mount_list_and_read() {
        if std::env::var("EMOJIFS_FUSE_TEST").ok().as_deref() != Some("1") {
            eprintln!("skip fuse mount test: set EMOJIFS_FUSE_TEST=1 to enable");
            return;
        }

        let fake = FakeMattermost::new().with_emoji(emoji("1", "smile", 1000, 2000), "image/png");
        let emojifs = EmojiFs::new(fake.client(), &CacheConfig::default(), SuffixTable::default());

        let mnt = tempfile::tempdir().expect("tmp mount");
        let mnt_path = mnt.path().to_path_buf();
        let handle = match mount_emojifs(EmojiFuse::new(emojifs), &mnt_path, &MountConfig::default()).await
        {
            Ok(h) => h,
            Err(e) => {
                eprintln!("skip fuse test: mount failed: {e}");
                return;
            }
        };
        tokio::time::sleep(Duration::from_millis(500)).await;

        let listed = tokio::task::spawn_blocking({
            let mnt_path = mnt_path.clone();
            move || {
                let names: Vec<String> = fs::read_dir(&mnt_path)
                    .expect("readdir")
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                let content = fs::read(mnt_path.join("smile.png")).expect("read");
                (names, content)
            }
        })
        .await
        .unwrap();

        assert!(listed.0.iter().any(|n| n == "smile.png"));
        assert_eq!(listed.1, image_bytes("1").to_vec());

        if let Err(e) = handle.unmount().await {
            eprintln!("unmount error: {e}");
        }
    }
}

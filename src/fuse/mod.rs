//! FUSE front end for the bind filesystem

pub mod attributes;
pub mod filesystem;
pub mod inodes;
pub mod operations;

pub use filesystem::BindFuse;

use crate::config::MountConfig;
use crate::fs::BindFs;
use anyhow::{Context, Result};
use fuser::MountOption;
use log::info;
use tokio::runtime::Handle;

/// Kernel mount options for `config`.
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let settings = &config.settings;
    let mut options = vec![
        MountOption::FSName(config.fsname()),
        MountOption::Subtype("bindfs".to_string()),
        MountOption::RW,
    ];
    if settings.default_permissions {
        options.push(MountOption::DefaultPermissions);
    }
    if settings.allow_other {
        options.push(MountOption::AllowOther);
    } else if settings.allow_root {
        options.push(MountOption::AllowRoot);
    }
    if settings.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    if config.is_self_bind() {
        options.push(MountOption::CUSTOM("nonempty".to_string()));
    }
    options
}

/// Bind the source and serve it at the destination until unmounted.
pub fn mount_filesystem(config: &MountConfig, runtime: Handle) -> Result<()> {
    let fs = BindFs::bind(&config.source)
        .with_context(|| format!("Failed to bind {}", config.source.display()))?;
    let fuse = BindFuse::new(fs, runtime, config.settings.attr_ttl());
    let options = mount_options(config);

    info!(
        "Mounting {} at {}",
        config.source.display(),
        config.destination.display()
    );
    fuser::mount2(fuse, &config.destination, &options)
        .with_context(|| format!("Failed to mount at {}", config.destination.display()))?;
    info!("Unmounted {}", config.destination.display());
    Ok(())
}

//! bindfs: mount a directory somewhere else (or over itself) through FUSE
//!
//! Every path the kernel hands in is resolved beneath the source directory,
//! so nothing outside it can be reached through the mount.

use anyhow::{Context, Result, anyhow};
use bindfs::config::{MountConfig, MountSettings};
use bindfs::fuse::mount_filesystem;
use clap::{Arg, ArgAction, Command};
use log::{error, info};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let matches = Command::new("bindfs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Mount a directory at another location, confined to its own tree")
        .arg(
            Arg::new("src")
                .short('s')
                .long("src")
                .value_name("PATH")
                .help("Directory to expose")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("dst")
                .short('d')
                .long("dst")
                .value_name("PATH")
                .help("Mount point path")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("foreground")
                .short('f')
                .long("foreground")
                .help("Stay in the foreground instead of detaching")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Settings file (JSON)")
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log every filesystem call")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let default_filter = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let src = matches
        .get_one::<String>("src")
        .ok_or_else(|| anyhow!("--src is required"))?;
    let dst = matches
        .get_one::<String>("dst")
        .ok_or_else(|| anyhow!("--dst is required"))?;
    let config_file = matches.get_one::<String>("config").map(PathBuf::from);

    let settings =
        MountSettings::load(config_file.as_deref()).context("Failed to load settings")?;
    let config = MountConfig::new(src, dst, matches.get_flag("foreground"), settings)?;

    info!("Source: {}", config.source.display());
    info!("Mount point: {}", config.destination.display());

    if !config.foreground {
        detach().context("Failed to move to the background")?;
    }

    // Created only after any fork; the child must not inherit worker threads
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let mountpoint_for_shutdown = config.destination.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        if let Err(e) = unmount(&mountpoint_for_shutdown) {
            error!("Failed to unmount filesystem: {}", e);
            std::process::exit(1);
        }
    })
    .context("Error setting Ctrl-C handler")?;

    mount_filesystem(&config, runtime.handle().clone())
}

/// Fork; the parent exits and the child leads a new session.
fn detach() -> Result<()> {
    // SAFETY: single-threaded at this point; no runtime or handler thread yet
    match unsafe { libc::fork() } {
        -1 => Err(std::io::Error::last_os_error()).context("fork failed"),
        0 => {
            // SAFETY: plain syscall in the freshly forked child
            if unsafe { libc::setsid() } == -1 {
                return Err(std::io::Error::last_os_error()).context("setsid failed");
            }
            Ok(())
        }
        _ => std::process::exit(0),
    }
}

fn unmount(mountpoint: &Path) -> Result<()> {
    let output = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(mountpoint)
        .output()
        .context("Failed to run fusermount")?;
    if !output.status.success() {
        return Err(anyhow!(
            "fusermount -u {} failed: {}",
            mountpoint.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    info!("Filesystem unmounted successfully");
    Ok(())
}

//! Real-mount checks; need /dev/fuse and fusermount.
//! Run with `--features integration-tests`.
#![cfg(feature = "integration-tests")]

use bindfs::BindFs;
use bindfs::fuse::BindFuse;
use fuser::MountOption;
use std::time::Duration;
use tempfile::TempDir;

struct Mounted {
    _session: fuser::BackgroundSession,
    _runtime: tokio::runtime::Runtime,
}

fn mount(source: &std::path::Path, mountpoint: &std::path::Path) -> Mounted {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let fs = BindFs::bind(source).unwrap();
    let fuse = BindFuse::new(fs, runtime.handle().clone(), Duration::from_secs(1));
    let options = [
        MountOption::FSName("bindfs-test".to_string()),
        MountOption::RW,
    ];
    let session = fuser::spawn_mount2(fuse, mountpoint, &options).unwrap();
    // Give the kernel a moment to finish INIT
    std::thread::sleep(Duration::from_millis(200));
    Mounted {
        _session: session,
        _runtime: runtime,
    }
}

#[test]
fn test_mount_round_trip() {
    let source = TempDir::new().unwrap();
    let mountpoint = TempDir::new().unwrap();
    std::fs::write(source.path().join("hello.txt"), b"hello").unwrap();

    let _mounted = mount(source.path(), mountpoint.path());
    let mnt = mountpoint.path();

    assert_eq!(std::fs::read(mnt.join("hello.txt")).unwrap(), b"hello");

    std::fs::create_dir(mnt.join("dir")).unwrap();
    std::fs::write(mnt.join("dir/new.txt"), b"through the mount").unwrap();
    assert_eq!(
        std::fs::read(source.path().join("dir/new.txt")).unwrap(),
        b"through the mount"
    );

    std::fs::rename(mnt.join("dir/new.txt"), mnt.join("moved.txt")).unwrap();
    assert!(source.path().join("moved.txt").exists());
    assert_eq!(std::fs::metadata(mnt.join("moved.txt")).unwrap().len(), 17);

    let mut names: Vec<String> = std::fs::read_dir(mnt)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["dir", "hello.txt", "moved.txt"]);

    std::fs::remove_file(mnt.join("moved.txt")).unwrap();
    std::fs::remove_dir(mnt.join("dir")).unwrap();
    assert!(!source.path().join("dir").exists());
}

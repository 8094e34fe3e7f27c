#![allow(dead_code)]

use bindfs::BindFs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A bound source directory nested one level inside a scratch dir, so tests
/// can check that nothing ever lands next to it.
pub struct TestEnv {
    pub scratch: TempDir,
    pub source: PathBuf,
    pub fs: BindFs,
}

pub fn setup() -> TestEnv {
    let scratch = TempDir::new().unwrap();
    let source = scratch.path().join("source");
    std::fs::create_dir(&source).unwrap();
    let fs = BindFs::bind(&source).unwrap();
    TestEnv { scratch, source, fs }
}

impl TestEnv {
    /// Names directly inside the scratch dir.
    pub fn scratch_entries(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn real(&self, rel: &str) -> PathBuf {
        self.source.join(rel)
    }
}

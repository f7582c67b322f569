#![allow(dead_code, missing_docs, clippy::unwrap_used)]

pub mod mocks;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

/// A temporary base directory holding `1.json` and `2.json`.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.json"), r#"{"id": 1}"#).unwrap();
        std::fs::write(dir.path().join("2.json"), r#"{"id": 2}"#).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, key: &str) -> PathBuf {
        self.dir.path().join(key)
    }

    /// Overwrite `key` and stamp it with `mtime`, so the change is visible regardless of the
    /// filesystem's timestamp granularity.
    pub fn rewrite(&self, key: &str, content: &str, mtime: SystemTime) {
        std::fs::write(self.file(key), content).unwrap();
        self.set_mtime(key, mtime);
    }

    pub fn set_mtime(&self, key: &str, mtime: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(self.file(key))
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }
}

/// June 4, 1981 18:00:00 UTC.
pub fn distant_past() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(360_525_600)
}

/// Poll `cond` until it returns true, or panic after about a second.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition did not become true within 1 second");
}

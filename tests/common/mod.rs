#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub use fwunwrap::test_support::{
    brotli_bytes, lz4_bytes, nested_zip, tar_bytes, tar_members, zip_bytes, FakeTools, TarMember,
};

/// A scratch directory holding input blobs and any number of output dirs.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn blob(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).expect("Failed to write blob");
        path
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

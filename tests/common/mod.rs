use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Routes crate logs to the test output when `RUST_LOG` is set.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scratch directory for one test, removed on drop.
pub struct Fixture {
    pub tempdir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let tempdir = TempDir::new().expect("create temp dir");
        Self { tempdir }
    }

    pub fn root(&self) -> &Path {
        self.tempdir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.tempdir.path().join(name)
    }

    pub fn write_file(&self, name: &str, data: &[u8]) {
        std::fs::write(self.path(name), data).expect("write fixture file");
    }

    pub fn create_dir(&self, name: &str) {
        std::fs::create_dir_all(self.path(name)).expect("create fixture dir");
    }

    pub fn read(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.path(name)).expect("read file")
    }

    /// Names of leftover `*.tmp` entries anywhere under the fixture.
    pub fn temp_files(&self) -> Vec<String> {
        fn visit(dir: &Path, found: &mut Vec<String>) {
            for entry in std::fs::read_dir(dir).expect("list dir") {
                let entry = entry.expect("dir entry");
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(".tmp") {
                    found.push(name.clone());
                }
                if entry.path().is_dir() {
                    visit(&entry.path(), found);
                }
            }
        }
        let mut found = Vec::new();
        visit(self.tempdir.path(), &mut found);
        found
    }
}

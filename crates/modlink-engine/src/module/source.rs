//! Module content sources
//!
//! A source maps virtual absolute paths (`/src/main.js`) to content. The
//! filesystem source serves them from a root directory; the in-memory source
//! is used by embedders and tests, and can also hold host-defined scripts that
//! skip parsing entirely.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::script::ScriptModule;

/// Raw content fetched for a path
#[derive(Debug, Clone)]
pub enum Content {
    /// Undecoded bytes
    Bytes(Arc<[u8]>),
    /// A script whose declarations and body were provided by the host
    Script(Arc<ScriptModule>),
}

/// Provider of module content
pub trait ModuleSource: Send + Sync {
    /// Whether a resource exists at `path`
    fn exists(&self, path: &str) -> bool;

    /// Fetch the content at `path`
    fn fetch(&self, path: &str) -> io::Result<Content>;
}

/// Filesystem-backed source rooted at a directory
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    /// Create a source serving files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a virtual path
    pub fn host_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl ModuleSource for FsSource {
    fn exists(&self, path: &str) -> bool {
        self.host_path(path).is_file()
    }

    fn fetch(&self, path: &str) -> io::Result<Content> {
        let bytes = std::fs::read(self.host_path(path))?;
        Ok(Content::Bytes(Arc::from(bytes)))
    }
}

/// In-memory source
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: RwLock<FxHashMap<String, Content>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text file
    pub fn insert_text(&self, path: &str, text: &str) {
        self.insert(path, Content::Bytes(Arc::from(text.as_bytes())));
    }

    /// Add raw bytes
    pub fn insert_bytes(&self, path: &str, bytes: &[u8]) {
        self.insert(path, Content::Bytes(Arc::from(bytes)));
    }

    /// Add a host-defined script
    pub fn insert_script(&self, path: &str, script: ScriptModule) {
        self.insert(path, Content::Script(Arc::new(script)));
    }

    /// Builder-style [`MemorySource::insert_text`]
    pub fn with_text(self, path: &str, text: &str) -> Self {
        self.insert_text(path, text);
        self
    }

    /// Builder-style [`MemorySource::insert_script`]
    pub fn with_script(self, path: &str, script: ScriptModule) -> Self {
        self.insert_script(path, script);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn insert(&self, path: &str, content: Content) {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self.entries.write().insert(path, content);
    }
}

impl ModuleSource for MemorySource {
    fn exists(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    fn fetch(&self, path: &str) -> io::Result<Content> {
        self.entries
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such module: {}", path)))
    }
}

impl<S: ModuleSource + ?Sized> ModuleSource for Arc<S> {
    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }

    fn fetch(&self, path: &str) -> io::Result<Content> {
        (**self).fetch(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_memory_source_normalizes_paths() {
        let source = MemorySource::new().with_text("src/a.js", "export const a = 1;");

        assert!(source.exists("/src/a.js"));
        assert!(!source.exists("src/a.js"));
        assert!(matches!(source.fetch("/src/a.js"), Ok(Content::Bytes(_))));
    }

    #[test]
    fn test_memory_source_missing() {
        let source = MemorySource::new();
        let err = source.fetch("/missing.js").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_fs_source_reads_under_root() {
        let temp_dir = TempDir::new().unwrap();
        let src_dir = temp_dir.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();
        fs::write(src_dir.join("main.js"), "import \"./b.js\";").unwrap();

        let source = FsSource::new(temp_dir.path());
        assert!(source.exists("/src/main.js"));
        assert!(!source.exists("/src"));

        match source.fetch("/src/main.js").unwrap() {
            Content::Bytes(bytes) => assert_eq!(&*bytes, b"import \"./b.js\";"),
            Content::Script(_) => panic!("Expected bytes"),
        }
    }
}

//! Loader configuration (modlink.toml)
//!
//! ```toml
//! root = "."
//!
//! [resolve]
//! extensions = ["js", "mjs"]
//! index_files = ["index.js"]
//! default_namespace = "node"
//! attributes = ["type"]
//!
//! [imports]
//! "lodash" = "./vendor/lodash.js"
//! "@app/" = "./src/"
//!
//! [kinds]
//! json = "data"
//! css = "style"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while reading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Semantically invalid configuration
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    /// Directory that virtual absolute paths map onto
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Specifier resolution settings
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Explicit remapping table for bare specifiers
    #[serde(default)]
    pub imports: BTreeMap<String, String>,

    /// Conventional suffix to content type
    #[serde(default = "default_kinds")]
    pub kinds: BTreeMap<String, String>,
}

/// `[resolve]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolveConfig {
    /// Extensions probed for extension-less specifiers, in order
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Files probed when a specifier names a directory
    #[serde(default = "default_index_files")]
    pub index_files: Vec<String>,

    /// Scheme tried for bare specifiers that are not remapped (`process` -> `node:process`)
    #[serde(default = "default_namespace")]
    pub default_namespace: Option<String>,

    /// Import attribute keys the loader understands
    #[serde(default = "default_attributes")]
    pub attributes: Vec<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_extensions() -> Vec<String> {
    vec!["js".to_string(), "mjs".to_string()]
}

fn default_index_files() -> Vec<String> {
    vec!["index.js".to_string()]
}

fn default_namespace() -> Option<String> {
    Some("node".to_string())
}

fn default_attributes() -> Vec<String> {
    vec!["type".to_string()]
}

fn default_kinds() -> BTreeMap<String, String> {
    [
        ("js", "script"),
        ("mjs", "script"),
        ("json", "data"),
        ("css", "style"),
    ]
    .into_iter()
    .map(|(ext, kind)| (ext.to_string(), kind.to_string()))
    .collect()
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            index_files: default_index_files(),
            default_namespace: default_namespace(),
            attributes: default_attributes(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            resolve: ResolveConfig::default(),
            imports: BTreeMap::new(),
            kinds: default_kinds(),
        }
    }
}

impl LoaderConfig {
    /// Load a configuration file. A relative `root` is taken relative to the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&content)?;
        if config.root.is_relative() {
            if let Some(dir) = path.parent() {
                config.root = dir.join(&config.root);
            }
        }
        Ok(config)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: LoaderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Same configuration rooted elsewhere
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Add a remapping entry
    pub fn with_import(mut self, from: &str, to: &str) -> Self {
        self.imports.insert(from.to_string(), to.to_string());
        self
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ext) = self.resolve.extensions.iter().find(|e| e.is_empty() || e.starts_with('.')) {
            return Err(ConfigError::ValidationError(format!(
                "extension {:?} must be non-empty and given without a leading dot",
                ext
            )));
        }
        if self.imports.keys().any(|k| k.is_empty()) {
            return Err(ConfigError::ValidationError(
                "import remapping keys must not be empty".to_string(),
            ));
        }
        if self.imports.values().any(|v| v.is_empty()) {
            return Err(ConfigError::ValidationError(
                "import remapping targets must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.resolve.extensions, vec!["js", "mjs"]);
        assert_eq!(config.resolve.default_namespace.as_deref(), Some("node"));
        assert_eq!(config.kinds.get("json").map(String::as_str), Some("data"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            root = "app"

            [resolve]
            extensions = ["js"]
            default_namespace = "std"

            [imports]
            "lodash" = "./vendor/lodash.js"
            "@app/" = "./src/"

            [kinds]
            json = "data"
            cfg = "data"
        "#;

        let config = LoaderConfig::from_toml(toml).unwrap();
        assert_eq!(config.root, PathBuf::from("app"));
        assert_eq!(config.resolve.extensions, vec!["js"]);
        assert_eq!(config.resolve.index_files, vec!["index.js"]);
        assert_eq!(config.resolve.default_namespace.as_deref(), Some("std"));
        assert_eq!(config.imports.len(), 2);
        assert_eq!(config.kinds.get("cfg").map(String::as_str), Some("data"));
        assert!(!config.kinds.contains_key("css"));
    }

    #[test]
    fn test_rejects_dotted_extension() {
        let result = LoaderConfig::from_toml("[resolve]\nextensions = [\".js\"]\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = LoaderConfig::from_toml("root = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_resolves_root_against_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("modlink.toml");
        fs::write(&path, "root = \"src\"\n").unwrap();

        let config = LoaderConfig::load(&path).unwrap();
        assert_eq!(config.root, temp_dir.path().join("src"));
    }
}

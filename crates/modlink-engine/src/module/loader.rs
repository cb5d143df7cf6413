//! Content loading
//!
//! Fetches the content behind a canonical key and turns it into a
//! [`RawModule`] according to the key's kind. Structured data and
//! stylesheets are parsed here, eagerly; scripts go through the configured
//! [`ScriptParser`].

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

use super::key::{CanonicalKey, Location, ModuleKind};
use super::source::{Content, ModuleSource};
use super::style::StyleSheet;
use crate::error::LoadError;
use crate::script::{ScriptModule, ScriptParser};

/// Loaded and classified module content
#[derive(Debug, Clone)]
pub enum RawModule {
    Script(Arc<ScriptModule>),
    /// Parsed data; shared and never mutated
    StructuredData(Arc<serde_json::Value>),
    StyleResource(Arc<StyleSheet>),
}

impl RawModule {
    pub fn kind(&self) -> ModuleKind {
        match self {
            RawModule::Script(_) => ModuleKind::Script,
            RawModule::StructuredData(_) => ModuleKind::StructuredData,
            RawModule::StyleResource(_) => ModuleKind::StyleResource,
        }
    }
}

/// Loader for module content
pub struct ContentLoader {
    source: Arc<dyn ModuleSource>,
    parser: Arc<dyn ScriptParser>,
    builtins: FxHashMap<Arc<str>, Arc<ScriptModule>>,
}

impl ContentLoader {
    pub fn new(source: Arc<dyn ModuleSource>, parser: Arc<dyn ScriptParser>) -> Self {
        Self {
            source,
            parser,
            builtins: FxHashMap::default(),
        }
    }

    pub fn source(&self) -> &dyn ModuleSource {
        &*self.source
    }

    /// Register a host module under a builtin name (`node:process`)
    pub fn register_builtin(&mut self, name: &str, script: ScriptModule) {
        self.builtins.insert(Arc::from(name), Arc::new(script));
    }

    /// Load the content for `key`
    pub fn load(&self, key: &CanonicalKey) -> Result<RawModule, LoadError> {
        let kind = key.kind();
        if kind == ModuleKind::Unknown {
            return Err(LoadError::UnsupportedKind {
                module: key.clone(),
            });
        }

        let path = match key.location() {
            Location::Builtin(name) => return self.load_builtin(key, name),
            Location::Path(path) => path,
        };

        let content = self.source.fetch(path).map_err(|e| LoadError::IoFailure {
            module: key.clone(),
            message: e.to_string(),
        })?;

        let bytes = match content {
            Content::Script(script) if kind.is_executable() => {
                return Ok(RawModule::Script(script));
            }
            Content::Script(_) => {
                return Err(LoadError::DecodeFailure {
                    module: key.clone(),
                    message: format!("host-defined script cannot be read as {}", kind),
                });
            }
            Content::Bytes(bytes) => bytes,
        };

        let text = decode(&bytes).map_err(|e| LoadError::DecodeFailure {
            module: key.clone(),
            message: e.to_string(),
        })?;
        debug!(module = %key, %kind, bytes = bytes.len(), "loaded module content");

        match kind {
            ModuleKind::Script => self
                .parser
                .parse(key, text)
                .map(|script| RawModule::Script(Arc::new(script)))
                .map_err(|error| LoadError::Syntax {
                    module: key.clone(),
                    error,
                }),
            ModuleKind::StructuredData => serde_json::from_str(text)
                .map(|data| RawModule::StructuredData(Arc::new(data)))
                .map_err(|e| LoadError::DecodeFailure {
                    module: key.clone(),
                    message: e.to_string(),
                }),
            ModuleKind::StyleResource => StyleSheet::parse(path, text)
                .map(|sheet| RawModule::StyleResource(Arc::new(sheet)))
                .map_err(|e| LoadError::DecodeFailure {
                    module: key.clone(),
                    message: e.to_string(),
                }),
            ModuleKind::Unknown => Err(LoadError::UnsupportedKind {
                module: key.clone(),
            }),
        }
    }

    fn load_builtin(&self, key: &CanonicalKey, name: &str) -> Result<RawModule, LoadError> {
        if !key.kind().is_executable() {
            return Err(LoadError::UnsupportedKind {
                module: key.clone(),
            });
        }
        self.builtins
            .get(name)
            .cloned()
            .map(RawModule::Script)
            .ok_or_else(|| LoadError::IoFailure {
                module: key.clone(),
                message: format!("builtin module '{}' is not registered", name),
            })
    }
}

/// UTF-8 decode, dropping a leading byte order mark
fn decode(bytes: &[u8]) -> Result<&str, std::str::Utf8Error> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes)
}

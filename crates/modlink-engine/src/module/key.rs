//! Canonical module identity
//!
//! A module is identified by where it lives *and* by the attributes it was
//! requested with, so `./data.cfg` imported as data and as a stylesheet are two
//! different modules.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Import attributes attached to an import site (`with { type: "json" }`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Attributes(BTreeMap<Arc<str>, Arc<str>>);

impl Attributes {
    /// Create an empty attribute set
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute set with a single `type` entry
    pub fn of_type(content_type: &str) -> Self {
        Self::new().with("type", content_type)
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace an attribute
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(Arc::from(key), Arc::from(value));
    }

    /// Copy of this set without `key`
    pub fn without(&self, key: &str) -> Self {
        let mut attributes = self.clone();
        attributes.0.remove(key);
        attributes
    }

    /// Get an attribute value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| &**v)
    }

    /// The declared content type, if any
    pub fn content_type(&self) -> Option<&str> {
        self.get("type")
    }

    /// Iterate over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (&**k, &**v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        for (key, value) in iter {
            attributes.insert(key, value);
        }
        attributes
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {}: {:?}", key, value)?;
        }
        f.write_str(" }")
    }
}

/// How a module's content is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModuleKind {
    /// Executable source with import/export declarations
    Script,
    /// Parsed data exposed as a frozen `default` export
    StructuredData,
    /// Stylesheet exposed as an opaque `default` handle
    StyleResource,
    /// Nothing knows how to load it
    Unknown,
}

impl ModuleKind {
    /// Map a declared content type (`type` attribute or configured suffix) to a kind
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            "javascript" | "script" | "js" => ModuleKind::Script,
            "json" | "data" => ModuleKind::StructuredData,
            "css" | "style" => ModuleKind::StyleResource,
            _ => ModuleKind::Unknown,
        }
    }

    /// Whether loading this kind runs code
    pub fn is_executable(self) -> bool {
        matches!(self, ModuleKind::Script)
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Script => "script",
            ModuleKind::StructuredData => "structured data",
            ModuleKind::StyleResource => "style resource",
            ModuleKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a module's content comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    /// Normalized virtual absolute path (`/src/main.js`)
    Path(Arc<str>),
    /// Host-provided module (`node:process`)
    Builtin(Arc<str>),
}

impl Location {
    pub fn as_str(&self) -> &str {
        match self {
            Location::Path(path) => path,
            Location::Builtin(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self, Location::Builtin(_))
    }

    /// Directory containing a path location; `/` for builtins
    pub fn directory(&self) -> &str {
        match self {
            Location::Path(path) => match path.rfind('/') {
                Some(0) | None => "/",
                Some(idx) => &path[..idx],
            },
            Location::Builtin(_) => "/",
        }
    }

    /// File extension of a path location
    pub fn extension(&self) -> Option<&str> {
        match self {
            Location::Path(path) => {
                let file = path.rsplit('/').next().unwrap_or(path);
                match file.rfind('.') {
                    Some(0) | None => None,
                    Some(idx) => Some(&file[idx + 1..]),
                }
            }
            Location::Builtin(_) => None,
        }
    }

    /// URL exposed to module bodies as `import.meta.url`
    pub fn url(&self) -> String {
        match self {
            Location::Path(path) => format!("file://{}", path),
            Location::Builtin(name) => name.to_string(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(PartialEq, Eq, Hash)]
struct KeyData {
    location: Location,
    attributes: Attributes,
    kind: ModuleKind,
}

/// Resolved identity of one module: location plus the attributes used to interpret it
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey(Arc<KeyData>);

impl CanonicalKey {
    /// Create a key. `kind` must be the classification derived from `location` and `attributes`.
    pub fn new(location: Location, attributes: Attributes, kind: ModuleKind) -> Self {
        Self(Arc::new(KeyData {
            location,
            attributes,
            kind,
        }))
    }

    pub fn location(&self) -> &Location {
        &self.0.location
    }

    pub fn attributes(&self) -> &Attributes {
        &self.0.attributes
    }

    pub fn kind(&self) -> ModuleKind {
        self.0.kind
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.location)?;
        if !self.0.attributes.is_empty() {
            write!(f, " with {}", self.0.attributes)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalKey({})", self)
    }
}

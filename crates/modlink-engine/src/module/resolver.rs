//! Specifier resolution
//!
//! Turns an import specifier, the referencing module and the import attributes
//! into a [`CanonicalKey`].
//!
//! # Resolution Order
//! 1. Relative (`./x`, `../x`) and absolute (`/x`) specifiers are joined with the
//!    referrer's directory, then tried in order: exact path, each configured extension,
//!    each index file.
//! 2. Bare specifiers go through the remapping table (exact keys, then the
//!    longest `/`-terminated prefix key).
//! 3. `scheme:name` specifiers name builtins directly.
//! 4. Anything else is tried in the default namespace (`process` -> `node:process`).

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::debug;

use super::key::{Attributes, CanonicalKey, Location, ModuleKind};
use super::source::ModuleSource;
use crate::config::LoaderConfig;
use crate::error::ResolutionError;

/// Resolver for import specifiers
#[derive(Debug, Clone)]
pub struct SpecifierResolver {
    extensions: Vec<String>,
    index_files: Vec<String>,
    default_namespace: Option<String>,
    supported_attributes: FxHashSet<String>,
    exact_remaps: FxHashMap<String, String>,
    /// Prefix remaps, longest prefix first
    prefix_remaps: Vec<(String, String)>,
    suffix_kinds: FxHashMap<String, ModuleKind>,
    builtins: FxHashSet<Arc<str>>,
    /// First classification seen for every location
    classified: FxHashMap<Location, ModuleKind>,
}

impl SpecifierResolver {
    /// Create a resolver from configuration
    pub fn new(config: &LoaderConfig) -> Self {
        let mut prefix_remaps: Vec<(String, String)> = config
            .imports
            .iter()
            .filter(|(from, _)| from.ends_with('/'))
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect();
        prefix_remaps.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            extensions: config.resolve.extensions.clone(),
            index_files: config.resolve.index_files.clone(),
            default_namespace: config
                .resolve
                .default_namespace
                .clone()
                .filter(|ns| !ns.is_empty()),
            supported_attributes: config.resolve.attributes.iter().cloned().collect(),
            exact_remaps: config
                .imports
                .iter()
                .map(|(from, to)| (from.clone(), to.clone()))
                .collect(),
            prefix_remaps,
            suffix_kinds: config
                .kinds
                .iter()
                .map(|(ext, ty)| (ext.clone(), ModuleKind::from_content_type(ty)))
                .collect(),
            builtins: FxHashSet::default(),
            classified: FxHashMap::default(),
        }
    }

    /// Make a builtin module name resolvable
    pub fn register_builtin(&mut self, name: &str) {
        self.builtins.insert(Arc::from(name));
    }

    /// Check whether a builtin name is registered
    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Resolve an import specifier to a canonical key
    ///
    /// # Arguments
    /// * `specifier` - The import specifier (e.g., "./utils.js", "process", "node:path")
    /// * `referrer` - The module containing the import; `None` for entry points
    /// * `attributes` - Import attributes declared at the import site
    /// * `source` - Used to check which candidate paths exist
    pub fn resolve(
        &mut self,
        specifier: &str,
        referrer: Option<&CanonicalKey>,
        attributes: &Attributes,
        source: &dyn ModuleSource,
    ) -> Result<CanonicalKey, ResolutionError> {
        if specifier.is_empty() {
            return Err(ResolutionError::InvalidSpecifier(specifier.to_string()));
        }
        if let Some((key, _)) = attributes
            .iter()
            .find(|(key, _)| !self.supported_attributes.contains(*key))
        {
            return Err(ResolutionError::UnsupportedAttribute {
                specifier: specifier.to_string(),
                key: key.to_string(),
            });
        }

        let location = self.locate(specifier, referrer, source)?;
        let kind = self.classify(&location, attributes);

        match self.classified.entry(location.clone()) {
            Entry::Occupied(entry) => {
                let existing = *entry.get();
                if existing.is_executable() != kind.is_executable() {
                    return Err(ResolutionError::AttributeConflict {
                        location: location.to_string(),
                        existing,
                        requested: kind,
                    });
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(kind);
            }
        }

        // A script asked for explicitly as a script is the same module as one asked for implicitly
        let attributes = if kind.is_executable() {
            attributes.without("type")
        } else {
            attributes.clone()
        };

        debug!(specifier, %location, %kind, "resolved specifier");
        Ok(CanonicalKey::new(location, attributes, kind))
    }

    /// Classification implied by attributes, else by the location's suffix
    pub fn classify(&self, location: &Location, attributes: &Attributes) -> ModuleKind {
        if let Some(content_type) = attributes.content_type() {
            return ModuleKind::from_content_type(content_type);
        }
        match location {
            Location::Builtin(_) => ModuleKind::Script,
            Location::Path(_) => location
                .extension()
                .and_then(|ext| self.suffix_kinds.get(ext))
                .copied()
                .unwrap_or(ModuleKind::Unknown),
        }
    }

    fn locate(
        &self,
        specifier: &str,
        referrer: Option<&CanonicalKey>,
        source: &dyn ModuleSource,
    ) -> Result<Location, ResolutionError> {
        if is_path_like(specifier) {
            let base = referrer.map(|key| key.location().directory()).unwrap_or("/");
            return self.first_existing(specifier, &join_path(base, specifier), source);
        }

        if let Some(target) = self.remap(specifier) {
            if is_path_like(&target) {
                return self.first_existing(specifier, &join_path("/", &target), source);
            }
            if self.builtins.contains(target.as_str()) {
                return Ok(Location::Builtin(Arc::from(target)));
            }
            return Err(ResolutionError::NotFound {
                specifier: specifier.to_string(),
                tried: vec![target],
            });
        }

        if self.builtins.contains(specifier) {
            return Ok(Location::Builtin(Arc::from(specifier)));
        }

        let mut tried = Vec::new();
        if let Some(namespace) = &self.default_namespace {
            if !specifier.contains(':') {
                let name = format!("{}:{}", namespace, specifier);
                if self.builtins.contains(name.as_str()) {
                    return Ok(Location::Builtin(Arc::from(name)));
                }
                tried.push(name);
            }
        }

        Err(ResolutionError::NotFound {
            specifier: specifier.to_string(),
            tried,
        })
    }

    fn remap(&self, specifier: &str) -> Option<String> {
        if let Some(target) = self.exact_remaps.get(specifier) {
            return Some(target.clone());
        }
        self.prefix_remaps.iter().find_map(|(prefix, target)| {
            specifier
                .strip_prefix(prefix.as_str())
                .map(|rest| format!("{}{}", target, rest))
        })
    }

    fn first_existing(
        &self,
        specifier: &str,
        path: &str,
        source: &dyn ModuleSource,
    ) -> Result<Location, ResolutionError> {
        let mut candidates = vec![path.to_string()];

        if Location::Path(Arc::from(path)).extension().is_none() {
            for ext in &self.extensions {
                candidates.push(format!("{}.{}", path, ext));
            }
        }
        for index in &self.index_files {
            candidates.push(format!("{}/{}", path.trim_end_matches('/'), index));
        }

        let mut tried = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if source.exists(&candidate) {
                return Ok(Location::Path(Arc::from(candidate)));
            }
            tried.push(candidate);
        }

        Err(ResolutionError::NotFound {
            specifier: specifier.to_string(),
            tried,
        })
    }
}

fn is_path_like(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier.starts_with('/')
        || specifier == "."
        || specifier == ".."
}

/// Join a specifier onto a directory and normalize `.` and `..` segments
pub(crate) fn join_path(base: &str, specifier: &str) -> String {
    if specifier.starts_with('/') {
        normalize_path(specifier)
    } else {
        normalize_path(&format!("{}/{}", base, specifier))
    }
}

/// Normalize a virtual path to `/a/b` form. `..` never climbs above the root.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            segment => parts.push(segment),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::source::MemorySource;

    fn create_test_project() -> (MemorySource, SpecifierResolver) {
        let source = MemorySource::new()
            .with_text("/src/main.js", "import { foo } from \"./utils\";")
            .with_text("/src/utils.js", "export function foo() {}")
            .with_text("/src/lib/index.js", "export const bar = 1;")
            .with_text("/src/nested/module.js", "import { x } from \"../shared.js\";")
            .with_text("/src/shared.js", "export const x = 42;")
            .with_text("/src/assets/config.json", "{}")
            .with_text("/vendor/lodash.js", "export default 1;");
        let config = LoaderConfig::default()
            .with_import("lodash", "./vendor/lodash.js")
            .with_import("@app/", "./src/")
            .with_import("proc", "node:process");
        let mut resolver = SpecifierResolver::new(&config);
        resolver.register_builtin("node:process");
        resolver.register_builtin("node:path");
        (source, resolver)
    }

    fn main_key(resolver: &mut SpecifierResolver, source: &MemorySource) -> CanonicalKey {
        resolver
            .resolve("/src/main.js", None, &Attributes::new(), source)
            .unwrap()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/./b/../c.js"), "/a/c.js");
        assert_eq!(normalize_path("/../../x.js"), "/x.js");
        assert_eq!(join_path("/src/nested", "../shared.js"), "/src/shared.js");
        assert_eq!(join_path("/src", "/abs.js"), "/abs.js");
    }

    #[test]
    fn test_resolve_local_with_extension_fallback() {
        let (source, mut resolver) = create_test_project();
        let main = main_key(&mut resolver, &source);

        let key = resolver
            .resolve("./utils", Some(&main), &Attributes::new(), &source)
            .unwrap();
        assert_eq!(key.location().as_str(), "/src/utils.js");
        assert_eq!(key.kind(), ModuleKind::Script);
    }

    #[test]
    fn test_resolve_local_index_file() {
        let (source, mut resolver) = create_test_project();
        let main = main_key(&mut resolver, &source);

        let key = resolver
            .resolve("./lib", Some(&main), &Attributes::new(), &source)
            .unwrap();
        assert_eq!(key.location().as_str(), "/src/lib/index.js");
    }

    #[test]
    fn test_resolve_parent_directory() {
        let (source, mut resolver) = create_test_project();
        let nested = resolver
            .resolve("/src/nested/module.js", None, &Attributes::new(), &source)
            .unwrap();

        let key = resolver
            .resolve("../shared.js", Some(&nested), &Attributes::new(), &source)
            .unwrap();
        assert_eq!(key.location().as_str(), "/src/shared.js");
    }

    #[test]
    fn test_resolve_module_not_found() {
        let (source, mut resolver) = create_test_project();
        let main = main_key(&mut resolver, &source);

        let result = resolver.resolve("./missing", Some(&main), &Attributes::new(), &source);
        match result {
            Err(ResolutionError::NotFound { specifier, tried }) => {
                assert_eq!(specifier, "./missing");
                assert_eq!(
                    tried,
                    vec![
                        "/src/missing",
                        "/src/missing.js",
                        "/src/missing.mjs",
                        "/src/missing/index.js"
                    ]
                );
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_remapping_table() {
        let (source, mut resolver) = create_test_project();
        let main = main_key(&mut resolver, &source);

        let exact = resolver
            .resolve("lodash", Some(&main), &Attributes::new(), &source)
            .unwrap();
        assert_eq!(exact.location().as_str(), "/vendor/lodash.js");

        let prefixed = resolver
            .resolve("@app/shared.js", Some(&main), &Attributes::new(), &source)
            .unwrap();
        assert_eq!(prefixed.location().as_str(), "/src/shared.js");

        let to_builtin = resolver
            .resolve("proc", Some(&main), &Attributes::new(), &source)
            .unwrap();
        assert_eq!(to_builtin.location(), &Location::Builtin(Arc::from("node:process")));
    }

    #[test]
    fn test_builtins_and_default_namespace() {
        let (source, mut resolver) = create_test_project();

        let explicit = resolver
            .resolve("node:path", None, &Attributes::new(), &source)
            .unwrap();
        assert!(explicit.location().is_builtin());

        let bare = resolver
            .resolve("process", None, &Attributes::new(), &source)
            .unwrap();
        assert_eq!(bare.location().as_str(), "node:process");

        let missing = resolver.resolve("left-pad", None, &Attributes::new(), &source);
        assert!(matches!(
            missing,
            Err(ResolutionError::NotFound { ref tried, .. }) if tried == &vec!["node:left-pad".to_string()]
        ));
    }

    #[test]
    fn test_attributes_select_kind() {
        let (source, mut resolver) = create_test_project();

        let inferred = resolver
            .resolve("/src/assets/config.json", None, &Attributes::new(), &source)
            .unwrap();
        assert_eq!(inferred.kind(), ModuleKind::StructuredData);

        let declared = resolver
            .resolve("/src/assets/config.json", None, &Attributes::of_type("json"), &source)
            .unwrap();
        assert_eq!(declared.kind(), ModuleKind::StructuredData);
        assert_ne!(inferred, declared);
    }

    #[test]
    fn test_explicit_script_type_shares_key() {
        let (source, mut resolver) = create_test_project();

        let implicit = main_key(&mut resolver, &source);
        let explicit = resolver
            .resolve("/src/main.js", None, &Attributes::of_type("javascript"), &source)
            .unwrap();
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn test_attribute_conflict_script_vs_data() {
        let (source, mut resolver) = create_test_project();
        main_key(&mut resolver, &source);

        let result = resolver.resolve("/src/main.js", None, &Attributes::of_type("json"), &source);
        assert!(matches!(
            result,
            Err(ResolutionError::AttributeConflict {
                existing: ModuleKind::Script,
                requested: ModuleKind::StructuredData,
                ..
            })
        ));
    }

    #[test]
    fn test_inert_kinds_may_share_location() {
        let (source, mut resolver) = create_test_project();

        let data = resolver
            .resolve("/src/assets/config.json", None, &Attributes::of_type("data"), &source)
            .unwrap();
        let style = resolver
            .resolve("/src/assets/config.json", None, &Attributes::of_type("style"), &source)
            .unwrap();
        assert_ne!(data, style);
        assert_eq!(style.kind(), ModuleKind::StyleResource);
    }

    #[test]
    fn test_unsupported_attribute_key() {
        let (source, mut resolver) = create_test_project();

        let attributes = Attributes::new().with("integrity", "sha384-abc");
        let result = resolver.resolve("/src/main.js", None, &attributes, &source);
        assert!(matches!(
            result,
            Err(ResolutionError::UnsupportedAttribute { ref key, .. }) if key == "integrity"
        ));
    }

    #[test]
    fn test_empty_specifier() {
        let (source, mut resolver) = create_test_project();
        let result = resolver.resolve("", None, &Attributes::new(), &source);
        assert!(matches!(result, Err(ResolutionError::InvalidSpecifier(_))));
    }
}

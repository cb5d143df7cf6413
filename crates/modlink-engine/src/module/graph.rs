//! Dependency graph building
//!
//! Linking walks a script's import declarations in source order. Each
//! dependency is resolved, instantiated in the cache and linked *before* the
//! next declaration is looked at, so dependency order equals declaration
//! order. A dependency that is already Linking is a back-edge in a cycle: the
//! edge is recorded and its bindings are wired to cells that stay empty until
//! that module evaluates.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::ModuleId;
use super::key::CanonicalKey;
use super::loader::RawModule;
use super::record::{ImportScope, ImportedBinding, ModuleState};
use crate::engine::Engine;
use crate::error::{EvalError, LinkError, ModuleError};
use crate::script::ImportEntry;

impl Engine {
    /// Cache lookup, loading the content when the record is new
    ///
    /// A load failure leaves the new record Errored; it is reported when the
    /// record is linked.
    pub(crate) fn instantiate(&mut self, key: &CanonicalKey) -> ModuleId {
        let (id, created) = self.cache.get_or_create(key);
        if !created {
            return id;
        }

        debug!(module = %key, %id, "instantiated module record");
        match self.loader.load(key) {
            Ok(content) => self.cache.at_mut(id).set_content(content),
            Err(error) => {
                warn!(module = %key, %error, "failed to load module");
                self.cache.at_mut(id).set_errored(error.into());
            }
        }
        id
    }

    /// Link a record and, depth first, everything it imports
    #[tracing::instrument(level = "debug", skip_all, fields(module = %id))]
    pub(crate) fn link_recursive(&mut self, id: ModuleId) -> Result<(), ModuleError> {
        let record = self.cache.at(id);
        if let Some(error) = record.error() {
            return Err(error.clone());
        }
        if record.state() != ModuleState::Unlinked {
            return Ok(());
        }

        let key = record.key().clone();
        let imports: Vec<ImportEntry> = match record.content() {
            Some(RawModule::Script(script)) => script.imports.clone(),
            _ => Vec::new(),
        };

        self.cache.at_mut(id).set_linking();
        debug!(module = %key, imports = imports.len(), "linking");

        let mut scope = FxHashMap::default();
        for entry in imports.iter().filter(|entry| !entry.type_only) {
            if let Err(error) = self.link_import(id, &key, entry, &mut scope) {
                warn!(module = %key, %error, "linking failed");
                self.cache.at_mut(id).set_errored(error.clone());
                return Err(error);
            }
        }

        let record = self.cache.at_mut(id);
        record.set_imports(ImportScope::new(scope));
        record.set_linked();
        debug!(module = %key, "linked");
        Ok(())
    }

    /// Resolve, instantiate and link one import declaration, then bind its names
    fn link_import(
        &mut self,
        id: ModuleId,
        key: &CanonicalKey,
        entry: &ImportEntry,
        scope: &mut FxHashMap<Arc<str>, ImportedBinding>,
    ) -> Result<(), ModuleError> {
        let dependency_failed = |cause: ModuleError| -> ModuleError {
            LinkError::DependencyFailed {
                importer: key.clone(),
                specifier: entry.specifier.clone(),
                cause: Box::new(cause),
            }
            .into()
        };

        let target_key = self
            .resolver
            .resolve(
                &entry.specifier,
                Some(key),
                &entry.attributes,
                self.loader.source(),
            )
            .map_err(|error| dependency_failed(error.into()))?;

        let dependency = self.instantiate(&target_key);
        self.cache.at_mut(id).add_dependency(dependency);

        if let Err(error) = self.link_recursive(dependency) {
            return Err(match error {
                ModuleError::Link(_) => error,
                other => dependency_failed(other),
            });
        }

        if entry.is_side_effect_only() {
            return Ok(());
        }

        let target = self.cache.at(dependency);
        let namespace = target.namespace().cloned().ok_or_else(|| {
            dependency_failed(
                EvalError::NotLinked {
                    module: target_key.clone(),
                }
                .into(),
            )
        })?;

        for binding in &entry.bindings {
            let local: Arc<str> = Arc::from(binding.local());
            let imported = match binding.imported() {
                None => {
                    scope.insert(local, ImportedBinding::Namespace(namespace.clone()));
                    continue;
                }
                Some(name) => name,
            };
            let cell = target.bindings().cell(imported).cloned().ok_or_else(|| {
                LinkError::MissingExport {
                    importer: key.clone(),
                    module: target_key.clone(),
                    name: imported.to_string(),
                }
            })?;
            scope.insert(
                local,
                ImportedBinding::Cell {
                    module: target_key.clone(),
                    name: Arc::from(imported),
                    cell,
                },
            );
        }

        Ok(())
    }
}

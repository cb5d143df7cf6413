//! Module records
//!
//! One record per canonical key. The state only moves forward:
//!
//! ```text
//! Unlinked -> Linking -> Linked -> Evaluating -> Evaluated
//!                 \                     \
//!                  +---------------------+----> Errored
//! ```

use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::Arc;

use super::binding::{BindingCell, BindingTable, Namespace};
use super::cache::ModuleId;
use super::key::CanonicalKey;
use super::loader::RawModule;
use crate::error::{EvalError, ModuleError};
use crate::value::Value;

/// Lifecycle state of a module record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Unlinked,
    Linking,
    Linked,
    Evaluating,
    Evaluated,
    Errored,
}

/// A name bound in an importing module
#[derive(Debug, Clone)]
pub enum ImportedBinding {
    /// Shared cell of one export of the target
    Cell {
        module: CanonicalKey,
        name: Arc<str>,
        cell: Arc<BindingCell>,
    },
    /// The target's whole namespace
    Namespace(Namespace),
}

impl ImportedBinding {
    /// Current value, read through to the owning module
    pub fn read(&self) -> Result<Value, EvalError> {
        match self {
            ImportedBinding::Cell { module, name, cell } => {
                cell.get().ok_or_else(|| EvalError::UninitializedBinding {
                    module: module.clone(),
                    name: name.to_string(),
                })
            }
            ImportedBinding::Namespace(ns) => Ok(Value::Namespace(ns.clone())),
        }
    }
}

/// Local names a script imports, resolved against its dependencies
#[derive(Debug, Clone, Default)]
pub struct ImportScope(Arc<FxHashMap<Arc<str>, ImportedBinding>>);

impl ImportScope {
    pub(crate) fn new(bindings: FxHashMap<Arc<str>, ImportedBinding>) -> Self {
        Self(Arc::new(bindings))
    }

    pub fn get(&self, local: &str) -> Option<&ImportedBinding> {
        self.0.get(local)
    }

    pub fn contains(&self, local: &str) -> bool {
        self.0.contains_key(local)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-module state owned by the cache
#[derive(Debug)]
pub struct ModuleRecord {
    key: CanonicalKey,
    state: ModuleState,
    content: Option<RawModule>,
    dependencies: Vec<ModuleId>,
    bindings: Arc<BindingTable>,
    namespace: Option<Namespace>,
    imports: ImportScope,
    error: Option<ModuleError>,
    /// Body state that closures handed out by the body still refer to
    #[allow(dead_code)]
    retained: Option<Arc<dyn Any + Send + Sync>>,
}

impl ModuleRecord {
    pub(crate) fn new(key: CanonicalKey) -> Self {
        Self {
            key,
            state: ModuleState::Unlinked,
            content: None,
            dependencies: Vec::new(),
            bindings: Arc::new(BindingTable::new()),
            namespace: None,
            imports: ImportScope::default(),
            error: None,
            retained: None,
        }
    }

    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn content(&self) -> Option<&RawModule> {
        self.content.as_ref()
    }

    /// Dependencies in first-declaration order
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.dependencies
    }

    pub fn bindings(&self) -> &Arc<BindingTable> {
        &self.bindings
    }

    /// Namespace, present once linking has started
    pub fn namespace(&self) -> Option<&Namespace> {
        self.namespace.as_ref()
    }

    pub fn imports(&self) -> &ImportScope {
        &self.imports
    }

    /// Stored failure, present only when Errored
    pub fn error(&self) -> Option<&ModuleError> {
        self.error.as_ref()
    }

    /// Attach loaded content and build the binding table it implies
    pub(crate) fn set_content(&mut self, content: RawModule) {
        debug_assert_eq!(self.state, ModuleState::Unlinked);
        self.bindings = Arc::new(match &content {
            RawModule::Script(script) => BindingTable::declare(script.exports.iter()),
            RawModule::StructuredData(data) => BindingTable::default_only(Value::from_json(data)),
            RawModule::StyleResource(sheet) => {
                BindingTable::default_only(Value::Style(sheet.clone()))
            }
        });
        self.content = Some(content);
    }

    pub(crate) fn add_dependency(&mut self, id: ModuleId) {
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
    }

    pub(crate) fn retain(&mut self, state: Option<Arc<dyn Any + Send + Sync>>) {
        if state.is_some() {
            self.retained = state;
        }
    }

    pub(crate) fn set_imports(&mut self, imports: ImportScope) {
        self.imports = imports;
    }

    /// Enter Linking and create the namespace
    pub(crate) fn set_linking(&mut self) {
        debug_assert_eq!(self.state, ModuleState::Unlinked);
        self.state = ModuleState::Linking;
        self.namespace = Some(Namespace::new(self.key.clone(), self.bindings.clone()));
    }

    pub(crate) fn set_linked(&mut self) {
        debug_assert_eq!(self.state, ModuleState::Linking);
        self.state = ModuleState::Linked;
    }

    pub(crate) fn set_evaluating(&mut self) {
        debug_assert_eq!(self.state, ModuleState::Linked);
        self.state = ModuleState::Evaluating;
    }

    pub(crate) fn set_evaluated(&mut self) {
        debug_assert!(matches!(
            self.state,
            ModuleState::Linked | ModuleState::Evaluating
        ));
        self.state = ModuleState::Evaluated;
    }

    /// Fail the record permanently. The first error wins.
    pub(crate) fn set_errored(&mut self, error: ModuleError) {
        debug_assert_ne!(self.state, ModuleState::Evaluated);
        if self.state == ModuleState::Errored {
            return;
        }
        self.state = ModuleState::Errored;
        self.error = Some(error);
    }
}

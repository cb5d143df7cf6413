//! Live bindings and namespace objects
//!
//! Every exported name owns one [`BindingCell`]. Importers never copy values;
//! they hold the cell (or the whole [`Namespace`]) and read it on demand, which
//! is what lets two modules in a cycle see each other's exports once they are
//! filled.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

use super::key::CanonicalKey;
use crate::error::{EvalError, ImmutabilityError};
use crate::value::Value;

/// Single-fill storage slot backing one export name
#[derive(Debug, Default)]
pub struct BindingCell {
    slot: RwLock<Option<Value>>,
}

impl BindingCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cell that is filled from the start (structured data, builtins)
    pub fn filled(value: Value) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }

    /// Current value, `None` while uninitialized
    pub fn get(&self) -> Option<Value> {
        self.slot.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.read().is_some()
    }

    /// Fill the cell. Returns false if it was already filled.
    pub(crate) fn initialize(&self, value: Value) -> bool {
        let mut slot = self.slot.write();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }
}

/// Export name to cell mapping, in declaration order
#[derive(Debug, Default)]
pub struct BindingTable {
    names: Vec<Arc<str>>,
    cells: FxHashMap<Arc<str>, Arc<BindingCell>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with one empty cell per name. Duplicate names collapse.
    pub fn declare<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for name in names {
            table.insert(name.as_ref(), Arc::new(BindingCell::new()));
        }
        table
    }

    /// Table whose only export is a filled `default`
    pub fn default_only(value: Value) -> Self {
        let mut table = Self::new();
        table.insert("default", Arc::new(BindingCell::filled(value)));
        table
    }

    fn insert(&mut self, name: &str, cell: Arc<BindingCell>) {
        if self.cells.contains_key(name) {
            return;
        }
        let name: Arc<str> = Arc::from(name);
        self.names.push(name.clone());
        self.cells.insert(name, cell);
    }

    pub fn cell(&self, name: &str) -> Option<&Arc<BindingCell>> {
        self.cells.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cells.contains_key(name)
    }

    /// Names in declaration order
    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

struct NamespaceInner {
    module: CanonicalKey,
    table: Arc<BindingTable>,
}

/// Read-only view over a module's binding table
///
/// Created once per module record; clones share identity.
#[derive(Clone)]
pub struct Namespace(Arc<NamespaceInner>);

impl Namespace {
    pub fn new(module: CanonicalKey, table: Arc<BindingTable>) -> Self {
        Self(Arc::new(NamespaceInner { module, table }))
    }

    /// Module this namespace belongs to
    pub fn module(&self) -> &CanonicalKey {
        &self.0.module
    }

    /// Current value of an export
    ///
    /// Names the module does not export read as `undefined`; exports whose
    /// cell has not been filled yet fail with `UninitializedBinding`.
    pub fn get(&self, name: &str) -> Result<Value, EvalError> {
        match self.0.table.cell(name) {
            None => Ok(Value::Undefined),
            Some(cell) => cell.get().ok_or_else(|| EvalError::UninitializedBinding {
                module: self.0.module.clone(),
                name: name.to_string(),
            }),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.table.contains(name)
    }

    /// Export names, sorted
    pub fn names(&self) -> Vec<Arc<str>> {
        let mut names = self.0.table.names().to_vec();
        names.sort();
        names
    }

    /// Namespaces cannot be written to
    pub fn set(&self, name: &str, _value: Value) -> Result<(), ImmutabilityError> {
        Err(ImmutabilityError::Namespace {
            module: self.0.module.clone(),
            name: name.to_string(),
        })
    }

    /// Whether two handles are the same namespace object
    pub fn ptr_eq(&self, other: &Namespace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn table(&self) -> &Arc<BindingTable> {
        &self.0.table
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("module", &self.0.module)
            .field("names", &self.0.table.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::key::{Attributes, Location, ModuleKind};

    fn key(path: &str) -> CanonicalKey {
        CanonicalKey::new(
            Location::Path(Arc::from(path)),
            Attributes::new(),
            ModuleKind::Script,
        )
    }

    #[test]
    fn test_cell_fills_once() {
        let cell = BindingCell::new();
        assert!(!cell.is_initialized());
        assert!(cell.initialize(Value::from(1)));
        assert!(!cell.initialize(Value::from(2)));
        assert_eq!(cell.get(), Some(Value::from(1)));
    }

    #[test]
    fn test_namespace_is_live_view() {
        let table = Arc::new(BindingTable::declare(["value", "default"]));
        let ns = Namespace::new(key("/a.js"), table.clone());

        assert!(matches!(
            ns.get("value"),
            Err(EvalError::UninitializedBinding { ref name, .. }) if name == "value"
        ));

        table.cell("value").unwrap().initialize(Value::from(42));
        assert_eq!(ns.get("value").unwrap(), Value::from(42));
        assert_eq!(ns.get("missing").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_namespace_is_read_only() {
        let ns = Namespace::new(key("/a.js"), Arc::new(BindingTable::declare(["x"])));
        assert!(matches!(
            ns.set("x", Value::from(1)),
            Err(ImmutabilityError::Namespace { .. })
        ));
    }

    #[test]
    fn test_namespace_identity_and_names() {
        let ns = Namespace::new(key("/a.js"), Arc::new(BindingTable::declare(["b", "a", "b"])));
        let same = ns.clone();
        let other = Namespace::new(key("/a.js"), ns.table().clone());

        assert!(ns.ptr_eq(&same));
        assert!(!ns.ptr_eq(&other));
        let all_names = ns.names();
        let names: Vec<&str> = all_names.iter().map(|n| &**n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

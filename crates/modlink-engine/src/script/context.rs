//! What a module body can see while it runs

use rustc_hash::FxHashMap;
use std::any::Any;
use std::sync::Arc;

use crate::console::Console;
use crate::error::EvalError;
use crate::module::{
    Attributes, BindingTable, CanonicalKey, ImportPromise, ImportScope, ImportedBinding, Importer,
};
use crate::value::Value;

/// Execution context handed to a [`ModuleBody`](super::ModuleBody)
pub struct ExecutionContext {
    module: CanonicalKey,
    exports: Arc<BindingTable>,
    imports: ImportScope,
    importer: Importer,
    console: Arc<dyn Console>,
    globals: Arc<FxHashMap<Arc<str>, Value>>,
    retained: Option<Arc<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    pub(crate) fn new(
        module: CanonicalKey,
        exports: Arc<BindingTable>,
        imports: ImportScope,
        importer: Importer,
        console: Arc<dyn Console>,
        globals: Arc<FxHashMap<Arc<str>, Value>>,
    ) -> Self {
        Self {
            module,
            exports,
            imports,
            importer,
            console,
            globals,
            retained: None,
        }
    }

    /// Key of the running module
    pub fn module(&self) -> &CanonicalKey {
        &self.module
    }

    /// `import.meta.url`
    pub fn url(&self) -> String {
        self.module.location().url()
    }

    /// `import.meta` as an object
    pub fn meta(&self) -> Value {
        Value::record([("url", Value::from(self.url()))])
    }

    /// Fill an exported binding
    ///
    /// Every declared export is filled at most once; exporting a name the
    /// module never declared is an error.
    pub fn export(&mut self, name: &str, value: impl Into<Value>) -> Result<(), EvalError> {
        let cell = self
            .exports
            .cell(name)
            .ok_or_else(|| EvalError::UndeclaredExport {
                module: self.module.clone(),
                name: name.to_string(),
            })?;
        if cell.initialize(value.into()) {
            Ok(())
        } else {
            Err(EvalError::AlreadyInitialized {
                module: self.module.clone(),
                name: name.to_string(),
            })
        }
    }

    /// Fill the `default` export
    pub fn export_default(&mut self, value: impl Into<Value>) -> Result<(), EvalError> {
        self.export("default", value)
    }

    /// Current value of an imported local name
    pub fn import(&self, local: &str) -> Result<Value, EvalError> {
        self.binding(local)?.read()
    }

    /// Live handle to an imported local name, for reading later
    pub fn binding(&self, local: &str) -> Result<ImportedBinding, EvalError> {
        self.imports
            .get(local)
            .cloned()
            .ok_or_else(|| EvalError::UnknownBinding {
                module: self.module.clone(),
                name: local.to_string(),
            })
    }

    pub fn imports(&self) -> &ImportScope {
        &self.imports
    }

    /// Handle that can issue dynamic imports after the body returns
    pub fn importer(&self) -> Importer {
        self.importer.clone()
    }

    /// `import(specifier, { with: attributes })`
    pub fn dynamic_import(&self, specifier: &str, attributes: Attributes) -> ImportPromise {
        self.importer.import(specifier, attributes)
    }

    /// Write a line to the console
    pub fn log(&self, text: &str) {
        self.console.log(&self.module, text);
    }

    pub fn console(&self) -> Arc<dyn Console> {
        self.console.clone()
    }

    /// Host-provided global names (`process`)
    pub fn globals(&self) -> &FxHashMap<Arc<str>, Value> {
        &self.globals
    }

    /// Keep `state` alive for as long as the module record lives
    pub fn retain(&mut self, state: Arc<dyn Any + Send + Sync>) {
        self.retained = Some(state);
    }

    pub(crate) fn take_retained(&mut self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.retained.take()
    }

    /// Error for an exception thrown by the body
    pub fn throw(&self, message: impl Into<String>) -> EvalError {
        EvalError::Thrown {
            module: self.module.clone(),
            message: message.into(),
        }
    }
}

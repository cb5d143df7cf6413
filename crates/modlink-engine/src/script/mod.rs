//! Script modules
//!
//! A [`ScriptModule`] is what the engine needs from a parsed script: its
//! import declarations in source order, the names it exports, and a body to
//! run once. Hosts can build one directly with [`ScriptModule::builder`] or
//! let a [`ScriptParser`] produce it from source text.

mod context;
mod interp;
mod lexer;
mod scanner;

pub use context::ExecutionContext;
pub use lexer::Token;
pub use scanner::DeclarationScanner;

use std::fmt;
use std::sync::Arc;

use crate::error::{EvalError, ParseError};
use crate::module::{Attributes, CanonicalKey};

/// How an import declaration binds names in the importing module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    /// `import x from "m"`
    Default { local: Arc<str> },
    /// `import { a as b } from "m"`
    Named { imported: Arc<str>, local: Arc<str> },
    /// `import * as ns from "m"`
    Namespace { local: Arc<str> },
}

impl ImportBinding {
    /// Name introduced into the importing module
    pub fn local(&self) -> &str {
        match self {
            ImportBinding::Default { local }
            | ImportBinding::Named { local, .. }
            | ImportBinding::Namespace { local } => local,
        }
    }

    /// Export name read from the target, `None` for namespace imports
    pub fn imported(&self) -> Option<&str> {
        match self {
            ImportBinding::Default { .. } => Some("default"),
            ImportBinding::Named { imported, .. } => Some(imported),
            ImportBinding::Namespace { .. } => None,
        }
    }
}

/// One static import declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    pub specifier: String,
    pub attributes: Attributes,
    pub bindings: Vec<ImportBinding>,
    /// Erased before linking (`import type ...`)
    pub type_only: bool,
}

impl ImportEntry {
    /// Side-effect-only import (`import "m"`)
    pub fn new(specifier: &str) -> Self {
        Self {
            specifier: specifier.to_string(),
            attributes: Attributes::new(),
            bindings: Vec::new(),
            type_only: false,
        }
    }

    pub fn with_default(mut self, local: &str) -> Self {
        self.bindings.push(ImportBinding::Default {
            local: Arc::from(local),
        });
        self
    }

    pub fn with_named(mut self, imported: &str, local: &str) -> Self {
        self.bindings.push(ImportBinding::Named {
            imported: Arc::from(imported),
            local: Arc::from(local),
        });
        self
    }

    pub fn with_namespace(mut self, local: &str) -> Self {
        self.bindings.push(ImportBinding::Namespace {
            local: Arc::from(local),
        });
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn type_only(mut self) -> Self {
        self.type_only = true;
        self
    }

    /// Whether the import consumes no bindings
    pub fn is_side_effect_only(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Code run once when a script module evaluates
pub trait ModuleBody: Send + Sync {
    fn run(&self, cx: &mut ExecutionContext) -> Result<(), EvalError>;
}

impl<F> ModuleBody for F
where
    F: Fn(&mut ExecutionContext) -> Result<(), EvalError> + Send + Sync,
{
    fn run(&self, cx: &mut ExecutionContext) -> Result<(), EvalError> {
        self(cx)
    }
}

/// Declarations and body of a script
#[derive(Clone)]
pub struct ScriptModule {
    pub imports: Vec<ImportEntry>,
    pub exports: Vec<Arc<str>>,
    pub body: Option<Arc<dyn ModuleBody>>,
}

impl ScriptModule {
    pub fn builder() -> ScriptBuilder {
        ScriptBuilder::default()
    }
}

impl fmt::Debug for ScriptModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptModule")
            .field("imports", &self.imports)
            .field("exports", &self.exports)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Builder for host-defined scripts
#[derive(Default)]
pub struct ScriptBuilder {
    imports: Vec<ImportEntry>,
    exports: Vec<Arc<str>>,
    body: Option<Arc<dyn ModuleBody>>,
}

impl ScriptBuilder {
    pub fn import(mut self, entry: ImportEntry) -> Self {
        self.imports.push(entry);
        self
    }

    pub fn export(mut self, name: &str) -> Self {
        self.exports.push(Arc::from(name));
        self
    }

    pub fn exports<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exports
            .extend(names.into_iter().map(|n| Arc::from(n.as_ref())));
        self
    }

    /// Body from a closure
    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut ExecutionContext) -> Result<(), EvalError> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Body from any [`ModuleBody`] implementation
    pub fn module_body(mut self, body: Arc<dyn ModuleBody>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> ScriptModule {
        ScriptModule {
            imports: self.imports,
            exports: self.exports,
            body: self.body,
        }
    }
}

/// Extracts declarations (and a runnable body) from script source text
pub trait ScriptParser: Send + Sync {
    fn parse(&self, module: &CanonicalKey, text: &str) -> Result<ScriptModule, ParseError>;
}

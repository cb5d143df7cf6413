//! Error taxonomy
//!
//! Every stage of the pipeline has its own error family. `ModuleError` is the
//! umbrella stored on an Errored module record; it is `Clone` so the exact same
//! failure can be handed to every importer of that record.

use thiserror::Error;

use crate::module::{CanonicalKey, ModuleKind};

/// Errors that can occur while resolving an import specifier
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    /// No resource matches the specifier
    #[error("Module not found: {specifier} (tried: {tried:?})")]
    NotFound { specifier: String, tried: Vec<String> },

    /// The resource was already classified with an incompatible kind
    #[error("Conflicting import attributes for {location}: loaded as {existing}, requested as {requested}")]
    AttributeConflict {
        location: String,
        existing: ModuleKind,
        requested: ModuleKind,
    },

    /// Import attribute key the host does not understand
    #[error("Unsupported import attribute '{key}' on '{specifier}'")]
    UnsupportedAttribute { specifier: String, key: String },

    /// Empty or otherwise unusable specifier
    #[error("Invalid import specifier: {0:?}")]
    InvalidSpecifier(String),
}

/// Errors that can occur while fetching and classifying module content
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LoadError {
    /// The source could not be read
    #[error("Failed to read {module}: {message}")]
    IoFailure { module: CanonicalKey, message: String },

    /// The bytes could not be decoded or the content is malformed
    #[error("Failed to decode {module}: {message}")]
    DecodeFailure { module: CanonicalKey, message: String },

    /// No loading strategy exists for the module's kind
    #[error("Unsupported module kind for {module}")]
    UnsupportedKind { module: CanonicalKey },

    /// The script parser rejected the source text
    #[error("Syntax error in {module}: {error}")]
    Syntax { module: CanonicalKey, error: ParseError },
}

/// Errors that can occur while linking a module graph
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LinkError {
    /// A dependency could not be resolved, loaded, linked or evaluated
    #[error("Cannot link {importer}: dependency '{specifier}' failed: {cause}")]
    DependencyFailed {
        importer: CanonicalKey,
        specifier: String,
        #[source]
        cause: Box<ModuleError>,
    },

    /// An import names an export the target does not declare
    #[error("Module {module} does not provide an export named '{name}' (imported by {importer})")]
    MissingExport {
        importer: CanonicalKey,
        module: CanonicalKey,
        name: String,
    },
}

/// Errors that can occur while evaluating module bodies
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    /// The module body threw
    #[error("Uncaught exception in {module}: {message}")]
    Thrown { module: CanonicalKey, message: String },

    /// A binding was read before its owning module assigned it
    #[error("Cannot access '{name}' of {module} before initialization")]
    UninitializedBinding { module: CanonicalKey, name: String },

    /// Evaluation was requested for a record that never finished linking
    #[error("Module {module} is not linked")]
    NotLinked { module: CanonicalKey },

    /// The body exported a name its declarations never listed
    #[error("Module {module} does not declare an export named '{name}'")]
    UndeclaredExport { module: CanonicalKey, name: String },

    /// The body filled the same export twice
    #[error("Export '{name}' of {module} is already initialized")]
    AlreadyInitialized { module: CanonicalKey, name: String },

    /// A name that is neither local, imported nor global
    #[error("'{name}' is not defined in {module}")]
    UnknownBinding { module: CanonicalKey, name: String },

    /// Call of a non-function value
    #[error("{value} is not a function")]
    NotCallable { value: String },

    /// A host-provided function failed
    #[error("{function}: {message}")]
    Native { function: String, message: String },
}

/// Writes to read-only module surfaces
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImmutabilityError {
    /// Namespace objects are read-only views
    #[error("Cannot assign to read-only export '{name}' of {module}")]
    Namespace { module: CanonicalKey, name: String },

    /// Structured data and other frozen values
    #[error("Cannot assign to '{name}' of frozen {kind} value")]
    Frozen { kind: &'static str, name: String },
}

/// Any failure recorded on a module record
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModuleError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl ModuleError {
    /// Short name of the error family
    pub fn family(&self) -> &'static str {
        match self {
            ModuleError::Resolution(_) => "ResolutionError",
            ModuleError::Load(_) => "LoadError",
            ModuleError::Link(_) => "LinkError",
            ModuleError::Eval(_) => "EvalError",
        }
    }
}

/// Error reported by a script parser
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (line {line})")]
pub struct ParseError {
    /// Human-readable description
    pub message: String,
    /// 1-based line of the offending token
    pub line: usize,
}

impl ParseError {
    /// Create a parse error at the given line
    pub fn new(message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

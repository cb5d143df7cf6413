//! modlink engine
//!
//! Resolves, links and evaluates graphs of modules connected by import
//! declarations:
//!
//! - **Resolution**: specifiers plus import attributes become canonical keys
//! - **Caching**: one module record per key, for the life of the engine
//! - **Loading**: scripts, structured data and stylesheets
//! - **Linking**: depth-first, in declaration order, tolerating cycles
//! - **Evaluation**: every body runs exactly once, dependencies first
//! - **Dynamic import**: queued, never inline, settled through promises

pub mod config;
pub mod console;
pub mod engine;
pub mod error;
pub mod module;
pub mod script;
pub mod value;

pub use config::{ConfigError, LoaderConfig, ResolveConfig};
pub use console::{BufferConsole, Console, StdoutConsole};
pub use engine::{Engine, EngineBuilder};
pub use error::{
    EvalError, ImmutabilityError, LinkError, LoadError, ModuleError, ParseError, ResolutionError,
};
pub use module::{
    Attributes, CanonicalKey, ImportPromise, MemorySource, ModuleKind, ModuleState, Namespace,
};
pub use script::{
    DeclarationScanner, ExecutionContext, ImportBinding, ImportEntry, ModuleBody, ScriptModule,
    ScriptParser,
};
pub use value::{NativeFunction, ObjectRef, Value};

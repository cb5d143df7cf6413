//! Module system
//!
//! Handles specifier resolution, the module cache, content loading, graph
//! linking, evaluation and dynamic imports.

mod binding;
mod cache;
mod dynamic;
mod evaluate;
mod graph;
mod key;
mod loader;
mod record;
mod resolver;
mod source;
mod style;

pub use binding::{BindingCell, BindingTable, Namespace};
pub use cache::{CacheStats, ModuleCache, ModuleId};
pub use dynamic::{ImportId, ImportPromise, ImportResult, Importer, JobQueue};
pub use key::{Attributes, CanonicalKey, Location, ModuleKind};
pub use loader::{ContentLoader, RawModule};
pub use record::{ImportScope, ImportedBinding, ModuleRecord, ModuleState};
pub use resolver::SpecifierResolver;
pub use source::{Content, FsSource, MemorySource, ModuleSource};
pub use style::{StyleError, StyleRule, StyleSheet};

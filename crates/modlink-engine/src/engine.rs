//! Engine façade
//!
//! Owns the resolver, loader, cache and job queue, and exposes the static
//! pipeline (`resolve` -> `link` -> `evaluate`) plus dynamic imports.

use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::console::{Console, StdoutConsole};
use crate::error::{EvalError, ModuleError, ResolutionError};
use crate::module::{
    Attributes, CanonicalKey, ContentLoader, FsSource, ImportPromise, JobQueue, ModuleCache,
    ModuleId, ModuleRecord, ModuleSource, Namespace, SpecifierResolver,
};
use crate::script::{DeclarationScanner, ScriptModule, ScriptParser};
use crate::value::Value;

/// Module resolution, linking and evaluation engine
///
/// All module state lives here and is driven from one thread; dynamic imports
/// make progress only inside [`Engine::run_jobs`].
pub struct Engine {
    pub(crate) config: LoaderConfig,
    pub(crate) resolver: SpecifierResolver,
    pub(crate) loader: ContentLoader,
    pub(crate) cache: ModuleCache,
    pub(crate) console: Arc<dyn Console>,
    /// Names every script body sees besides its own and its imports
    pub(crate) globals: Arc<FxHashMap<Arc<str>, Value>>,
    pub(crate) jobs: JobQueue,
    /// Dynamic imports waiting on a pipeline another request started
    pub(crate) in_flight: FxHashMap<ModuleId, Vec<ImportPromise>>,
}

impl Engine {
    /// Engine serving files under `config.root`, parsing scripts with the
    /// declaration scanner and printing to stdout
    pub fn new(config: LoaderConfig) -> Self {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: LoaderConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Resolve a specifier to a canonical key
    pub fn resolve(
        &mut self,
        specifier: &str,
        referrer: Option<&CanonicalKey>,
        attributes: &Attributes,
    ) -> Result<CanonicalKey, ResolutionError> {
        self.resolver
            .resolve(specifier, referrer, attributes, self.loader.source())
    }

    /// Instantiate and link `key` and its whole static graph
    pub fn link(&mut self, key: &CanonicalKey) -> Result<ModuleId, ModuleError> {
        let id = self.instantiate(key);
        self.link_recursive(id)?;
        Ok(id)
    }

    /// Link and evaluate `key`, returning its namespace
    pub fn evaluate(&mut self, key: &CanonicalKey) -> Result<Namespace, ModuleError> {
        let id = self.link(key)?;
        self.evaluate_recursive(id)?;
        let record = self.cache.at(id);
        match record.namespace() {
            Some(namespace) => Ok(namespace.clone()),
            None => Err(EvalError::NotLinked {
                module: record.key().clone(),
            }
            .into()),
        }
    }

    /// Run an entry module synchronously
    ///
    /// Dynamic imports it issues stay queued until [`Engine::run_jobs`].
    pub fn run_module(&mut self, specifier: &str) -> Result<Namespace, ModuleError> {
        let key = self.resolve(specifier, None, &Attributes::new())?;
        debug!(entry = %key, "running entry module");
        self.evaluate(&key)
    }

    /// Record for `key`, if it was ever requested
    pub fn record(&self, key: &CanonicalKey) -> Option<&ModuleRecord> {
        self.cache.record(key)
    }

    /// Namespace of `key`, once linking has started
    pub fn namespace(&self, key: &CanonicalKey) -> Option<Namespace> {
        self.record(key).and_then(|record| record.namespace().cloned())
    }
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    config: LoaderConfig,
    source: Option<Arc<dyn ModuleSource>>,
    parser: Option<Arc<dyn ScriptParser>>,
    console: Option<Arc<dyn Console>>,
    builtins: Vec<(String, ScriptModule)>,
    globals: FxHashMap<Arc<str>, Value>,
}

impl EngineBuilder {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            source: None,
            parser: None,
            console: None,
            builtins: Vec::new(),
            globals: FxHashMap::default(),
        }
    }

    /// Serve module content from `source` instead of the filesystem
    pub fn source(mut self, source: impl ModuleSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn parser(mut self, parser: impl ScriptParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn console(mut self, console: impl Console + 'static) -> Self {
        self.console = Some(Arc::new(console));
        self
    }

    /// Register a host module (`node:process`)
    pub fn builtin(mut self, name: &str, script: ScriptModule) -> Self {
        self.builtins.push((name.to_string(), script));
        self
    }

    /// Expose `value` to every script body under `name`
    pub fn global(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.globals.insert(Arc::from(name), value.into());
        self
    }

    pub fn build(self) -> Engine {
        let source: Arc<dyn ModuleSource> = match self.source {
            Some(source) => source,
            None => Arc::new(FsSource::new(self.config.root.clone())),
        };
        let parser: Arc<dyn ScriptParser> = match self.parser {
            Some(parser) => parser,
            None => Arc::new(DeclarationScanner::new()),
        };
        let console: Arc<dyn Console> = match self.console {
            Some(console) => console,
            None => Arc::new(StdoutConsole),
        };

        let mut resolver = SpecifierResolver::new(&self.config);
        let mut loader = ContentLoader::new(source, parser);
        for (name, script) in self.builtins {
            resolver.register_builtin(&name);
            loader.register_builtin(&name, script);
        }

        Engine {
            config: self.config,
            resolver,
            loader,
            cache: ModuleCache::new(),
            console,
            globals: Arc::new(self.globals),
            jobs: JobQueue::new(),
            in_flight: FxHashMap::default(),
        }
    }
}

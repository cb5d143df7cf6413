//! Dynamic import scheduling
//!
//! `import()` never runs anything inline. It returns an [`ImportPromise`] and
//! queues the first step of the pipeline on the engine's [`JobQueue`]; each
//! step (resolve, link, evaluate, settle) is its own job, so other queued
//! work interleaves between them. Promise reactions are jobs too, which is
//! why code after an `import()` call always runs before the import's
//! continuation, even when the target is already cached.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::binding::Namespace;
use super::cache::ModuleId;
use super::key::{Attributes, CanonicalKey};
use super::record::ModuleState;
use crate::engine::Engine;
use crate::error::{EvalError, ModuleError};

/// Unique identifier for a dynamic import request
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImportId(u64);

static NEXT_IMPORT_ID: AtomicU64 = AtomicU64::new(1);

impl ImportId {
    /// Generate a new unique ImportId
    pub fn new() -> Self {
        ImportId(NEXT_IMPORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ImportId {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a dynamic import
pub type ImportResult = Result<Namespace, ModuleError>;

type Reaction = Box<dyn FnOnce(ImportResult) + Send>;

enum PromiseState {
    Pending(Vec<Reaction>),
    Settled(ImportResult),
}

struct PromiseInner {
    id: ImportId,
    specifier: Arc<str>,
    state: Mutex<PromiseState>,
    jobs: JobQueue,
}

/// Settle-once result of a dynamic import
#[derive(Clone)]
pub struct ImportPromise(Arc<PromiseInner>);

impl ImportPromise {
    pub(crate) fn new(specifier: &str, jobs: JobQueue) -> Self {
        Self(Arc::new(PromiseInner {
            id: ImportId::new(),
            specifier: Arc::from(specifier),
            state: Mutex::new(PromiseState::Pending(Vec::new())),
            jobs,
        }))
    }

    pub fn id(&self) -> ImportId {
        self.0.id
    }

    /// Specifier the import was issued with
    pub fn specifier(&self) -> &str {
        &self.0.specifier
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.0.state.lock(), PromiseState::Pending(_))
    }

    /// Settled result, `None` while pending
    pub fn result(&self) -> Option<ImportResult> {
        match &*self.0.state.lock() {
            PromiseState::Pending(_) => None,
            PromiseState::Settled(result) => Some(result.clone()),
        }
    }

    /// Register a continuation. It always runs as a later job, never inline.
    pub fn then<F>(&self, reaction: F)
    where
        F: FnOnce(ImportResult) + Send + 'static,
    {
        let mut state = self.0.state.lock();
        match &mut *state {
            PromiseState::Pending(reactions) => reactions.push(Box::new(reaction)),
            PromiseState::Settled(result) => {
                let result = result.clone();
                drop(state);
                self.0
                    .jobs
                    .push(Job::Reaction(Box::new(move || reaction(result))));
            }
        }
    }

    /// Settle and queue every registered reaction. Later calls are ignored.
    pub(crate) fn settle(&self, result: ImportResult) -> bool {
        let reactions = {
            let mut state = self.0.state.lock();
            let reactions = match &mut *state {
                PromiseState::Settled(_) => return false,
                PromiseState::Pending(reactions) => std::mem::take(reactions),
            };
            *state = PromiseState::Settled(result.clone());
            reactions
        };

        for reaction in reactions {
            let result = result.clone();
            self.0
                .jobs
                .push(Job::Reaction(Box::new(move || reaction(result))));
        }
        true
    }
}

impl fmt::Debug for ImportPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportPromise")
            .field("id", &self.0.id)
            .field("specifier", &self.0.specifier)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// One step of a dynamic import pipeline
#[derive(Debug)]
pub(crate) enum ImportStep {
    Resolve {
        specifier: String,
        referrer: Option<CanonicalKey>,
        attributes: Attributes,
    },
    Link(ModuleId),
    Evaluate(ModuleId),
    Settle(ModuleId),
}

pub(crate) struct ImportJob {
    promise: ImportPromise,
    step: ImportStep,
}

/// Unit of queued work
pub(crate) enum Job {
    Import(ImportJob),
    Reaction(Box<dyn FnOnce() + Send>),
}

/// FIFO of pending jobs, shared by the engine, importers and promises
#[derive(Clone, Default)]
pub struct JobQueue(Arc<Mutex<VecDeque<Job>>>);

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, job: Job) {
        self.0.lock().push_back(job);
    }

    pub(crate) fn pop(&self) -> Option<Job> {
        self.0.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue").field("len", &self.len()).finish()
    }
}

/// Handle for issuing dynamic imports on behalf of one module
#[derive(Debug, Clone)]
pub struct Importer {
    referrer: Option<CanonicalKey>,
    jobs: JobQueue,
}

impl Importer {
    pub(crate) fn new(referrer: Option<CanonicalKey>, jobs: JobQueue) -> Self {
        Self { referrer, jobs }
    }

    /// Module relative specifiers are resolved against
    pub fn referrer(&self) -> Option<&CanonicalKey> {
        self.referrer.as_ref()
    }

    /// Start a dynamic import. Nothing runs until the engine drains its jobs.
    pub fn import(&self, specifier: &str, attributes: Attributes) -> ImportPromise {
        let promise = ImportPromise::new(specifier, self.jobs.clone());
        debug!(
            import = promise.id().as_u64(),
            specifier,
            referrer = ?self.referrer,
            "queued dynamic import"
        );
        self.jobs.push(Job::Import(ImportJob {
            promise: promise.clone(),
            step: ImportStep::Resolve {
                specifier: specifier.to_string(),
                referrer: self.referrer.clone(),
                attributes,
            },
        }));
        promise
    }
}

impl Engine {
    /// Issue a dynamic import from `referrer` (or from the top level)
    pub fn dynamic_import(
        &self,
        specifier: &str,
        referrer: Option<&CanonicalKey>,
        attributes: Attributes,
    ) -> ImportPromise {
        self.importer(referrer).import(specifier, attributes)
    }

    /// Importer bound to `referrer`
    pub fn importer(&self, referrer: Option<&CanonicalKey>) -> Importer {
        Importer::new(referrer.cloned(), self.jobs.clone())
    }

    /// Run queued jobs until the queue is empty. Returns how many ran.
    pub fn run_jobs(&mut self) -> usize {
        let mut count = 0;
        while self.run_next_job() {
            count += 1;
        }
        count
    }

    /// Run the oldest queued job, if any
    pub fn run_next_job(&mut self) -> bool {
        match self.jobs.pop() {
            Some(Job::Reaction(reaction)) => {
                reaction();
                true
            }
            Some(Job::Import(job)) => {
                self.step_import(job);
                true
            }
            None => false,
        }
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    fn queue_step(&self, promise: ImportPromise, step: ImportStep) {
        self.jobs.push(Job::Import(ImportJob { promise, step }));
    }

    fn step_import(&mut self, job: ImportJob) {
        let ImportJob { promise, step } = job;
        debug!(import = promise.id().as_u64(), ?step, "dynamic import step");

        match step {
            ImportStep::Resolve {
                specifier,
                referrer,
                attributes,
            } => {
                let key = match self.resolver.resolve(
                    &specifier,
                    referrer.as_ref(),
                    &attributes,
                    self.loader.source(),
                ) {
                    Ok(key) => key,
                    Err(error) => {
                        promise.settle(Err(error.into()));
                        return;
                    }
                };
                let id = self.instantiate(&key);

                if let Some(waiters) = self.in_flight.get_mut(&id) {
                    waiters.push(promise);
                    return;
                }
                match self.cache.at(id).state() {
                    ModuleState::Evaluated | ModuleState::Errored => {
                        self.queue_step(promise, ImportStep::Settle(id))
                    }
                    _ => {
                        self.in_flight.insert(id, Vec::new());
                        self.queue_step(promise, ImportStep::Link(id));
                    }
                }
            }
            ImportStep::Link(id) => match self.link_recursive(id) {
                Ok(()) => self.queue_step(promise, ImportStep::Evaluate(id)),
                Err(error) => self.finish_import(id, &promise, Err(error)),
            },
            ImportStep::Evaluate(id) => match self.evaluate_recursive(id) {
                Ok(()) => self.queue_step(promise, ImportStep::Settle(id)),
                Err(error) => self.finish_import(id, &promise, Err(error)),
            },
            ImportStep::Settle(id) => {
                let record = self.cache.at(id);
                let result = match (record.error(), record.namespace()) {
                    (Some(error), _) => Err(error.clone()),
                    (None, Some(namespace)) => Ok(namespace.clone()),
                    (None, None) => Err(EvalError::NotLinked {
                        module: record.key().clone(),
                    }
                    .into()),
                };
                self.finish_import(id, &promise, result);
            }
        }
    }

    /// Settle a request and everything that waited on the same record
    fn finish_import(&mut self, id: ModuleId, promise: &ImportPromise, result: ImportResult) {
        promise.settle(result.clone());
        for waiter in self.in_flight.remove(&id).unwrap_or_default() {
            waiter.settle(result.clone());
        }
    }
}

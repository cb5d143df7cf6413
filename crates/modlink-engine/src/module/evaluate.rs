//! Module evaluation
//!
//! Dependencies run before the module's own body, in first-linked order. A
//! dependency that is already Evaluating is a cycle partner further up the
//! stack and is skipped; its bindings fill when its own body runs.

use tracing::{debug, warn};

use super::cache::ModuleId;
use super::dynamic::Importer;
use super::loader::RawModule;
use super::record::ModuleState;
use crate::engine::Engine;
use crate::error::{EvalError, ModuleError};
use crate::script::ExecutionContext;

impl Engine {
    /// Evaluate a linked record after its dependencies, at most once
    #[tracing::instrument(level = "debug", skip_all, fields(module = %id))]
    pub(crate) fn evaluate_recursive(&mut self, id: ModuleId) -> Result<(), ModuleError> {
        let record = self.cache.at(id);
        if let Some(error) = record.error() {
            return Err(error.clone());
        }
        match record.state() {
            ModuleState::Evaluating | ModuleState::Evaluated | ModuleState::Errored => {
                return Ok(())
            }
            ModuleState::Unlinked | ModuleState::Linking => {
                return Err(EvalError::NotLinked {
                    module: record.key().clone(),
                }
                .into())
            }
            ModuleState::Linked => {}
        }

        let key = record.key().clone();
        let body = match record.content() {
            Some(RawModule::Script(script)) => script.body.clone(),
            // Data and style modules were filled while loading
            _ => {
                self.cache.at_mut(id).set_evaluated();
                debug!(module = %key, "evaluated");
                return Ok(());
            }
        };
        let dependencies = record.dependencies().to_vec();

        self.cache.at_mut(id).set_evaluating();

        for dependency in dependencies {
            if let Err(error) = self.evaluate_recursive(dependency) {
                warn!(module = %key, %error, "dependency failed to evaluate");
                self.cache.at_mut(id).set_errored(error.clone());
                return Err(error);
            }
        }

        if let Some(body) = body {
            let record = self.cache.at(id);
            let mut cx = ExecutionContext::new(
                key.clone(),
                record.bindings().clone(),
                record.imports().clone(),
                Importer::new(Some(key.clone()), self.jobs.clone()),
                self.console.clone(),
                self.globals.clone(),
            );
            debug!(module = %key, "running module body");
            let result = body.run(&mut cx);
            self.cache.at_mut(id).retain(cx.take_retained());
            if let Err(error) = result {
                warn!(module = %key, %error, "module body failed");
                let error = ModuleError::from(error);
                self.cache.at_mut(id).set_errored(error.clone());
                return Err(error);
            }
        }

        self.cache.at_mut(id).set_evaluated();
        debug!(module = %key, "evaluated");
        Ok(())
    }
}

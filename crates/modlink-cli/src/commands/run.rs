//! `modlink run`: evaluate an entry module, drain queued dynamic imports, then
//! fire `beforeExit` and drain whatever its listeners queued

use anyhow::Context;
use modlink_engine::{Engine, LoaderConfig};
use tracing::debug;

use super::entry_specifier;
use crate::builtins;

pub fn execute(config: LoaderConfig, entry: &str, args: &[String]) -> anyhow::Result<()> {
    let specifier = entry_specifier(&config.root, entry)?;

    let mut argv = vec!["modlink".to_string(), entry.to_string()];
    argv.extend(args.iter().cloned());

    let (builder, host) = builtins::install(Engine::builder(config), argv);
    let mut engine = builder.build();
    engine
        .run_module(&specifier)
        .with_context(|| format!("Failed to run {}", entry))?;

    let mut jobs = engine.run_jobs();
    host.emit(builtins::BEFORE_EXIT)
        .with_context(|| format!("'{}' listener failed", builtins::BEFORE_EXIT))?;
    jobs += engine.run_jobs();
    debug!(jobs, modules = engine.cache().len(), "finished");
    Ok(())
}

//! CLI command implementations

pub mod graph;
pub mod run;

use anyhow::{anyhow, Context};
use std::path::Path;

/// Virtual absolute path (`/src/main.js`) of an entry file given on the command line
pub fn entry_specifier(root: &Path, entry: &str) -> anyhow::Result<String> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Project root not found: {}", root.display()))?;
    let path = Path::new(entry)
        .canonicalize()
        .with_context(|| format!("File not found: {}", entry))?;
    let relative = path.strip_prefix(&root).map_err(|_| {
        anyhow!(
            "{} is outside the project root {}",
            entry,
            root.display()
        )
    })?;

    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(format!("/{}", segments.join("/")))
}

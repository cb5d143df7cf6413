//! `modlink graph`: link an entry module and print every record in the cache

use modlink_engine::module::ModuleRecord;
use modlink_engine::{Attributes, Engine, LoaderConfig, ModuleState};
use serde_json::json;

use super::entry_specifier;
use crate::builtins;

pub fn execute(config: LoaderConfig, entry: &str, json: bool) -> anyhow::Result<()> {
    let specifier = entry_specifier(&config.root, entry)?;
    let argv = vec!["modlink".to_string(), entry.to_string()];
    let (builder, _host) = builtins::install(Engine::builder(config), argv);
    let mut engine = builder.build();

    let key = engine.resolve(&specifier, None, &Attributes::new())?;
    // The graph is printed even when linking fails part way
    let linked = engine.link(&key);

    if json {
        println!("{}", serde_json::to_string_pretty(&graph_json(&engine))?);
    } else {
        print!("{}", render(&engine));
    }

    linked?;
    Ok(())
}

fn state_name(state: ModuleState) -> &'static str {
    match state {
        ModuleState::Unlinked => "unlinked",
        ModuleState::Linking => "linking",
        ModuleState::Linked => "linked",
        ModuleState::Evaluating => "evaluating",
        ModuleState::Evaluated => "evaluated",
        ModuleState::Errored => "errored",
    }
}

fn dependency_names(engine: &Engine, record: &ModuleRecord) -> Vec<String> {
    record
        .dependencies()
        .iter()
        .filter_map(|id| engine.cache().get(*id))
        .map(|dep| dep.key().to_string())
        .collect()
}

fn render(engine: &Engine) -> String {
    let mut out = String::new();
    for (id, record) in engine.cache().iter() {
        out.push_str(&format!(
            "{} {} [{}] {}\n",
            id,
            record.key(),
            record.key().kind(),
            state_name(record.state())
        ));
        for dep in dependency_names(engine, record) {
            out.push_str(&format!("    -> {}\n", dep));
        }
        if let Some(error) = record.error() {
            out.push_str(&format!("    !! {}\n", error));
        }
    }

    let stats = engine.cache().stats();
    out.push_str(&format!(
        "{} modules ({} cache hits, {} misses)\n",
        stats.entries, stats.hits, stats.misses
    ));
    out
}

fn graph_json(engine: &Engine) -> serde_json::Value {
    let modules: Vec<serde_json::Value> = engine
        .cache()
        .iter()
        .map(|(id, record)| {
            json!({
                "id": id.index(),
                "key": record.key().to_string(),
                "kind": record.key().kind().name(),
                "state": state_name(record.state()),
                "dependencies": dependency_names(engine, record),
                "error": record.error().map(|e| e.to_string()),
            })
        })
        .collect();
    json!({ "modules": modules })
}

#[cfg(test)]
mod tests {
    use super::*;
    use modlink_engine::{BufferConsole, MemorySource};

    fn linked_engine() -> Engine {
        let source = MemorySource::new()
            .with_text("/main.js", r#"import { a } from "./a.js"; import "./missing.js";"#)
            .with_text("/a.js", "export const a = 1;");
        let mut engine = Engine::builder(LoaderConfig::default())
            .source(source)
            .console(BufferConsole::new())
            .build();
        let key = engine.resolve("/main.js", None, &Attributes::new()).unwrap();
        assert!(engine.link(&key).is_err());
        engine
    }

    #[test]
    fn test_render_lists_records_and_edges() {
        let engine = linked_engine();
        let text = render(&engine);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("#0 /main.js [script] errored"));
        assert_eq!(lines[1], "    -> /a.js");
        assert!(lines[2].starts_with("    !! "));
        assert!(lines[3].starts_with("#1 /a.js [script] linked"));
        assert!(text.ends_with("2 modules (0 cache hits, 2 misses)\n"));
    }

    #[test]
    fn test_graph_json() {
        let engine = linked_engine();
        let graph = graph_json(&engine);
        let modules = graph["modules"].as_array().unwrap();

        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0]["key"], "/main.js");
        assert_eq!(modules[0]["dependencies"], json!(["/a.js"]));
        assert_eq!(modules[1]["state"], "linked");
        assert!(modules[1]["error"].is_null());
    }
}

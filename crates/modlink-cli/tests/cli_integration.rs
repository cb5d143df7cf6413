//! Integration tests for the modlink binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn modlink(root: &Path, args: &[&str]) -> Output {
    modlink_with_env(root, args, &[])
}

fn modlink_with_env(root: &Path, args: &[&str], vars: &[(&str, &str)]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_modlink"))
        .current_dir(root)
        .args(args)
        .env_remove("MODLINK_LOG")
        .env_remove("MY_VAR")
        .envs(vars.iter().copied())
        .output()
        .expect("failed to spawn modlink")
}

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, text) in files {
        let path = dir.path().join(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }
    dir
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_run_entry_module() {
    let dir = project(&[
        (
            "src/main.js",
            r#"
            import { greeting } from "./greeting.js";
            import { basename } from "node:path";
            console.log(greeting, basename(import.meta.url));
            import("./later.js").then(ns => console.log(ns.message));
            "#,
        ),
        ("src/greeting.js", r#"export const greeting = "hello";"#),
        ("src/later.js", r#"export const message = "later";"#),
    ]);

    let output = modlink(dir.path(), &["run", "src/main.js"]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "hello main.js\nlater\n");
}

#[test]
fn test_run_passes_arguments() {
    let dir = project(&[(
        "main.js",
        r#"
        import { argv } from "process";
        console.log(argv[2], argv[3]);
        "#,
    )]);

    let output = modlink(dir.path(), &["run", "main.js", "one", "two"]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "one two\n");
}

#[test]
fn test_run_reports_link_errors() {
    let dir = project(&[("main.js", r#"import { nope } from "./lib.js";"#), ("lib.js", "")]);

    let output = modlink(dir.path(), &["run", "main.js"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not provide an export named 'nope'"), "{}", stderr);
}

#[test]
fn test_config_file_in_root() {
    let dir = project(&[
        (
            "modlink.toml",
            r#"
            [imports]
            "@lib/" = "./lib/"
            "#,
        ),
        ("main.js", r#"import { v } from "@lib/v.js"; console.log(v);"#),
        ("lib/v.js", "export const v = 9;"),
    ]);

    let output = modlink(dir.path(), &["run", "main.js"]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(stdout(&output), "9\n");
}

#[test]
fn test_graph_json() {
    let dir = project(&[
        ("main.js", r#"import "./a.js"; console.log("not run");"#),
        ("a.js", ""),
    ]);

    let output = modlink(dir.path(), &["graph", "main.js", "--json"]);
    assert!(output.status.success(), "{:?}", output);

    let graph: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let modules = graph["modules"].as_array().unwrap();
    assert_eq!(modules.len(), 2);
    assert_eq!(modules[0]["key"], "/main.js");
    assert_eq!(modules[0]["state"], "linked");
    assert_eq!(modules[1]["key"], "/a.js");
}

const MY_MODULE: &str = "import path from \"node:path\";\n\nexport default function exportedDefaultFunction() {\n\treturn \"** 1 **\";\n}\n\nexport function exportedFunction() {\n\treturn \"** 2 **\";\n}\n\nconsole.log(\"\\nMy variable is: \", process.env.MY_VAR);\nconsole.log(`\\n**************** ${path.basename(import.meta.url)} loaded ****************\\n`);";

const DEFAULT_IMPORT: &str = r#"// Default import
import process from "node:process";
import exportedDefaultFunction from "./assets/myModule.js";

console.log(exportedDefaultFunction());

process.on("beforeExit", () => {
    console.log("Before Exit");
});
"#;

const NAMED_IMPORT: &str = r#"// Named import
import { exportedFunction } from "./assets/myModule.js";

// import { on } from "node:process"; // This fails since `on` is not exported, but is available in the `process` object

// These are equivalent:
// import { default as exportedDefaultFunction } from "./assets/myModule.js";
// import exportedDefaultFunction from "./assets/myModule.js";

console.log(exportedFunction());
"#;

#[test]
fn test_default_import_with_before_exit() {
    let dir = project(&[
        ("assets/myModule.js", MY_MODULE),
        ("01_default_import.js", DEFAULT_IMPORT),
    ]);

    let output = modlink_with_env(
        dir.path(),
        &["run", "01_default_import.js"],
        &[("MY_VAR", "from the shell")],
    );
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(
        stdout(&output),
        "\nMy variable is:  from the shell\n\
         \n**************** myModule.js loaded ****************\n\n\
         ** 1 **\n\
         Before Exit\n"
    );
}

#[test]
fn test_named_import_without_env_var() {
    let dir = project(&[
        ("assets/myModule.js", MY_MODULE),
        ("02_named_import.js", NAMED_IMPORT),
    ]);

    let output = modlink(dir.path(), &["run", "02_named_import.js"]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(
        stdout(&output),
        "\nMy variable is:  undefined\n\
         \n**************** myModule.js loaded ****************\n\n\
         ** 2 **\n"
    );
}

#[test]
fn test_before_exit_listener_failure_is_reported() {
    let dir = project(&[(
        "main.js",
        r#"
        process.on("beforeExit", () => {
            throw new Error("late");
        });
        console.log("ran");
        "#,
    )]);

    let output = modlink(dir.path(), &["run", "main.js"]);
    assert!(!output.status.success());
    assert_eq!(stdout(&output), "ran\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: late"), "{}", stderr);
}

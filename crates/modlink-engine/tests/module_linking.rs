//! Integration tests for module linking
//!
//! Static graphs built from scanned script sources held in memory.

use modlink_engine::{
    Attributes, BufferConsole, Engine, EvalError, LinkError, LoadError, LoaderConfig, MemorySource,
    ModuleError, ModuleState, ResolutionError, Value,
};

fn create_engine(files: &[(&str, &str)]) -> (Engine, BufferConsole) {
    create_engine_with(LoaderConfig::default(), files)
}

fn create_engine_with(config: LoaderConfig, files: &[(&str, &str)]) -> (Engine, BufferConsole) {
    let source = MemorySource::new();
    for (path, text) in files {
        source.insert_text(path, text);
    }
    let console = BufferConsole::new();
    let engine = Engine::builder(config)
        .source(source)
        .console(console.clone())
        .build();
    (engine, console)
}

#[test]
fn test_same_module_through_different_specifiers() {
    let (mut engine, _) = create_engine(&[
        (
            "/main.js",
            r#"
            import * as one from "./a.js";
            import * as two from "./sub/../a";
            export const first = one;
            export const second = two;
            "#,
        ),
        ("/a.js", "export const value = 1;"),
    ]);

    let ns = engine.run_module("./main.js").unwrap();
    let first = ns.get("first").unwrap();
    let second = ns.get("second").unwrap();
    assert!(first
        .as_namespace()
        .unwrap()
        .ptr_eq(second.as_namespace().unwrap()));

    // main + a
    assert_eq!(engine.cache().len(), 2);
}

#[test]
fn test_dependencies_evaluate_in_declaration_order() {
    let (mut engine, console) = create_engine(&[
        (
            "/a.js",
            r#"
            import "./b.js";
            import "./c.js";
            console.log("A");
            "#,
        ),
        ("/b.js", r#"console.log("B");"#),
        ("/c.js", r#"console.log("C");"#),
    ]);

    engine.run_module("./a.js").unwrap();
    assert_eq!(console.lines(), vec!["B", "C", "A"]);
}

#[test]
fn test_shared_dependency_evaluates_once() {
    let (mut engine, console) = create_engine(&[
        (
            "/main.js",
            r#"
            import { b } from "./b.js";
            import { c } from "./c.js";
            console.log(b + c);
            "#,
        ),
        (
            "/b.js",
            r#"
            import { d } from "./d.js";
            export const b = d + 1;
            "#,
        ),
        (
            "/c.js",
            r#"
            import { d } from "./d.js";
            export const c = d + 2;
            "#,
        ),
        (
            "/d.js",
            r#"
            console.log("d");
            export const d = 10;
            "#,
        ),
    ]);

    engine.run_module("./main.js").unwrap();
    assert_eq!(console.lines(), vec!["d", "23"]);
    assert_eq!(engine.cache().len(), 4);
}

#[test]
fn test_link_without_evaluation() {
    let (mut engine, console) = create_engine(&[
        ("/main.js", r#"import { x } from "./x.js"; console.log(x);"#),
        ("/x.js", "export const x = 1;"),
    ]);

    let key = engine.resolve("./main.js", None, &Attributes::new()).unwrap();
    engine.link(&key).unwrap();

    assert_eq!(engine.record(&key).unwrap().state(), ModuleState::Linked);
    assert!(console.lines().is_empty());

    // Exports are declared but not initialized yet
    let x = engine.resolve("./x.js", None, &Attributes::new()).unwrap();
    let ns = engine.namespace(&x).unwrap();
    assert!(ns.has("x"));
    assert!(matches!(
        ns.get("x"),
        Err(EvalError::UninitializedBinding { .. })
    ));
}

#[test]
fn test_missing_export() {
    let (mut engine, console) = create_engine(&[
        ("/main.js", r#"import { nope } from "./a.js"; console.log("main");"#),
        ("/a.js", r#"console.log("a"); export const yes = 1;"#),
    ]);

    let err = engine.run_module("./main.js").unwrap_err();
    match &err {
        ModuleError::Link(LinkError::MissingExport { name, module, .. }) => {
            assert_eq!(name, "nope");
            assert_eq!(module.location().as_str(), "/a.js");
        }
        other => panic!("Expected MissingExport, got {:?}", other),
    }

    // Linking failed, so nothing ran
    assert!(console.lines().is_empty());
}

#[test]
fn test_unresolvable_dependency() {
    let (mut engine, _) = create_engine(&[("/main.js", r#"import "./missing.js";"#)]);

    let err = engine.run_module("./main.js").unwrap_err();
    match err {
        ModuleError::Link(LinkError::DependencyFailed {
            specifier, cause, ..
        }) => {
            assert_eq!(specifier, "./missing.js");
            assert!(matches!(
                *cause,
                ModuleError::Resolution(ResolutionError::NotFound { .. })
            ));
        }
        other => panic!("Expected DependencyFailed, got {:?}", other),
    }
}

#[test]
fn test_link_errors_propagate_unwrapped() {
    let (mut engine, _) = create_engine(&[
        ("/main.js", r#"import { b } from "./b.js";"#),
        ("/b.js", r#"import { c } from "./c.js"; export const b = c;"#),
        ("/c.js", "export const other = 1;"),
    ]);

    let err = engine.run_module("./main.js").unwrap_err();
    match &err {
        ModuleError::Link(LinkError::MissingExport { importer, name, .. }) => {
            assert_eq!(importer.location().as_str(), "/b.js");
            assert_eq!(name, "c");
        }
        other => panic!("Expected MissingExport, got {:?}", other),
    }

    // Every record on the failing path keeps the same error
    let b = engine.resolve("./b.js", None, &Attributes::new()).unwrap();
    assert_eq!(engine.record(&b).unwrap().state(), ModuleState::Errored);
    assert_eq!(engine.record(&b).unwrap().error(), Some(&err));
}

#[test]
fn test_cycle_with_missing_dependency_errors_every_member() {
    let (mut engine, console) = create_engine(&[
        ("/a.js", r#"import { b } from "./b.js"; export const a = "a";"#),
        (
            "/b.js",
            r#"
            import { a } from "./a.js";
            import "./missing.js";
            export const b = "b";
            "#,
        ),
    ]);

    let err = engine.run_module("./a.js").unwrap_err();
    match &err {
        ModuleError::Link(LinkError::DependencyFailed {
            importer,
            specifier,
            cause,
        }) => {
            assert_eq!(importer.location().as_str(), "/b.js");
            assert_eq!(specifier, "./missing.js");
            assert!(matches!(
                **cause,
                ModuleError::Resolution(ResolutionError::NotFound { .. })
            ));
        }
        other => panic!("Expected DependencyFailed, got {:?}", other),
    }

    let a = engine.resolve("./a.js", None, &Attributes::new()).unwrap();
    let b = engine.resolve("./b.js", None, &Attributes::new()).unwrap();
    for key in [&a, &b] {
        let record = engine.record(key).unwrap();
        assert_eq!(record.state(), ModuleState::Errored);
        assert_eq!(record.error(), Some(&err));
    }

    // Entering the cycle from the other side gets the stored error back
    assert_eq!(engine.run_module("./b.js").unwrap_err(), err);
    assert!(console.lines().is_empty());
}

#[test]
fn test_syntax_error_in_dependency() {
    let (mut engine, _) = create_engine(&[
        ("/main.js", r#"import "./broken.js";"#),
        ("/broken.js", "\nclass Broken {}"),
    ]);

    let err = engine.run_module("./main.js").unwrap_err();
    match err {
        ModuleError::Link(LinkError::DependencyFailed { cause, .. }) => match *cause {
            ModuleError::Load(LoadError::Syntax { error, .. }) => assert_eq!(error.line, 2),
            other => panic!("Expected Syntax, got {:?}", other),
        },
        other => panic!("Expected DependencyFailed, got {:?}", other),
    }
}

#[test]
fn test_type_only_imports_are_not_loaded() {
    let (mut engine, console) = create_engine(&[(
        "/main.js",
        r#"
        import type { Options } from "./types.js";
        import { type Shape } from "./shapes.js";
        const size: number = 3;
        console.log(size);
        "#,
    )]);

    // shapes.js is still a side-effect dependency, and it does not exist
    let err = engine.run_module("./main.js").unwrap_err();
    match err {
        ModuleError::Link(LinkError::DependencyFailed { specifier, .. }) => {
            assert_eq!(specifier, "./shapes.js");
        }
        other => panic!("Expected DependencyFailed, got {:?}", other),
    }
    assert!(console.lines().is_empty());

    let (mut engine, console) = create_engine(&[(
        "/main.js",
        r#"
        import type { Options } from "./types.js";
        const size: number = 3;
        console.log(size);
        "#,
    )]);
    engine.run_module("./main.js").unwrap();
    assert_eq!(console.lines(), vec!["3"]);
    assert_eq!(engine.cache().len(), 1);
}

#[test]
fn test_remapped_bare_specifiers() {
    let config = LoaderConfig::default()
        .with_import("utils", "./lib/utils.js")
        .with_import("@app/", "./src/");
    let (mut engine, console) = create_engine_with(
        config,
        &[
            (
                "/main.js",
                r#"
                import { add } from "utils";
                import { name } from "@app/name.js";
                console.log(name, add(1, 2));
                "#,
            ),
            ("/lib/utils.js", "export function add(a, b) { return a + b; }"),
            ("/src/name.js", r#"export const name = "app";"#),
        ],
    );

    engine.run_module("./main.js").unwrap();
    assert_eq!(console.lines(), vec!["app 3"]);
}

#[test]
fn test_index_file_resolution() {
    let (mut engine, console) = create_engine(&[
        ("/main.js", r#"import { v } from "./pkg"; console.log(v);"#),
        ("/pkg/index.js", "export const v = 5;"),
    ]);

    engine.run_module("./main.js").unwrap();
    assert_eq!(console.lines(), vec!["5"]);
}

#[test]
fn test_namespace_reads_undeclared_as_undefined() {
    let (mut engine, _) = create_engine(&[
        (
            "/main.js",
            r#"
            import * as lib from "./lib.js";
            export const missing = lib.nothing;
            "#,
        ),
        ("/lib.js", "export const something = 1;"),
    ]);

    let ns = engine.run_module("./main.js").unwrap();
    assert_eq!(ns.get("missing").unwrap(), Value::Undefined);
}

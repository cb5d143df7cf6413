//! Host modules available to scripts run from the CLI
//!
//! - `node:process`: `argv`, `env`, `platform`, `pid`, `cwd()`
//! - `node:path`: `basename`, `dirname`, `extname`, `join`, `sep`
//!
//! Both also export everything as a `default` object. The process object is
//! also the `process` global; it adds `on(event, listener)`, which is not a
//! named export. `env` is writable and shared by every view of it.

use modlink_engine::{EngineBuilder, EvalError, ScriptModule, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

pub const PROCESS: &str = "node:process";
pub const PATH: &str = "node:path";

/// Fired once the entry module and its queued imports have finished
pub const BEFORE_EXIT: &str = "beforeExit";

type Listeners = Arc<Mutex<Vec<(String, Value)>>>;

/// Process state shared by `node:process` and the `process` global
#[derive(Clone)]
pub struct Host {
    process: Value,
    listeners: Listeners,
}

impl Host {
    pub fn new(argv: Vec<String>) -> Self {
        let listeners: Listeners = Arc::default();
        let env = Value::object(std::env::vars().map(|(k, v)| (k, Value::from(v))));
        let on = {
            let listeners = listeners.clone();
            Value::function("on", move |args| {
                let event = match args.first() {
                    Some(Value::String(event)) => event.to_string(),
                    _ => return Err(native_error("on", "event name must be a string")),
                };
                match args.get(1) {
                    Some(listener @ Value::Function(_)) => {
                        listeners.lock().push((event, listener.clone()));
                        Ok(Value::Undefined)
                    }
                    _ => Err(native_error("on", "listener must be a function")),
                }
            })
        };

        let process = Value::object([
            ("argv", Value::Data(Arc::new(serde_json::Value::from(argv)))),
            ("env", env),
            ("platform", Value::from(std::env::consts::OS)),
            ("pid", Value::from(std::process::id() as f64)),
            (
                "cwd",
                Value::function("cwd", |_| {
                    std::env::current_dir()
                        .map(|dir| Value::from(dir.display().to_string()))
                        .map_err(|e| native_error("cwd", e.to_string()))
                }),
            ),
            ("on", on),
        ]);
        Self { process, listeners }
    }

    /// The `process` object
    pub fn process(&self) -> &Value {
        &self.process
    }

    /// Call every listener registered for `event`, in registration order
    pub fn emit(&self, event: &str) -> Result<usize, EvalError> {
        let listeners: Vec<Value> = self
            .listeners
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, listener)| listener.clone())
            .collect();
        debug!(event, listeners = listeners.len(), "emitting process event");
        for listener in &listeners {
            listener.call(&[])?;
        }
        Ok(listeners.len())
    }
}

/// Register the builtin modules and the `process` global on an engine builder
pub fn install(builder: EngineBuilder, argv: Vec<String>) -> (EngineBuilder, Host) {
    let host = Host::new(argv);
    let builder = builder
        .builtin(PROCESS, process_module(host.process.clone()))
        .builtin(PATH, path_module())
        .global("process", host.process.clone());
    (builder, host)
}

fn process_module(process: Value) -> ScriptModule {
    ScriptModule::builder()
        .exports(["argv", "env", "platform", "pid", "cwd", "default"])
        .body(move |cx| {
            for name in ["argv", "env", "platform", "pid", "cwd"] {
                cx.export(name, process.member(name)?)?;
            }
            cx.export_default(process.clone())
        })
        .build()
}

fn path_module() -> ScriptModule {
    ScriptModule::builder()
        .exports(["basename", "dirname", "extname", "join", "sep", "default"])
        .body(|cx| {
            let exports = [
                (
                    "basename",
                    Value::function("basename", |args| {
                        let path = string_arg("basename", args, 0)?;
                        let mut base = basename(&path).to_string();
                        if let Some(Value::String(suffix)) = args.get(1) {
                            if base.len() > suffix.len() && base.ends_with(&**suffix) {
                                base.truncate(base.len() - suffix.len());
                            }
                        }
                        Ok(Value::from(base))
                    }),
                ),
                (
                    "dirname",
                    Value::function("dirname", |args| {
                        Ok(Value::from(dirname(&string_arg("dirname", args, 0)?)))
                    }),
                ),
                (
                    "extname",
                    Value::function("extname", |args| {
                        Ok(Value::from(extname(&string_arg("extname", args, 0)?)))
                    }),
                ),
                (
                    "join",
                    Value::function("join", |args| {
                        let parts = (0..args.len())
                            .map(|i| string_arg("join", args, i))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Value::from(join(&parts)))
                    }),
                ),
                ("sep", Value::from("/")),
            ];
            for (name, value) in &exports {
                cx.export(name, value.clone())?;
            }
            cx.export_default(Value::record(exports))
        })
        .build()
}

fn native_error(function: &str, message: impl Into<String>) -> EvalError {
    EvalError::Native {
        function: function.to_string(),
        message: message.into(),
    }
}

fn string_arg(function: &str, args: &[Value], index: usize) -> Result<String, EvalError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.to_string()),
        Some(other) => Err(native_error(
            function,
            format!(
                "The \"path\" argument must be of type string. Received {}",
                other.type_name()
            ),
        )),
        None => Err(native_error(function, "missing \"path\" argument")),
    }
}

fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." }.to_string();
    }
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => ".".to_string(),
    }
}

fn extname(path: &str) -> String {
    let base = basename(path);
    match base.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => base[idx..].to_string(),
    }
}

fn join(parts: &[String]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        return ".".to_string();
    }

    let absolute = joined.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().map_or(true, |last| *last == "..") {
                    if !absolute {
                        segments.push("..");
                    }
                } else {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }

    let body = segments.join("/");
    match (absolute, body.is_empty()) {
        (true, _) => format!("/{}", body),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

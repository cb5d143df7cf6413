//! Runtime values seen by module bodies

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::error::{EvalError, ImmutabilityError};
use crate::module::{ImportPromise, Namespace, StyleSheet};

/// Host function callable from module bodies
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync;

/// A named native function
#[derive(Clone)]
pub struct NativeFunction {
    name: Arc<str>,
    func: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// Writable host object shared by reference (`process.env`)
#[derive(Clone, Default)]
pub struct ObjectRef(Arc<RwLock<BTreeMap<Arc<str>, Value>>>);

impl ObjectRef {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        Self(Arc::new(RwLock::new(
            entries
                .into_iter()
                .map(|(name, value)| (Arc::from(name.as_ref()), value))
                .collect(),
        )))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.read().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.0.write().insert(Arc::from(name), value);
    }

    /// Snapshot of the current entries, sorted by name
    pub fn entries(&self) -> Vec<(Arc<str>, Value)> {
        self.0
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<Arc<str>> = self.0.read().keys().cloned().collect();
        f.debug_tuple("ObjectRef").field(&names).finish()
    }
}

/// Runtime value
///
/// Compound values are immutable once built, except host objects created
/// with [`Value::object`]. Structured data is shared behind an `Arc` and never
/// written.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    /// Frozen structured data (JSON object or array)
    Data(Arc<serde_json::Value>),
    /// Opaque stylesheet handle
    Style(Arc<StyleSheet>),
    /// Frozen host object
    Record(Arc<BTreeMap<Arc<str>, Value>>),
    /// Writable host object
    Object(ObjectRef),
    Namespace(Namespace),
    Function(NativeFunction),
    Promise(ImportPromise),
}

impl Value {
    /// Convert parsed data into a value. Objects and arrays stay shared data.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(Arc::from(s.as_str())),
            compound => Value::Data(Arc::new(compound.clone())),
        }
    }

    /// Frozen object from `(name, value)` pairs
    pub fn record<I, S>(entries: I) -> Value
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        Value::Record(Arc::new(
            entries
                .into_iter()
                .map(|(name, value)| (Arc::from(name.as_ref()), value))
                .collect(),
        ))
    }

    /// Writable object from `(name, value)` pairs; clones share the entries
    pub fn object<I, S>(entries: I) -> Value
    where
        I: IntoIterator<Item = (S, Value)>,
        S: AsRef<str>,
    {
        Value::Object(ObjectRef::new(entries))
    }

    /// Native function value
    pub fn function<F>(name: &str, func: F) -> Value
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Value::Function(NativeFunction::new(name, func))
    }

    /// Property read (`value.name`)
    pub fn member(&self, name: &str) -> Result<Value, EvalError> {
        match self {
            Value::Undefined | Value::Null => Err(EvalError::Native {
                function: "property access".to_string(),
                message: format!("Cannot read properties of {} (reading '{}')", self, name),
            }),
            Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
            Value::Data(data) => Ok(match &**data {
                serde_json::Value::Object(map) => {
                    map.get(name).map(Value::from_json).unwrap_or_default()
                }
                serde_json::Value::Array(items) if name == "length" => {
                    Value::Number(items.len() as f64)
                }
                serde_json::Value::Array(items) => name
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| items.get(idx))
                    .map(Value::from_json)
                    .unwrap_or_default(),
                _ => Value::Undefined,
            }),
            Value::Style(sheet) => Ok(match name {
                "href" => Value::from(sheet.href()),
                "ruleCount" => Value::Number(sheet.rule_count() as f64),
                _ => Value::Undefined,
            }),
            Value::Record(entries) => Ok(entries.get(name).cloned().unwrap_or_default()),
            Value::Object(object) => Ok(object.get(name).unwrap_or_default()),
            Value::Namespace(ns) => ns.get(name),
            Value::Function(func) if name == "name" => Ok(Value::from(func.name())),
            Value::Promise(promise) => Ok(match name {
                "then" => promise_method(promise, "then"),
                "catch" => promise_method(promise, "catch"),
                _ => Value::Undefined,
            }),
            _ => Ok(Value::Undefined),
        }
    }

    /// Property write (`value.name = x`). Only host objects accept writes.
    pub fn set_member(&self, name: &str, value: Value) -> Result<(), ImmutabilityError> {
        match self {
            Value::Object(object) => {
                object.set(name, value);
                Ok(())
            }
            Value::Namespace(ns) => ns.set(name, value),
            other => Err(ImmutabilityError::Frozen {
                kind: other.type_name(),
                name: name.to_string(),
            }),
        }
    }

    /// Call a function value
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        match self {
            Value::Function(func) => func.call(args),
            other => Err(EvalError::NotCallable {
                value: other.to_string(),
            }),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Data(_) => "structured data",
            Value::Style(_) => "stylesheet",
            Value::Record(_) | Value::Object(_) => "object",
            Value::Namespace(_) => "module namespace",
            Value::Function(_) => "function",
            Value::Promise(_) => "promise",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            Value::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    /// `if (value)` semantics
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

/// `promise.then(onFulfilled, onRejected)` / `promise.catch(onRejected)`
///
/// Continuations run as queued jobs; their own failures are logged, not chained.
fn promise_method(promise: &ImportPromise, method: &'static str) -> Value {
    let promise = promise.clone();
    Value::function(method, move |args| {
        let (on_fulfilled, on_rejected) = if method == "catch" {
            (None, args.first().cloned())
        } else {
            (args.first().cloned(), args.get(1).cloned())
        };
        let specifier = promise.specifier().to_string();
        promise.then(move |result| {
            let outcome = match (result, on_fulfilled, on_rejected) {
                (Ok(namespace), Some(callback), _) => {
                    callback.call(&[Value::Namespace(namespace)]).map(drop)
                }
                (Err(error), _, Some(callback)) => {
                    callback.call(&[Value::from(error.to_string())]).map(drop)
                }
                (Err(error), _, None) => {
                    warn!(specifier = %specifier, %error, "unhandled dynamic import rejection");
                    Ok(())
                }
                (Ok(_), None, _) => Ok(()),
            };
            if let Err(error) = outcome {
                warn!(specifier = %specifier, %error, "dynamic import continuation failed");
            }
        });
        Ok(Value::Undefined)
    })
}

fn write_number(f: &mut fmt::Formatter<'_>, n: f64) -> fmt::Result {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        write!(f, "{}", n)
    }
}

fn write_entries<'a>(
    f: &mut fmt::Formatter<'_>,
    entries: impl ExactSizeIterator<Item = (&'a Arc<str>, &'a Value)>,
) -> fmt::Result {
    if entries.len() == 0 {
        return f.write_str("{}");
    }
    f.write_str("{ ")?;
    for (i, (name, value)) in entries.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        match value {
            Value::String(s) => write!(f, "{}: '{}'", name, s)?,
            other => write!(f, "{}: {}", name, other)?,
        }
    }
    f.write_str(" }")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write_number(f, *n),
            Value::String(s) => f.write_str(s),
            Value::Data(data) => write!(f, "{}", data),
            Value::Style(sheet) => write!(f, "[object CSSStyleSheet {}]", sheet.href()),
            Value::Record(entries) => write_entries(f, entries.iter()),
            Value::Object(object) => {
                let entries = object.entries();
                write_entries(f, entries.iter().map(|(name, value)| (name, value)))
            }
            Value::Namespace(ns) => {
                let names: Vec<&str> = ns.table().names().iter().map(|n| &**n).collect();
                write!(f, "[Module: {}] {{ {} }}", ns.module(), names.join(", "))
            }
            Value::Function(func) => write!(f, "[Function: {}]", func.name()),
            Value::Promise(promise) => {
                if promise.is_pending() {
                    f.write_str("Promise { <pending> }")
                } else {
                    f.write_str("Promise { <settled> }")
                }
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Data(a), Value::Data(b)) => a == b,
            (Value::Style(a), Value::Style(b)) => Arc::ptr_eq(a, b),
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Namespace(a), Value::Namespace(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Value::Promise(a), Value::Promise(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Namespace> for Value {
    fn from(ns: Namespace) -> Self {
        Value::Namespace(ns)
    }
}

impl From<ImportPromise> for Value {
    fn from(promise: ImportPromise) -> Self {
        Value::Promise(promise)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_display() {
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::from(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_structured_data_members() {
        let data = Value::from_json(&json!({"name": "modlink", "tags": ["a", "b"], "n": 3}));

        assert_eq!(data.member("name").unwrap(), Value::from("modlink"));
        assert_eq!(data.member("n").unwrap(), Value::from(3));
        let tags = data.member("tags").unwrap();
        assert_eq!(tags.member("length").unwrap(), Value::from(2));
        assert_eq!(tags.member("1").unwrap(), Value::from("b"));
        assert_eq!(data.member("missing").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_structured_data_is_frozen() {
        let data = Value::from_json(&json!({"a": 1}));
        assert!(matches!(
            data.set_member("a", Value::from(2)),
            Err(ImmutabilityError::Frozen { kind: "structured data", .. })
        ));
    }

    #[test]
    fn test_call_native_and_non_function() {
        let add = Value::function("add", |args| {
            let sum = args.iter().filter_map(Value::as_number).sum::<f64>();
            Ok(Value::from(sum))
        });
        assert_eq!(add.call(&[Value::from(1), Value::from(2)]).unwrap(), Value::from(3));
        assert!(matches!(
            Value::from(1).call(&[]),
            Err(EvalError::NotCallable { .. })
        ));
    }

    #[test]
    fn test_member_of_undefined_fails() {
        assert!(Value::Undefined.member("x").is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::record([("a", Value::Null)]).is_truthy());
    }

    #[test]
    fn test_objects_share_writes() {
        let env = Value::object([("HOME", Value::from("/root"))]);
        let process = Value::record([("env", env.clone())]);

        env.set_member("MY_VAR", Value::from("set")).unwrap();
        let seen = process.member("env").unwrap();
        assert_eq!(seen, env);
        assert_eq!(seen.member("MY_VAR").unwrap(), Value::from("set"));
        assert_eq!(seen.member("missing").unwrap(), Value::Undefined);
        assert_eq!(env.to_string(), "{ HOME: '/root', MY_VAR: 'set' }");

        // Equal contents, different objects
        assert_ne!(Value::object([("a", Value::Null)]), Value::object([("a", Value::Null)]));
        assert!(process.set_member("env", Value::Null).is_err());
    }

    #[test]
    fn test_record_display() {
        let record = Value::record([("platform", Value::from("linux")), ("pid", Value::from(7))]);
        assert_eq!(record.to_string(), "{ pid: 7, platform: 'linux' }");
    }
}

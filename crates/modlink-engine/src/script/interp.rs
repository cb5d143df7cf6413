//! Tree-walking interpreter for scanned script bodies
//!
//! Module-level names live in a root environment. Functions capture the
//! environment they were created in, so a function body reads imports and
//! module locals at call time, not at definition time. Only the module record
//! owns the root; everything below it refers to it weakly.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Weak};

use super::context::ExecutionContext;
use super::ModuleBody;
use crate::console::Console;
use crate::error::EvalError;
use crate::module::{Attributes, CanonicalKey, ImportScope, Importer};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(Arc<str>),
    Member(Box<Expr>, Arc<str>),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    Object(Vec<(Arc<str>, Expr)>),
    Function(Arc<FunctionDef>),
    ImportMeta,
    /// `import(specifier, options)`
    DynamicImport(Box<Expr>, Option<Box<Expr>>),
}

#[derive(Debug, Clone)]
pub(crate) enum FunctionBody {
    Expr(Expr),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionDef {
    pub name: Option<Arc<str>>,
    pub params: Vec<Arc<str>>,
    pub body: FunctionBody,
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Declare {
        name: Arc<str>,
        init: Option<Expr>,
        constant: bool,
    },
    Function(Arc<FunctionDef>),
    ExportDefault(Expr),
    Expr(Expr),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Throw(Expr),
}

/// Executable part of a scanned script
#[derive(Debug, Default)]
pub(crate) struct Program {
    pub stmts: Vec<Stmt>,
    /// Module-level names; reading one before its declaration runs is a TDZ error
    pub declared: FxHashSet<Arc<str>>,
    /// Local name to the export names it fills
    pub aliases: FxHashMap<Arc<str>, Vec<Arc<str>>>,
}

/// [`ModuleBody`] that interprets a [`Program`]
#[derive(Debug, Clone)]
pub(crate) struct ScannedBody(pub Arc<Program>);

impl ModuleBody for ScannedBody {
    fn run(&self, cx: &mut ExecutionContext) -> Result<(), EvalError> {
        let program = self.0.clone();
        let module = Arc::new(ModuleEnv {
            module: cx.module().clone(),
            program: program.clone(),
            imports: cx.imports().clone(),
            globals: globals(cx.module(), cx.console(), cx.globals()),
            importer: cx.importer(),
            url: cx.url(),
        });
        let env = Env::root(module);
        cx.retain(env.clone());

        for stmt in &program.stmts {
            match stmt {
                Stmt::ExportDefault(expr) => {
                    let value = eval(&env, expr)?;
                    cx.export_default(value)?;
                }
                Stmt::Declare { name, .. } => {
                    exec(&env, stmt)?;
                    fill_exports(cx, &env, &program, name)?;
                }
                Stmt::Function(def) => {
                    exec(&env, stmt)?;
                    if let Some(name) = &def.name {
                        fill_exports(cx, &env, &program, name)?;
                    }
                }
                Stmt::Expr(_) | Stmt::Return(_) | Stmt::If { .. } | Stmt::Throw(_) => {
                    exec(&env, stmt)?;
                }
            }
        }
        Ok(())
    }
}

fn fill_exports(
    cx: &mut ExecutionContext,
    env: &Arc<Env>,
    program: &Program,
    local: &str,
) -> Result<(), EvalError> {
    if let Some(exported) = program.aliases.get(local) {
        let value = env.lookup(local)?;
        for name in exported {
            cx.export(name, value.clone())?;
        }
    }
    Ok(())
}

fn globals(
    module: &CanonicalKey,
    console: Arc<dyn Console>,
    host: &FxHashMap<Arc<str>, Value>,
) -> FxHashMap<Arc<str>, Value> {
    let log = {
        let module = module.clone();
        move |args: &[Value]| -> Result<Value, EvalError> {
            let line = args
                .iter()
                .map(|arg| arg.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            console.log(&module, &line);
            Ok(Value::Undefined)
        }
    };
    let log = Value::function("log", log);

    let mut globals = host.clone();
    globals.insert(
        Arc::from("console"),
        Value::record([
            ("log", log.clone()),
            ("info", log.clone()),
            ("warn", log.clone()),
            ("error", log),
        ]),
    );
    globals.insert(
        Arc::from("Error"),
        Value::function("Error", |args| {
            let message = match args.first() {
                None | Some(Value::Undefined) => String::new(),
                Some(message) => message.to_string(),
            };
            Ok(Value::record([
                ("name", Value::from("Error")),
                ("message", Value::from(message)),
            ]))
        }),
    );
    globals.insert(Arc::from("undefined"), Value::Undefined);
    globals.insert(Arc::from("NaN"), Value::Number(f64::NAN));
    globals
}

struct ModuleEnv {
    module: CanonicalKey,
    program: Arc<Program>,
    imports: ImportScope,
    globals: FxHashMap<Arc<str>, Value>,
    importer: Importer,
    url: String,
}

impl ModuleEnv {
    fn thrown(&self, message: String) -> EvalError {
        EvalError::Thrown {
            module: self.module.clone(),
            message,
        }
    }
}

#[derive(Clone)]
struct Slot {
    value: Value,
    constant: bool,
}

/// Link to an enclosing environment
#[derive(Clone)]
enum Scope {
    Module(Weak<Env>),
    Frame(Arc<Env>),
}

impl Scope {
    fn of(env: &Arc<Env>) -> Scope {
        if env.parent.is_none() {
            Scope::Module(Arc::downgrade(env))
        } else {
            Scope::Frame(env.clone())
        }
    }

    fn upgrade(&self) -> Option<Arc<Env>> {
        match self {
            Scope::Module(env) => env.upgrade(),
            Scope::Frame(env) => Some(env.clone()),
        }
    }
}

struct Env {
    vars: RwLock<FxHashMap<Arc<str>, Slot>>,
    parent: Option<Scope>,
    module: Arc<ModuleEnv>,
}

impl Env {
    fn root(module: Arc<ModuleEnv>) -> Arc<Env> {
        Arc::new(Env {
            vars: RwLock::new(FxHashMap::default()),
            parent: None,
            module,
        })
    }

    fn child(parent: &Arc<Env>) -> Arc<Env> {
        Arc::new(Env {
            vars: RwLock::new(FxHashMap::default()),
            parent: Some(Scope::of(parent)),
            module: parent.module.clone(),
        })
    }

    fn define(&self, name: &Arc<str>, value: Value, constant: bool) {
        self.vars
            .write()
            .insert(name.clone(), Slot { value, constant });
    }

    fn enclosing(&self) -> Option<Arc<Env>> {
        self.parent.as_ref().and_then(Scope::upgrade)
    }

    fn lookup(self: &Arc<Self>, name: &str) -> Result<Value, EvalError> {
        let mut env = Some(self.clone());
        while let Some(current) = env {
            if let Some(slot) = current.vars.read().get(name) {
                return Ok(slot.value.clone());
            }
            env = current.enclosing();
        }

        let module = &self.module;
        if module.program.declared.contains(name) {
            return Err(EvalError::UninitializedBinding {
                module: module.module.clone(),
                name: name.to_string(),
            });
        }
        if let Some(binding) = module.imports.get(name) {
            return binding.read();
        }
        if let Some(value) = module.globals.get(name) {
            return Ok(value.clone());
        }
        Err(EvalError::UnknownBinding {
            module: module.module.clone(),
            name: name.to_string(),
        })
    }

    fn assign(self: &Arc<Self>, name: &str, value: Value) -> Result<(), EvalError> {
        let module = &self.module;
        let mut env = Some(self.clone());
        while let Some(current) = env {
            let mut vars = current.vars.write();
            if let Some(slot) = vars.get_mut(name) {
                if slot.constant {
                    return Err(module.thrown(format!("Assignment to constant variable '{}'", name)));
                }
                // Export cells fill once; the module-level local backs one
                if current.parent.is_none() && module.program.aliases.contains_key(name) {
                    return Err(EvalError::AlreadyInitialized {
                        module: module.module.clone(),
                        name: name.to_string(),
                    });
                }
                slot.value = value;
                return Ok(());
            }
            drop(vars);
            env = current.enclosing();
        }

        if module.program.declared.contains(name) {
            return Err(EvalError::UninitializedBinding {
                module: module.module.clone(),
                name: name.to_string(),
            });
        }
        if module.imports.contains(name) {
            return Err(module.thrown(format!("Assignment to imported binding '{}'", name)));
        }
        Err(EvalError::UnknownBinding {
            module: module.module.clone(),
            name: name.to_string(),
        })
    }
}

enum Flow {
    Normal,
    Return(Value),
}

fn exec(env: &Arc<Env>, stmt: &Stmt) -> Result<Flow, EvalError> {
    match stmt {
        Stmt::Declare {
            name,
            init,
            constant,
        } => {
            let value = match init {
                Some(expr) => eval(env, expr)?,
                None => Value::Undefined,
            };
            env.define(name, value, *constant);
        }
        Stmt::Function(def) => {
            if let Some(name) = &def.name {
                env.define(name, make_function(env, def), false);
            }
        }
        Stmt::ExportDefault(expr) | Stmt::Expr(expr) => {
            eval(env, expr)?;
        }
        Stmt::Return(expr) => {
            let value = match expr {
                Some(expr) => eval(env, expr)?,
                None => Value::Undefined,
            };
            return Ok(Flow::Return(value));
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let branch = if eval(env, condition)?.is_truthy() {
                then_branch
            } else {
                else_branch
            };
            let scope = Env::child(env);
            for stmt in branch {
                if let Flow::Return(value) = exec(&scope, stmt)? {
                    return Ok(Flow::Return(value));
                }
            }
        }
        Stmt::Throw(expr) => {
            let value = eval(env, expr)?;
            return Err(env.module.thrown(thrown_message(&value)));
        }
    }
    Ok(Flow::Normal)
}

/// `Error: message` for error objects, the display text otherwise
fn thrown_message(value: &Value) -> String {
    match (value.member("name"), value.member("message")) {
        (Ok(Value::String(name)), Ok(Value::String(message))) => format!("{}: {}", name, message),
        _ => value.to_string(),
    }
}

fn make_function(env: &Arc<Env>, def: &Arc<FunctionDef>) -> Value {
    let scope = Scope::of(env);
    let def = def.clone();
    let name = def.name.as_deref().unwrap_or("anonymous").to_string();
    let function = name.clone();
    Value::function(&name, move |args| {
        let env = scope.upgrade().ok_or_else(|| EvalError::Native {
            function: function.clone(),
            message: "the defining module is no longer loaded".to_string(),
        })?;
        call_function(&env, &def, args)
    })
}

fn call_function(env: &Arc<Env>, def: &FunctionDef, args: &[Value]) -> Result<Value, EvalError> {
    let frame = Env::child(env);
    for (i, param) in def.params.iter().enumerate() {
        frame.define(param, args.get(i).cloned().unwrap_or_default(), false);
    }

    match &def.body {
        FunctionBody::Expr(expr) => eval(&frame, expr),
        FunctionBody::Block(stmts) => {
            for stmt in stmts {
                if let Flow::Return(value) = exec(&frame, stmt)? {
                    return Ok(value);
                }
            }
            Ok(Value::Undefined)
        }
    }
}

fn eval(env: &Arc<Env>, expr: &Expr) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => env.lookup(name),
        Expr::Member(object, name) => eval(env, object)?.member(name),
        Expr::Index(object, index) => {
            let object = eval(env, object)?;
            let index = eval(env, index)?;
            object.member(&index.to_string())
        }
        Expr::Call(callee, args) => {
            let callee = eval(env, callee)?;
            let args = args
                .iter()
                .map(|arg| eval(env, arg))
                .collect::<Result<Vec<_>, _>>()?;
            callee.call(&args)
        }
        Expr::Binary(op, left, right) => {
            let left = eval(env, left)?;
            let right = eval(env, right)?;
            Ok(binary(*op, &left, &right))
        }
        Expr::Neg(operand) => Ok(match eval(env, operand)? {
            Value::Number(n) => Value::Number(-n),
            _ => Value::Number(f64::NAN),
        }),
        Expr::Not(operand) => Ok(Value::Bool(!eval(env, operand)?.is_truthy())),
        Expr::Assign(target, value) => {
            let value = eval(env, value)?;
            match &**target {
                Expr::Ident(name) => env.assign(name, value.clone())?,
                Expr::Member(object, name) => eval(env, object)?
                    .set_member(name, value.clone())
                    .map_err(|e| env.module.thrown(e.to_string()))?,
                _ => return Err(env.module.thrown("Invalid assignment target".to_string())),
            }
            Ok(value)
        }
        Expr::Object(entries) => {
            let entries = entries
                .iter()
                .map(|(name, expr)| Ok((name.clone(), eval(env, expr)?)))
                .collect::<Result<Vec<_>, EvalError>>()?;
            Ok(Value::record(entries))
        }
        Expr::Function(def) => Ok(make_function(env, def)),
        Expr::ImportMeta => Ok(Value::record([(
            "url",
            Value::from(env.module.url.as_str()),
        )])),
        Expr::DynamicImport(specifier, options) => {
            let specifier = eval(env, specifier)?.to_string();
            let attributes = match options {
                Some(options) => import_attributes(&eval(env, options)?)
                    .map_err(|message| env.module.thrown(message))?,
                None => Attributes::new(),
            };
            Ok(Value::Promise(env.module.importer.import(&specifier, attributes)))
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match (op, left, right) {
        (BinaryOp::Add, Value::Number(a), Value::Number(b)) => Value::Number(a + b),
        (BinaryOp::Add, Value::String(_), _) | (BinaryOp::Add, _, Value::String(_)) => {
            Value::from(format!("{}{}", left, right))
        }
        (BinaryOp::Sub, Value::Number(a), Value::Number(b)) => Value::Number(a - b),
        _ => Value::Number(f64::NAN),
    }
}

/// Attributes from the `import()` options bag: `{ with: { type: "json" } }`
fn import_attributes(options: &Value) -> Result<Attributes, String> {
    let entries = match options {
        Value::Undefined => return Ok(Attributes::new()),
        Value::Record(options) => match options.get("with").or_else(|| options.get("assert")) {
            None => return Ok(Attributes::new()),
            Some(Value::Record(entries)) => entries.clone(),
            Some(other) => {
                return Err(format!(
                    "import() attributes must be an object, got {}",
                    other.type_name()
                ))
            }
        },
        other => {
            return Err(format!(
                "The second argument of import() must be an object, got {}",
                other.type_name()
            ))
        }
    };

    let mut attributes = Attributes::new();
    for (key, value) in entries.iter() {
        match value {
            Value::String(value) => attributes.insert(key, value),
            other => {
                return Err(format!(
                    "import attribute '{}' must be a string, got {}",
                    key,
                    other.type_name()
                ))
            }
        }
    }
    Ok(attributes)
}

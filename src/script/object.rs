//! Runtime objects bound in a namespace

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::builtins::Builtin;
use super::parser::Expr;
use super::value::Value;

/// Name → object mapping; the body of every namespace and module
pub type Scope = HashMap<String, Object>;

/// Shared, mutable module
pub type ModuleRef = Arc<RwLock<Module>>;

/// Anything a name can be bound to inside a worker
#[derive(Clone)]
pub enum Object {
    Data(Value),
    Module(ModuleRef),
    Function(Arc<Function>),
    Builtin(Builtin),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Data(v) => v.type_name(),
            Object::Module(_) => "module",
            Object::Function(_) => "function",
            Object::Builtin(_) => "builtin",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Object::Function(_) | Object::Builtin(_))
    }

    pub fn is_module(&self) -> bool {
        matches!(self, Object::Module(_))
    }

    /// Extract the datum, refusing references that cannot leave the worker
    pub fn into_value(self) -> Option<Value> {
        match self {
            Object::Data(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Object {
    fn from(v: Value) -> Self {
        Object::Data(v)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Data(v) => write!(f, "{:?}", v),
            Object::Module(m) => write!(f, "<module {}>", m.read().name),
            Object::Function(func) => write!(f, "<function {}>", func.name),
            Object::Builtin(b) => write!(f, "<builtin {}>", b.name()),
        }
    }
}

/// A module: an imported source unit or a builtin library
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub members: Scope,
}

impl Module {
    pub fn new_ref(name: impl Into<String>, members: Scope) -> ModuleRef {
        Arc::new(RwLock::new(Module {
            name: name.into(),
            members,
        }))
    }
}

/// A function defined with `fn`
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
    /// Module the function was defined in; names resolve there before globals
    pub home: Option<Weak<RwLock<Module>>>,
}

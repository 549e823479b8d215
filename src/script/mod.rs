//! Worker script language
//!
//! Everything a worker runs on behalf of a client (execute, evaluate,
//! volatile execution, installed units) is written in this small
//! expression language. Values, modules and functions live in a
//! [`Scope`]; only [`Value`]s cross the wire.

mod builtins;
mod interpreter;
mod lexer;
mod object;
mod parser;
mod value;

use thiserror::Error;

pub use builtins::{is_prime, sum_primes, Builtin};
pub use interpreter::{
    bind_path, resolve_path, unbind_path, Interpreter, ModuleLoader, NoModules, MAX_CALL_DEPTH,
    MAX_EVAL_DEPTH,
};
pub use object::{Function, Module, ModuleRef, Object, Scope};
pub use parser::{split_path, MAX_NESTING_DEPTH};
pub use value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    Syntax,
    Name,
    Type,
    Value,
    Arithmetic,
    Attribute,
    Lookup,
    Import,
    Recursion,
}

impl ScriptErrorKind {
    fn label(self) -> &'static str {
        match self {
            ScriptErrorKind::Syntax => "SyntaxError",
            ScriptErrorKind::Name => "NameError",
            ScriptErrorKind::Type => "TypeError",
            ScriptErrorKind::Value => "ValueError",
            ScriptErrorKind::Arithmetic => "ArithmeticError",
            ScriptErrorKind::Attribute => "AttributeError",
            ScriptErrorKind::Lookup => "LookupError",
            ScriptErrorKind::Import => "ImportError",
            ScriptErrorKind::Recursion => "RecursionError",
        }
    }
}

/// Failure while parsing or running a script
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.label())]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
}

impl ScriptError {
    fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Syntax, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Name, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Type, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Value, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Arithmetic, message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Attribute, message)
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Lookup, message)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Import, message)
    }

    pub fn recursion(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::Recursion, message)
    }
}

/// Parse without running; used to reject broken units before installing them
pub fn check(source: &str) -> Result<(), ScriptError> {
    parser::parse(source).map(|_| ())
}

impl From<ScriptError> for crate::error::Error {
    fn from(err: ScriptError) -> Self {
        crate::error::Error::Execution {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_kind() {
        let err = ScriptError::name("name 'x' is not defined");
        assert_eq!(err.to_string(), "NameError: name 'x' is not defined");
    }

    #[test]
    fn test_converts_to_execution_error() {
        let err: crate::error::Error = ScriptError::syntax("bad").into();
        assert!(matches!(err, crate::error::Error::Execution { .. }));
        assert!(err.to_string().contains("SyntaxError: bad"));
    }
}

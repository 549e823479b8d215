//! Tree-walking evaluator
//!
//! An [`Interpreter`] borrows the root scope of a namespace for the
//! duration of one program. Module bodies and function calls run in
//! their own frames; names resolve through locals, then the defining
//! module (or the root scope), then the builtins.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::builtins::{compare, math_module, Builtin};
use super::object::{Function, Module, ModuleRef, Object, Scope};
use super::parser::{parse, BinaryOp, Expr, Stmt, UnaryOp};
use super::value::Value;
use super::ScriptError;

/// Maximum nesting of user function calls
pub const MAX_CALL_DEPTH: usize = 128;

/// Maximum expression evaluation depth, summed across nested calls
pub const MAX_EVAL_DEPTH: usize = 512;

/// Source of importable units
pub trait ModuleLoader: Send + Sync {
    fn load_source(&self, name: &str) -> Option<String>;
}

/// Loader with nothing installed
pub struct NoModules;

impl ModuleLoader for NoModules {
    fn load_source(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Evaluation context: function locals plus the module the code belongs to
#[derive(Default)]
struct Frame {
    locals: Option<Scope>,
    module: Option<ModuleRef>,
}

pub struct Interpreter<'a> {
    globals: &'a mut Scope,
    loader: &'a dyn ModuleLoader,
    depth: usize,
    eval_depth: usize,
    importing: Vec<String>,
}

impl<'a> Interpreter<'a> {
    pub fn new(globals: &'a mut Scope, loader: &'a dyn ModuleLoader) -> Self {
        Self {
            globals,
            loader,
            depth: 0,
            eval_depth: 0,
            importing: Vec::new(),
        }
    }

    /// Run a program against the root scope.
    ///
    /// Returns the value of the final statement when it is an expression,
    /// `nil` otherwise.
    pub fn run(&mut self, source: &str) -> Result<Object, ScriptError> {
        let program = parse(source)?;
        self.exec_block(&program, &Frame::default())
    }

    /// (Re)load a unit or library and bind it at the root under `name`
    pub fn import(&mut self, name: &str) -> Result<ModuleRef, ScriptError> {
        let module = self.load_module(name)?;
        self.globals
            .insert(name.to_string(), Object::Module(module.clone()));
        Ok(module)
    }

    fn exec_block(&mut self, program: &[Stmt], frame: &Frame) -> Result<Object, ScriptError> {
        let mut last = Object::Data(Value::Nil);
        for stmt in program {
            last = self.exec(stmt, frame)?;
        }
        Ok(last)
    }

    fn exec(&mut self, stmt: &Stmt, frame: &Frame) -> Result<Object, ScriptError> {
        match stmt {
            Stmt::Expr(expr) => return self.eval(expr, frame),
            Stmt::Assign(path, expr) => {
                let value = self.eval(expr, frame)?;
                self.bind(frame, path, value)?;
            }
            Stmt::Delete(path) => match &frame.module {
                Some(module) => self.unbind_in_module(module, path)?,
                None => unbind_path(self.globals, path)?,
            },
            Stmt::Import(name) => {
                let module = self.load_module(name)?;
                self.bind(frame, &[name.clone()], Object::Module(module))?;
            }
            Stmt::Function { name, params, body } => {
                let function = Function {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    home: frame.module.as_ref().map(Arc::downgrade),
                };
                self.bind(frame, &[name.clone()], Object::Function(Arc::new(function)))?;
            }
        }
        Ok(Object::Data(Value::Nil))
    }

    fn bind(&mut self, frame: &Frame, path: &[String], object: Object) -> Result<(), ScriptError> {
        let module = match &frame.module {
            Some(module) => module,
            None => return bind_path(self.globals, path, object),
        };
        let (name, parents) = path
            .split_last()
            .ok_or_else(|| ScriptError::syntax("empty name"))?;
        let owner = if parents.is_empty() {
            module.clone()
        } else {
            owner_module(&module.read().members, parents)?
        };
        owner.write().members.insert(name.clone(), object);
        Ok(())
    }

    fn unbind_in_module(&mut self, module: &ModuleRef, path: &[String]) -> Result<(), ScriptError> {
        let (name, parents) = path
            .split_last()
            .ok_or_else(|| ScriptError::syntax("empty name"))?;
        let owner = if parents.is_empty() {
            module.clone()
        } else {
            owner_module(&module.read().members, parents)?
        };
        let removed = owner.write().members.remove(name);
        removed
            .map(|_| ())
            .ok_or_else(|| ScriptError::name(format!("name '{}' is not defined", path.join("."))))
    }

    fn load_module(&mut self, name: &str) -> Result<ModuleRef, ScriptError> {
        if name == "math" {
            return Ok(math_module());
        }
        let source = self
            .loader
            .load_source(name)
            .ok_or_else(|| ScriptError::import(format!("no module named '{}'", name)))?;
        if self.importing.iter().any(|n| n == name) {
            return Err(ScriptError::import(format!("circular import of '{}'", name)));
        }

        let program = parse(&source)?;
        let module = Module::new_ref(name, HashMap::new());
        let frame = Frame {
            locals: None,
            module: Some(module.clone()),
        };
        self.importing.push(name.to_string());
        let result = self.exec_block(&program, &frame);
        self.importing.pop();
        result?;
        Ok(module)
    }

    // ─────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr, frame: &Frame) -> Result<Object, ScriptError> {
        if self.eval_depth >= MAX_EVAL_DEPTH {
            return Err(ScriptError::recursion(format!(
                "maximum expression depth {} exceeded",
                MAX_EVAL_DEPTH
            )));
        }
        self.eval_depth += 1;
        let result = self.eval_expr(expr, frame);
        self.eval_depth -= 1;
        result
    }

    fn eval_expr(&mut self, expr: &Expr, frame: &Frame) -> Result<Object, ScriptError> {
        match expr {
            Expr::Literal(v) => Ok(Object::Data(v.clone())),
            Expr::Name(name) => self.lookup(name, frame),
            Expr::Attr(target, attr) => {
                let target = self.eval(target, frame)?;
                attribute(&target, attr)
            }
            Expr::Index(target, index) => {
                let target = self.eval_value(target, frame)?;
                let index = self.eval_value(index, frame)?;
                index_value(&target, &index).map(Object::Data)
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => {
                let callee = self.eval(callee, frame)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                let kwargs = kwargs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.eval(v, frame)?)))
                    .collect::<Result<Vec<_>, ScriptError>>()?;
                self.call(callee, args, kwargs)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval(operand, frame)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&operand)).into()),
                    UnaryOp::Neg => match data(operand, "unary -")? {
                        Value::Int(i) => i
                            .checked_neg()
                            .map(|i| Value::Int(i).into())
                            .ok_or_else(overflow),
                        Value::Float(f) => Ok(Value::Float(-f).into()),
                        other => Err(ScriptError::type_error(format!(
                            "bad operand type for unary -: '{}'",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                binary(*op, lhs, rhs)
            }
            Expr::And(lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                if truthy(&lhs) {
                    self.eval(rhs, frame)
                } else {
                    Ok(lhs)
                }
            }
            Expr::Or(lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                if truthy(&lhs) {
                    Ok(lhs)
                } else {
                    self.eval(rhs, frame)
                }
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond, frame)?;
                if truthy(&cond) {
                    self.eval(then, frame)
                } else {
                    self.eval(otherwise, frame)
                }
            }
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval_value(item, frame))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(items).into())
            }
            Expr::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval_value(key, frame)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(ScriptError::type_error(format!(
                                "map keys must be str, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, self.eval_value(value, frame)?);
                }
                Ok(Value::Map(map).into())
            }
        }
    }

    fn eval_value(&mut self, expr: &Expr, frame: &Frame) -> Result<Value, ScriptError> {
        let object = self.eval(expr, frame)?;
        data(object, "this expression")
    }

    fn lookup(&self, name: &str, frame: &Frame) -> Result<Object, ScriptError> {
        if let Some(found) = frame.locals.as_ref().and_then(|l| l.get(name)) {
            return Ok(found.clone());
        }
        let scoped = match &frame.module {
            Some(module) => module.read().members.get(name).cloned(),
            None => self.globals.get(name).cloned(),
        };
        if let Some(found) = scoped {
            return Ok(found);
        }
        Builtin::lookup(name)
            .map(Object::Builtin)
            .ok_or_else(|| ScriptError::name(format!("name '{}' is not defined", name)))
    }

    fn call(
        &mut self,
        callee: Object,
        args: Vec<Object>,
        kwargs: Vec<(String, Object)>,
    ) -> Result<Object, ScriptError> {
        match callee {
            Object::Builtin(builtin) => {
                if !kwargs.is_empty() {
                    return Err(ScriptError::type_error(format!(
                        "{}() takes no keyword arguments",
                        builtin.name()
                    )));
                }
                builtin.call(args, self.globals)
            }
            Object::Function(function) => self.call_function(&function, args, kwargs),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        function: &Function,
        args: Vec<Object>,
        kwargs: Vec<(String, Object)>,
    ) -> Result<Object, ScriptError> {
        if args.len() > function.params.len() {
            return Err(ScriptError::type_error(format!(
                "{}() takes {} argument(s) but {} were given",
                function.name,
                function.params.len(),
                args.len()
            )));
        }

        let mut locals: Scope = function.params.iter().cloned().zip(args).collect();
        for (key, value) in kwargs {
            if !function.params.contains(&key) {
                return Err(ScriptError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    function.name, key
                )));
            }
            if locals.insert(key.clone(), value).is_some() {
                return Err(ScriptError::type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    function.name, key
                )));
            }
        }
        if let Some(missing) = function.params.iter().find(|p| !locals.contains_key(*p)) {
            return Err(ScriptError::type_error(format!(
                "{}() missing argument '{}'",
                function.name, missing
            )));
        }

        let module = match &function.home {
            Some(weak) => Some(weak.upgrade().ok_or_else(|| {
                ScriptError::name(format!("module of {}() no longer exists", function.name))
            })?),
            None => None,
        };

        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::recursion(format!(
                "maximum call depth {} exceeded",
                MAX_CALL_DEPTH
            )));
        }
        self.depth += 1;
        let frame = Frame {
            locals: Some(locals),
            module,
        };
        let result = self.eval(&function.body, &frame);
        self.depth -= 1;
        result
    }
}

// ─────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────

/// Resolve a dotted path through nested modules
pub fn resolve_path(scope: &Scope, path: &[String]) -> Option<Object> {
    let (first, rest) = path.split_first()?;
    let mut current = scope.get(first)?.clone();
    for segment in rest {
        let next = match &current {
            Object::Module(module) => module.read().members.get(segment)?.clone(),
            _ => return None,
        };
        current = next;
    }
    Some(current)
}

/// Bind `object` at a dotted path; intermediate segments must be modules
pub fn bind_path(scope: &mut Scope, path: &[String], object: Object) -> Result<(), ScriptError> {
    let (name, parents) = path
        .split_last()
        .ok_or_else(|| ScriptError::syntax("empty name"))?;
    if parents.is_empty() {
        scope.insert(name.clone(), object);
    } else {
        owner_module(scope, parents)?
            .write()
            .members
            .insert(name.clone(), object);
    }
    Ok(())
}

/// Remove the binding at a dotted path
pub fn unbind_path(scope: &mut Scope, path: &[String]) -> Result<(), ScriptError> {
    let (name, parents) = path
        .split_last()
        .ok_or_else(|| ScriptError::syntax("empty name"))?;
    let removed = if parents.is_empty() {
        scope.remove(name)
    } else {
        owner_module(scope, parents)?.write().members.remove(name)
    };
    removed
        .map(|_| ())
        .ok_or_else(|| ScriptError::name(format!("name '{}' is not defined", path.join("."))))
}

/// Module that owns the last segment of a path; each lock is released before the next
fn owner_module(scope: &Scope, parents: &[String]) -> Result<ModuleRef, ScriptError> {
    let (first, rest) = parents
        .split_first()
        .ok_or_else(|| ScriptError::syntax("empty name"))?;
    let mut module = module_at(scope, first)?;
    for segment in rest {
        let next = module_at(&module.read().members, segment)?;
        module = next;
    }
    Ok(module)
}

fn module_at(scope: &Scope, name: &str) -> Result<ModuleRef, ScriptError> {
    match scope.get(name) {
        Some(Object::Module(module)) => Ok(module.clone()),
        Some(other) => Err(ScriptError::type_error(format!(
            "'{}' is a {}, not a module",
            name,
            other.type_name()
        ))),
        None => Err(ScriptError::name(format!("name '{}' is not defined", name))),
    }
}

// ─────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────

fn truthy(object: &Object) -> bool {
    match object {
        Object::Data(v) => v.is_truthy(),
        _ => true,
    }
}

fn data(object: Object, context: &str) -> Result<Value, ScriptError> {
    let type_name = object.type_name();
    object.into_value().ok_or_else(|| {
        ScriptError::type_error(format!("a {} cannot be used in {}", type_name, context))
    })
}

fn overflow() -> ScriptError {
    ScriptError::arithmetic("integer overflow")
}

fn attribute(target: &Object, attr: &str) -> Result<Object, ScriptError> {
    match target {
        Object::Module(module) => {
            let module = module.read();
            module.members.get(attr).cloned().ok_or_else(|| {
                ScriptError::attribute(format!("module '{}' has no member '{}'", module.name, attr))
            })
        }
        Object::Data(Value::Map(map)) => map
            .get(attr)
            .cloned()
            .map(Object::Data)
            .ok_or_else(|| ScriptError::lookup(format!("key '{}' not found", attr))),
        other => Err(ScriptError::attribute(format!(
            "'{}' object has no attribute '{}'",
            other.type_name(),
            attr
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ScriptError> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => position(*i, items.len())
            .map(|p| items[p].clone())
            .ok_or_else(|| ScriptError::lookup("list index out of range")),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            position(*i, chars.len())
                .map(|p| Value::Str(chars[p].to_string()))
                .ok_or_else(|| ScriptError::lookup("string index out of range"))
        }
        (Value::Map(map), Value::Str(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| ScriptError::lookup(format!("key '{}' not found", key))),
        _ => Err(ScriptError::type_error(format!(
            "{} cannot be indexed by {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

/// Negative indices count from the end
fn position(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn binary(op: BinaryOp, lhs: Object, rhs: Object) -> Result<Object, ScriptError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(objects_equal(&lhs, &rhs)).into()),
        BinaryOp::Ne => Ok(Value::Bool(!objects_equal(&lhs, &rhs)).into()),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&data(lhs, "a comparison")?, &data(rhs, "a comparison")?)?;
            let result = match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(Value::Bool(result).into())
        }
        _ => arithmetic(op, data(lhs, "arithmetic")?, data(rhs, "arithmetic")?).map(Object::Data),
    }
}

fn objects_equal(lhs: &Object, rhs: &Object) -> bool {
    match (lhs, rhs) {
        (Object::Data(a), Object::Data(b)) => values_equal(a, b),
        (Object::Module(a), Object::Module(b)) => Arc::ptr_eq(a, b),
        (Object::Function(a), Object::Function(b)) => Arc::ptr_eq(a, b),
        (Object::Builtin(a), Object::Builtin(b)) => a == b,
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        _ => a == b,
    }
}

/// Apply an arithmetic operator to two values
pub(crate) fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ScriptError> {
    match (op, lhs, rhs) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (BinaryOp::Add, Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
            Ok(Value::Str(s.repeat(repeat_count(n, s.len())?)))
        }
        (BinaryOp::Mul, Value::List(items), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::List(items)) => {
            let count = repeat_count(n, items.len())?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        (op, Value::Int(a), Value::Int(b)) => int_arithmetic(op, a, b),
        (op, a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => float_arithmetic(op, x, y),
            _ => Err(ScriptError::type_error(format!(
                "unsupported operand types for {}: '{}' and '{}'",
                symbol(op),
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn repeat_count(n: i64, unit: usize) -> Result<usize, ScriptError> {
    let count = n.max(0) as usize;
    if count.saturating_mul(unit.max(1)) > 10_000_000 {
        return Err(ScriptError::value_error("repetition result too large"));
    }
    Ok(count)
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, ScriptError> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => return float_arithmetic(op, a as f64, b as f64),
        BinaryOp::FloorDiv | BinaryOp::Mod => {
            if b == 0 {
                return Err(ScriptError::arithmetic("division by zero"));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            let r = a - q * b;
            // Round the quotient toward negative infinity
            let (q, r) = if r != 0 && ((r < 0) != (b < 0)) {
                (q - 1, r + b)
            } else {
                (q, r)
            };
            Some(if op == BinaryOp::FloorDiv { q } else { r })
        }
        _ => None,
    };
    result.map(Value::Int).ok_or_else(overflow)
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, ScriptError> {
    if matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod) && b == 0.0 {
        return Err(ScriptError::arithmetic("division by zero"));
    }
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        _ => {
            return Err(ScriptError::type_error(format!(
                "'{}' is not an arithmetic operator",
                symbol(op)
            )))
        }
    };
    Ok(Value::Float(result))
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;

    struct Units(RwLock<HashMap<String, String>>);

    impl ModuleLoader for Units {
        fn load_source(&self, name: &str) -> Option<String> {
            self.0.read().get(name).cloned()
        }
    }

    fn units(pairs: &[(&str, &str)]) -> Units {
        Units(RwLock::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    fn eval(source: &str) -> Result<Value, ScriptError> {
        let mut scope = Scope::new();
        let mut interp = Interpreter::new(&mut scope, &NoModules);
        interp.run(source).map(|o| o.into_value().unwrap_or_default())
    }

    #[test]
    fn test_arithmetic_semantics() {
        assert_eq!(eval("7 // 2").unwrap(), Value::Int(3));
        assert_eq!(eval("-7 // 2").unwrap(), Value::Int(-4));
        assert_eq!(eval("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(eval("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("'ab' * 2").unwrap(), Value::Str("abab".into()));
        assert!(eval("1 / 0").is_err());
        assert!(eval("9223372036854775807 + 1").is_err());
    }

    #[test]
    fn test_statements_persist_in_scope() {
        let mut scope = Scope::new();
        let mut interp = Interpreter::new(&mut scope, &NoModules);
        interp.run("x = 2; fn double(v) = v * 2; y = double(x)").unwrap();
        assert_eq!(scope.get("y").cloned().and_then(Object::into_value), Some(Value::Int(4)));
        assert!(scope.get("double").map(Object::is_callable).unwrap_or(false));
    }

    #[test]
    fn test_last_expression_is_result() {
        assert_eq!(eval("a = 1\na + 1").unwrap(), Value::Int(2));
        assert_eq!(eval("a = 1").unwrap(), Value::Nil);
    }

    #[test]
    fn test_recursion_and_depth_limit() {
        let src = "fn fact(n) = if n <= 1 then 1 else n * fact(n - 1)\nfact(10)";
        assert_eq!(eval(src).unwrap(), Value::Int(3628800));

        let err = eval("fn f(n) = f(n + 1)\nf(0)").unwrap_err();
        assert!(err.to_string().contains("call depth"));
    }

    #[test]
    fn test_deep_bodies_hit_expression_limit() {
        // 60 levels per call, so the expression limit trips before the call limit
        let body = format!("{}f(n + 1){}", "(0 + ".repeat(60), ")".repeat(60));
        let err = eval(&format!("fn f(n) = {}\nf(0)", body)).unwrap_err();
        assert!(err.to_string().contains("expression depth"), "{}", err);
    }

    #[test]
    fn test_import_unit_and_dotted_access() {
        let loader = units(&[("geo", "scale = 3\nfn area(w, h) = w * h * scale")]);
        let mut scope = Scope::new();
        let mut interp = Interpreter::new(&mut scope, &loader);
        interp.run("import geo\nimport math").unwrap();
        let v = interp.run("geo.area(2, h=5)").unwrap().into_value();
        assert_eq!(v, Some(Value::Int(30)));

        interp.run("geo.scale = 1").unwrap();
        assert_eq!(interp.run("geo.area(2, 5)").unwrap().into_value(), Some(Value::Int(10)));
        assert_eq!(interp.run("math.floor(2.7)").unwrap().into_value(), Some(Value::Float(2.0)));

        interp.run("del geo.scale").unwrap();
        assert!(interp.run("geo.area(1, 1)").is_err());
    }

    #[test]
    fn test_unknown_import_and_names() {
        assert!(eval("import nothing").unwrap_err().to_string().contains("no module"));
        assert!(eval("missing + 1").unwrap_err().to_string().contains("not defined"));
        assert!(eval("del missing").is_err());
    }

    #[test]
    fn test_builtins_from_scripts() {
        assert_eq!(eval("len([1, 2, 3])").unwrap(), Value::Int(3));
        assert_eq!(eval("sum(range(5))").unwrap(), Value::Int(10));
        assert_eq!(eval("callable(len)").unwrap(), Value::Bool(true));
        assert_eq!(eval("x = 1\ncallable(x)").unwrap(), Value::Bool(false));
        assert_eq!(eval("x = 1; y = 2; dir()").unwrap(), Value::from(vec!["x", "y"]));
        assert_eq!(eval("[1, 2, 3][-1]").unwrap(), Value::Int(3));
        assert_eq!(eval("{\"a\": 1}.a").unwrap(), Value::Int(1));
        assert!(eval("len(1, key=2)").is_err());
    }

    #[test]
    fn test_short_circuit() {
        assert_eq!(eval("false and missing").unwrap(), Value::Bool(false));
        assert_eq!(eval("0 or 'fallback'").unwrap(), Value::Str("fallback".into()));
    }

    #[test]
    fn test_path_helpers() {
        let loader = units(&[("m", "v = 1")]);
        let mut scope = Scope::new();
        Interpreter::new(&mut scope, &loader).run("import m").unwrap();

        let path = vec!["m".to_string(), "w".to_string()];
        bind_path(&mut scope, &path, Value::Int(5).into()).unwrap();
        let found = resolve_path(&scope, &path).and_then(Object::into_value);
        assert_eq!(found, Some(Value::Int(5)));

        unbind_path(&mut scope, &path).unwrap();
        assert!(resolve_path(&scope, &path).is_none());
        assert!(bind_path(&mut scope, &["nope".into(), "x".into()], Value::Nil.into()).is_err());
    }
}

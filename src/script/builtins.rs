//! Builtin functions and the `math` library module

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::info;

use super::object::{Module, ModuleRef, Object, Scope};
use super::value::Value;
use super::ScriptError;

/// Largest list `range` will build
const MAX_RANGE_LEN: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Str,
    Int,
    Float,
    Abs,
    Min,
    Max,
    Sum,
    Range,
    Callable,
    Dir,
    Keys,
    Type,
    IsPrime,
    SumPrimes,
    Clock,
    Sleep,
    Print,
    Sqrt,
    Floor,
    Ceil,
    Pow,
    Exp,
    Log,
    Sin,
    Cos,
}

const GLOBALS: &[Builtin] = &[
    Builtin::Len,
    Builtin::Str,
    Builtin::Int,
    Builtin::Float,
    Builtin::Abs,
    Builtin::Min,
    Builtin::Max,
    Builtin::Sum,
    Builtin::Range,
    Builtin::Callable,
    Builtin::Dir,
    Builtin::Keys,
    Builtin::Type,
    Builtin::IsPrime,
    Builtin::SumPrimes,
    Builtin::Clock,
    Builtin::Sleep,
    Builtin::Print,
];

const MATH: &[Builtin] = &[
    Builtin::Sqrt,
    Builtin::Floor,
    Builtin::Ceil,
    Builtin::Pow,
    Builtin::Exp,
    Builtin::Log,
    Builtin::Sin,
    Builtin::Cos,
];

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Range => "range",
            Builtin::Callable => "callable",
            Builtin::Dir => "dir",
            Builtin::Keys => "keys",
            Builtin::Type => "type",
            Builtin::IsPrime => "is_prime",
            Builtin::SumPrimes => "sum_primes",
            Builtin::Clock => "clock",
            Builtin::Sleep => "sleep",
            Builtin::Print => "print",
            Builtin::Sqrt => "sqrt",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
            Builtin::Pow => "pow",
            Builtin::Exp => "exp",
            Builtin::Log => "log",
            Builtin::Sin => "sin",
            Builtin::Cos => "cos",
        }
    }

    /// Resolve a global builtin by name
    pub fn lookup(name: &str) -> Option<Builtin> {
        GLOBALS.iter().copied().find(|b| b.name() == name)
    }

    pub fn call(self, args: Vec<Object>, globals: &Scope) -> Result<Object, ScriptError> {
        let name = self.name();
        match self {
            Builtin::Callable => {
                let [arg] = exact::<1, _>(name, args)?;
                Ok(Value::Bool(arg.is_callable()).into())
            }
            Builtin::Type => {
                let [arg] = exact::<1, _>(name, args)?;
                Ok(Value::Str(arg.type_name().to_string()).into())
            }
            Builtin::Dir => {
                let names: Vec<String> = match args.len() {
                    0 => sorted_names(globals),
                    1 => match &args[0] {
                        Object::Module(m) => sorted_names(&m.read().members),
                        Object::Data(Value::Map(map)) => map.keys().cloned().collect(),
                        other => {
                            return Err(ScriptError::type_error(format!(
                                "dir() of {} is not supported",
                                other.type_name()
                            )))
                        }
                    },
                    n => return Err(arity(name, "0 or 1", n)),
                };
                Ok(Value::from(names).into())
            }
            Builtin::Print => {
                let values = data_args(name, args)?;
                let line: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                info!(target: crate::logging::SCRIPT_TARGET, "{}", line.join(" "));
                Ok(Value::Nil.into())
            }
            _ => {
                let values = data_args(name, args)?;
                self.call_data(values).map(Object::Data)
            }
        }
    }

    fn call_data(self, args: Vec<Value>) -> Result<Value, ScriptError> {
        let name = self.name();
        match self {
            Builtin::Len => {
                let [arg] = exact::<1, _>(name, args)?;
                let len = match &arg {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(map) => map.len(),
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "object of type {} has no len()",
                            other.type_name()
                        )))
                    }
                };
                Ok(Value::Int(len as i64))
            }
            Builtin::Str => {
                let [arg] = exact::<1, _>(name, args)?;
                Ok(Value::Str(arg.to_string()))
            }
            Builtin::Int => {
                let [arg] = exact::<1, _>(name, args)?;
                match arg {
                    Value::Int(i) => Ok(Value::Int(i)),
                    Value::Bool(b) => Ok(Value::Int(b as i64)),
                    Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                    Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                        ScriptError::value_error(format!("invalid literal for int(): '{}'", s))
                    }),
                    other => Err(ScriptError::type_error(format!(
                        "int() argument must be a number or string, not {}",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Float => {
                let [arg] = exact::<1, _>(name, args)?;
                match arg {
                    Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                        ScriptError::value_error(format!("could not convert string to float: '{}'", s))
                    }),
                    other => number(name, &other).map(Value::Float),
                }
            }
            Builtin::Abs => {
                let [arg] = exact::<1, _>(name, args)?;
                match arg {
                    Value::Int(i) => i
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| ScriptError::value_error("integer overflow")),
                    other => number(name, &other).map(|f| Value::Float(f.abs())),
                }
            }
            Builtin::Min | Builtin::Max => {
                let items = match args.len() {
                    0 => return Err(arity(name, "at least 1", 0)),
                    1 => match args.into_iter().next() {
                        Some(Value::List(items)) => items,
                        other => other.into_iter().collect(),
                    },
                    _ => args,
                };
                let mut best: Option<Value> = None;
                for item in items {
                    best = Some(match best {
                        None => item,
                        Some(current) => {
                            let ord = compare(&item, &current)?;
                            let better = if self == Builtin::Min {
                                ord == Ordering::Less
                            } else {
                                ord == Ordering::Greater
                            };
                            if better {
                                item
                            } else {
                                current
                            }
                        }
                    });
                }
                best.ok_or_else(|| ScriptError::value_error(format!("{}() arg is an empty sequence", name)))
            }
            Builtin::Sum => {
                let [arg] = exact::<1, _>(name, args)?;
                let items = match arg {
                    Value::List(items) => items,
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "sum() expects a list, not {}",
                            other.type_name()
                        )))
                    }
                };
                let mut total = Value::Int(0);
                for item in items {
                    total = super::interpreter::arithmetic(super::parser::BinaryOp::Add, total, item)?;
                }
                Ok(total)
            }
            Builtin::Range => {
                let (start, stop) = match args.len() {
                    1 => (0, integer(name, &args[0])?),
                    2 => (integer(name, &args[0])?, integer(name, &args[1])?),
                    n => return Err(arity(name, "1 or 2", n)),
                };
                if stop.saturating_sub(start) > MAX_RANGE_LEN {
                    return Err(ScriptError::value_error("range() too large"));
                }
                Ok(Value::List((start..stop).map(Value::Int).collect()))
            }
            Builtin::Keys => {
                let [arg] = exact::<1, _>(name, args)?;
                match arg {
                    Value::Map(map) => Ok(Value::from(map.into_keys().collect::<Vec<_>>())),
                    other => Err(ScriptError::type_error(format!(
                        "keys() expects a map, not {}",
                        other.type_name()
                    ))),
                }
            }
            Builtin::IsPrime => {
                let [arg] = exact::<1, _>(name, args)?;
                Ok(Value::Bool(is_prime(integer(name, &arg)?)))
            }
            Builtin::SumPrimes => {
                let [arg] = exact::<1, _>(name, args)?;
                Ok(Value::Int(sum_primes(integer(name, &arg)?)))
            }
            Builtin::Clock => {
                exact::<0, _>(name, args)?;
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                Ok(Value::Float(now.as_secs_f64()))
            }
            Builtin::Sleep => {
                let [arg] = exact::<1, _>(name, args)?;
                let secs = number(name, &arg)?;
                if !(0.0..=3600.0).contains(&secs) {
                    return Err(ScriptError::value_error("sleep length must be within 0..3600 seconds"));
                }
                std::thread::sleep(Duration::from_secs_f64(secs));
                Ok(Value::Nil)
            }
            Builtin::Sqrt => unary_float(name, args, f64::sqrt),
            Builtin::Floor => unary_float(name, args, f64::floor),
            Builtin::Ceil => unary_float(name, args, f64::ceil),
            Builtin::Exp => unary_float(name, args, f64::exp),
            Builtin::Log => unary_float(name, args, f64::ln),
            Builtin::Sin => unary_float(name, args, f64::sin),
            Builtin::Cos => unary_float(name, args, f64::cos),
            Builtin::Pow => {
                let [base, exponent] = exact::<2, _>(name, args)?;
                Ok(Value::Float(number(name, &base)?.powf(number(name, &exponent)?)))
            }
            Builtin::Callable | Builtin::Type | Builtin::Dir | Builtin::Print => {
                Err(ScriptError::type_error(format!("{}() needs object arguments", name)))
            }
        }
    }
}

/// Build a fresh `math` module
pub fn math_module() -> ModuleRef {
    let mut members: Scope = HashMap::new();
    for builtin in MATH {
        members.insert(builtin.name().to_string(), Object::Builtin(*builtin));
    }
    members.insert("pi".to_string(), Value::Float(std::f64::consts::PI).into());
    members.insert("e".to_string(), Value::Float(std::f64::consts::E).into());
    Module::new_ref("math", members)
}

/// Primality by trial division
pub fn is_prime(n: i64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let limit = (n as f64).sqrt() as i64 + 1;
    let mut i = 3;
    while i <= limit {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Sum of all primes below `n`; the benchmark workload
pub fn sum_primes(n: i64) -> i64 {
    (2..n.max(2)).filter(|x| is_prime(*x)).sum()
}

fn sorted_names(scope: &Scope) -> Vec<String> {
    let mut names: Vec<String> = scope.keys().cloned().collect();
    names.sort();
    names
}

fn data_args(name: &str, args: Vec<Object>) -> Result<Vec<Value>, ScriptError> {
    args.into_iter()
        .map(|arg| match arg {
            Object::Data(v) => Ok(v),
            other => Err(ScriptError::type_error(format!(
                "{}() does not accept a {}",
                name,
                other.type_name()
            ))),
        })
        .collect()
}

fn exact<const N: usize, T>(name: &str, args: Vec<T>) -> Result<[T; N], ScriptError> {
    let len = args.len();
    args.try_into()
        .map_err(|_| arity(name, &N.to_string(), len))
}

fn arity(name: &str, expected: &str, got: usize) -> ScriptError {
    ScriptError::type_error(format!(
        "{}() takes {} argument(s) but {} were given",
        name, expected, got
    ))
}

fn number(name: &str, v: &Value) -> Result<f64, ScriptError> {
    v.as_f64().ok_or_else(|| {
        ScriptError::type_error(format!("{}() expects a number, not {}", name, v.type_name()))
    })
}

fn integer(name: &str, v: &Value) -> Result<i64, ScriptError> {
    v.as_i64().ok_or_else(|| {
        ScriptError::type_error(format!("{}() expects an int, not {}", name, v.type_name()))
    })
}

fn unary_float(name: &str, args: Vec<Value>, f: fn(f64) -> f64) -> Result<Value, ScriptError> {
    let [arg] = exact::<1, _>(name, args)?;
    Ok(Value::Float(f(number(name, &arg)?)))
}

pub(crate) fn compare(a: &Value, b: &Value) -> Result<Ordering, ScriptError> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                ScriptError::value_error("cannot order NaN")
            }),
            _ => Err(ScriptError::type_error(format!(
                "'<' not supported between {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

//! Namespace store
//!
//! The persistent name → object mapping of one worker plus its installed
//! source units. All methods are synchronous; the engine calls them from
//! blocking tasks while holding the worker lock where required.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::script::{
    bind_path, check, resolve_path, split_path, Interpreter, ModuleLoader, Object, Scope, Value,
};

// ─────────────────────────────────────────────────────────────────
// Source Units
// ─────────────────────────────────────────────────────────────────

/// Installed source units, importable by name
#[derive(Clone, Default)]
pub struct SourceUnits {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl SourceUnits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a unit, replacing any previous source with that name
    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        self.inner.write().insert(name.into(), source.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl ModuleLoader for SourceUnits {
    fn load_source(&self, name: &str) -> Option<String> {
        self.inner.read().get(name).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────
// Namespace Store
// ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct NamespaceStore {
    globals: Scope,
    units: SourceUnits,
}

impl NamespaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the installed units, shareable with volatile runs
    pub fn units(&self) -> SourceUnits {
        self.units.clone()
    }

    /// Fetch the value bound to a (possibly dotted) name
    pub fn get(&self, name: &str) -> Result<Value> {
        let path = split_path(name).map_err(|_| Error::name_not_found(name))?;
        let object = resolve_path(&self.globals, &path).ok_or_else(|| Error::name_not_found(name))?;
        transferable(name, object)
    }

    /// Fetch several names; fails on the first missing one
    pub fn get_many(&self, names: &[String]) -> Result<BTreeMap<String, Value>> {
        names
            .iter()
            .map(|name| Ok((name.clone(), self.get(name)?)))
            .collect()
    }

    /// Bind a value, overwriting silently
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let path = split_path(name).map_err(|e| Error::operation(e.message))?;
        bind_path(&mut self.globals, &path, Object::Data(value))
            .map_err(|e| Error::operation(e.to_string()))
    }

    pub fn set_many(&mut self, bindings: BTreeMap<String, Value>) -> Result<()> {
        for (name, value) in bindings {
            self.set(&name, value)?;
        }
        Ok(())
    }

    /// Sorted snapshot of the root names
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&mut self) {
        debug!(names = self.globals.len(), "Clearing namespace");
        self.globals.clear();
    }

    /// Run a fragment; its mutations persist even if a later statement fails
    pub fn execute(&mut self, code: &str) -> Result<()> {
        let mut interp = Interpreter::new(&mut self.globals, &self.units);
        interp.run(code)?;
        Ok(())
    }

    /// Run a fragment and return the value of its final expression
    pub fn evaluate(&mut self, code: &str) -> Result<Value> {
        let mut interp = Interpreter::new(&mut self.globals, &self.units);
        let result = interp.run(code)?;
        transferable("<expression>", result)
    }

    /// Install a source unit, reloading it if it is already imported
    pub fn install(&mut self, name: &str, source: &str) -> Result<()> {
        let path = split_path(name).map_err(|e| Error::operation(e.message))?;
        if path.len() != 1 {
            return Err(Error::operation(format!(
                "unit name '{}' must not contain dots",
                name
            )));
        }
        check(source)?;

        self.units.insert(name, source);
        debug!(unit = %name, "Source unit installed");

        if matches!(self.globals.get(name), Some(Object::Module(_))) {
            debug!(unit = %name, "Reloading imported unit");
            self.import(name)?;
        }
        Ok(())
    }

    /// Import a unit (or `math`) and bind it at the root
    pub fn import(&mut self, name: &str) -> Result<()> {
        let mut interp = Interpreter::new(&mut self.globals, &self.units);
        interp.import(name)?;
        Ok(())
    }

    /// Whether `name` resolves to a module
    pub fn is_module_reference(&self, name: &str) -> bool {
        split_path(name)
            .ok()
            .and_then(|path| resolve_path(&self.globals, &path))
            .map(|object| object.is_module())
            .unwrap_or(false)
    }
}

/// Run `code` in a private namespace seeded only with `bindings`.
///
/// Returns the requested `outputs`; a missing one is `NameNotFound`.
pub fn volatile_execute(
    units: &SourceUnits,
    code: &str,
    bindings: BTreeMap<String, Value>,
    outputs: &[String],
) -> Result<BTreeMap<String, Value>> {
    let mut scope: Scope = bindings
        .into_iter()
        .map(|(name, value)| (name, Object::Data(value)))
        .collect();
    Interpreter::new(&mut scope, units).run(code)?;

    outputs
        .iter()
        .map(|name| {
            let object = scope
                .get(name)
                .cloned()
                .ok_or_else(|| Error::name_not_found(name))?;
            Ok((name.clone(), transferable(name, object)?))
        })
        .collect()
}

fn transferable(name: &str, object: Object) -> Result<Value> {
    let type_name = object.type_name();
    object.into_value().ok_or_else(|| {
        Error::operation(format!(
            "'{}' is a {} and cannot be transferred",
            name, type_name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_list_clear() {
        let mut store = NamespaceStore::new();
        store.set("b", Value::Int(2)).unwrap();
        store.set("a", Value::Str("x".into())).unwrap();
        store.set("a", Value::Int(1)).unwrap();

        assert_eq!(store.get("a").unwrap(), Value::Int(1));
        assert_eq!(store.list(), vec!["a", "b"]);

        store.clear();
        assert!(store.list().is_empty());
        assert!(matches!(store.get("a"), Err(Error::NameNotFound { .. })));
    }

    #[test]
    fn test_execute_persists_and_reports_errors() {
        let mut store = NamespaceStore::new();
        store.execute("x = 40; y = x + 2").unwrap();
        assert_eq!(store.get("y").unwrap(), Value::Int(42));

        let err = store.execute("z = 1; boom()").unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert!(err.to_string().contains("boom"));
        // statements before the failure stay applied
        assert_eq!(store.get("z").unwrap(), Value::Int(1));
    }

    #[test]
    fn test_deep_nesting_is_an_execution_error() {
        let mut store = NamespaceStore::new();
        store.set("kept", Value::Int(5)).unwrap();

        let parens = format!("x = {}1{}", "(".repeat(2_000), ")".repeat(2_000));
        let err = store.execute(&parens).unwrap_err();
        assert!(matches!(err, Error::Execution { .. }));
        assert!(err.to_string().contains("nested too deeply"));

        let chain = format!("x = 1{}", "+1".repeat(300_000));
        assert!(matches!(store.execute(&chain), Err(Error::Execution { .. })));

        assert!(matches!(store.get("x"), Err(Error::NameNotFound { .. })));
        assert_eq!(store.evaluate("kept + 1").unwrap(), Value::Int(6));
    }

    #[test]
    fn test_evaluate_refuses_functions() {
        let mut store = NamespaceStore::new();
        assert_eq!(store.evaluate("if false then 1 else 3").unwrap(), Value::Int(3));
        assert_eq!(store.evaluate("[1, 2][0] + 1").unwrap(), Value::Int(2));
        assert!(matches!(store.evaluate("len"), Err(Error::Operation(_))));
    }

    #[test]
    fn test_get_module_member_and_module_refusal() {
        let mut store = NamespaceStore::new();
        store.install("tools", "base = 10\nfn add(a) = a + base").unwrap();
        store.import("tools").unwrap();

        assert!(store.is_module_reference("tools"));
        assert!(!store.is_module_reference("tools.base"));
        assert!(!store.is_module_reference("missing"));
        assert_eq!(store.get("tools.base").unwrap(), Value::Int(10));
        assert!(matches!(store.get("tools"), Err(Error::Operation(_))));
        assert!(matches!(store.get("tools.add"), Err(Error::Operation(_))));

        store.set("tools.base", Value::Int(1)).unwrap();
        assert_eq!(store.evaluate("tools.add(1)").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_install_reloads_bound_module() {
        let mut store = NamespaceStore::new();
        store.install("cfg", "level = 1").unwrap();
        store.import("cfg").unwrap();
        store.install("cfg", "level = 2").unwrap();
        assert_eq!(store.get("cfg.level").unwrap(), Value::Int(2));

        assert!(store.install("broken", "x = (").is_err());
        assert!(!store.units().contains("broken"));
    }

    #[test]
    fn test_volatile_execute_is_private() {
        let mut store = NamespaceStore::new();
        store.set("keep", Value::Int(1)).unwrap();

        let mut bindings = BTreeMap::new();
        bindings.insert("n".to_string(), Value::Int(10));
        let out = volatile_execute(
            &store.units(),
            "total = sum_primes(n)",
            bindings,
            &["total".to_string()],
        )
        .unwrap();
        assert_eq!(out["total"], Value::Int(17));
        assert_eq!(store.list(), vec!["keep"]);

        let missing = volatile_execute(&store.units(), "a = 1", BTreeMap::new(), &["b".to_string()]);
        assert!(matches!(missing, Err(Error::NameNotFound { .. })));

        let no_globals = volatile_execute(&store.units(), "x = keep", BTreeMap::new(), &[]);
        assert!(matches!(no_globals, Err(Error::Execution { .. })));
    }
}

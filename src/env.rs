//! The variable environment.
//!
//! A mapping from identifier to host [`Value`], consulted by the compiler
//! for static types and by the evaluator for values and assignment
//! destinations. The same environment must be passed to both phases and
//! outlive them.

use rustc_hash::FxHashMap;

use crate::types::DataType;
use crate::value::{HostFn, Value};

/// Name → value bindings shared between compile and run.
///
/// Assignment through a `VarPlace` replaces the binding (creating it if
/// absent). If an environment is shared across threads the caller must
/// serialize access externally.
#[derive(Default, Clone, Debug)]
pub struct Environment {
    values: FxHashMap<String, Value>,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look up a binding.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The static type of a binding, if present.
    pub fn type_of(&self, name: &str) -> Option<DataType> {
        self.values.get(name).map(Value::data_type)
    }

    /// Bind a host function under `name`.
    ///
    /// ```
    /// use liveexpr::{DataType, Environment, Value};
    ///
    /// let mut env = Environment::new();
    /// env.define_fn("abs", vec![DataType::Int], DataType::Int, |args| {
    ///     match &args[0] {
    ///         Value::Int(v) => Ok(Value::Int(v.abs())),
    ///         _ => Err("abs expects int".to_string()),
    ///     }
    /// });
    /// ```
    pub fn define_fn<F>(&mut self, name: &str, params: Vec<DataType>, ret: DataType, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + 'static,
    {
        let value = Value::Function(HostFn::new(name, params, ret, func));
        self.values.insert(name.to_string(), value);
    }
}

/// Variable environment.
///
/// The engine treats the environment as an opaque capability: `get` a value
/// by name, `set` a value by name. It outlives each execution call and is
/// freshly installed per call; the VM retains nothing from it afterwards.
/// The default implementation is a keyed mapping, and the VM carries a
/// direct-access fast path for plain `HashMap` environments that bypasses
/// the trait object entirely.

use std::collections::HashMap;

use crate::errors::RuntimeError;
use crate::value::Value;

pub trait Environment {
    /// Look up a variable. `None` means absent — the VM reads that as Nil.
    fn get(&self, name: &str) -> Option<Value>;

    /// Insert or replace a variable.
    fn set(&mut self, name: &str, value: Value) -> Result<(), RuntimeError>;
}

/// Default environment: a keyed mapping. `set` is total.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, Value>,
}

impl MapEnv {
    pub fn new() -> Self {
        MapEnv::default()
    }

    pub fn with_vars(vars: HashMap<String, Value>) -> Self {
        MapEnv { vars }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }

    pub fn into_vars(self) -> HashMap<String, Value> {
        self.vars
    }
}

impl Environment for MapEnv {
    fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.vars.insert(name.to_string(), value);
        Ok(())
    }
}

impl Environment for HashMap<String, Value> {
    fn get(&self, name: &str) -> Option<Value> {
        HashMap::get(self, name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.insert(name.to_string(), value);
        Ok(())
    }
}

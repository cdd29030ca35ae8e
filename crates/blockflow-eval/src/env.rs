//! Variable environments.
//!
//! [`Environment`] is the plain per-run map used by the explorer.
//! [`SharedEnvironment`] is the handle live threads share: each read or
//! write takes the lock on its own, so a step that reads two variables can
//! observe another thread's write in between. That is a deliberate logical
//! data race. It models the user program's lack of synchronization and is
//! exactly the nondeterminism the explorer characterizes.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::block::Variable;
use crate::error::Error;
use crate::value::Value;

/// Read/write access to the variables of one run.
pub trait Scope {
    /// Current value of `name`, if declared.
    fn get(&self, name: &str) -> Option<Value>;

    /// Overwrite a declared variable.
    fn set(&mut self, name: &str, value: Value) -> Result<(), Error>;

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Variable name to current value for a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    values: BTreeMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every declared variable set to its type's default.
    pub fn from_variables(variables: &[Variable]) -> Self {
        let values = variables
            .iter()
            .map(|v| (v.name.clone(), v.data_type.default_value()))
            .collect();
        Self { values }
    }

    /// Declare (or redeclare) a variable with an initial value.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Scope for Environment {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), Error> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::UndeclaredVariable(name.to_string())),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// A cloneable handle to one environment shared by every live thread.
#[derive(Debug, Clone, Default)]
pub struct SharedEnvironment {
    inner: Arc<RwLock<Environment>>,
}

impl SharedEnvironment {
    pub fn new(env: Environment) -> Self {
        Self {
            inner: Arc::new(RwLock::new(env)),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Environment {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Scope for SharedEnvironment {
    fn get(&self, name: &str) -> Option<Value> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    #[test]
    fn test_defaults_from_variables() {
        let env = Environment::from_variables(&[
            Variable::new("n", DataType::Int),
            Variable::new("s", DataType::String),
        ]);
        assert_eq!(env.get("n"), Some(Value::Int(0)));
        assert_eq!(env.get("s"), Some(Value::Str(String::new())));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_set_undeclared_fails() {
        let mut env = Environment::new();
        let err = env.set("ghost", Value::Int(1)).unwrap_err();
        assert_eq!(err, Error::UndeclaredVariable("ghost".into()));
    }

    #[test]
    fn test_shared_handles_see_each_other() {
        let mut env = Environment::new();
        env.declare("x", Value::Int(0));
        let a = SharedEnvironment::new(env);
        let mut b = a.clone();

        b.set("x", Value::Int(9)).unwrap();
        assert_eq!(a.get("x"), Some(Value::Int(9)));
        assert_eq!(a.snapshot().get("x"), Some(Value::Int(9)));
    }
}

//! The context map threaded through one transaction operation.
//!
//! A [`Context`] carries values that several records must agree on: a freshly
//! allocated identifier, a timestamp, or a per-row counter. Fields declare the
//! context key they use and read it through [`crate::Field::get_context`].

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::value::Value;

/// A typed key/value map plus the name and version of the transaction that
/// built it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    name: Option<String>,
    version: Option<String>,
    values: BTreeMap<String, Value>,
}

impl Context {
    /// Create an empty, anonymous context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty context for the named transaction.
    pub fn for_transaction(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: Some(name.into()),
            version,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style [`Context::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Name of the transaction that built this context.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Declared version of the transaction that built this context.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
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

    /// Copy every entry of `other` into this context, replacing existing keys.
    pub fn extend(&mut self, other: Context) {
        self.values.extend(other.values);
    }

    /// Advance the counter stored under `key` and return the new value. A
    /// missing counter starts at `start`.
    pub fn next_counter(&mut self, key: &str, start: i64) -> Result<i64> {
        let next = match self.values.get(key) {
            None => start,
            Some(current) => {
                current.as_i64().ok_or_else(|| Error::InvalidValue {
                    field: key.to_string(),
                    message: format!("counter holds non-integer value {current}"),
                })? + 1
            }
        };
        self.values.insert(key.to_string(), Value::BigInt(next));
        Ok(next)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut ctx = Context::new();
        for (k, v) in iter {
            ctx.set(k, v);
        }
        ctx
    }
}

//! Driver-neutral parameter descriptions.
//!
//! A `ParameterSet` is populated by callers before execution and is the only
//! place output values land after execution. It never talks to a driver itself.

use crate::models::value::{DbType, Value};
use serde::{Deserialize, Serialize};

/// Direction a parameter value flows in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    /// Return value of a stored procedure
    ReturnValue,
}

impl ParameterDirection {
    /// True for every direction whose value can be written back by the driver.
    pub fn is_directional(&self) -> bool {
        !matches!(self, Self::Input)
    }
}

/// Description of a single bound value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Should include any prefix ("@", ":") the backend expects
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub db_type: DbType,
    #[serde(default)]
    pub direction: ParameterDirection,
}

impl ParameterSpec {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<Value>,
        db_type: DbType,
        direction: ParameterDirection,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            db_type,
            direction,
        }
    }

    /// Input parameter whose type tag is inferred from the value.
    pub fn input(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let db_type = DbType::infer(&value);
        Self::new(name, value, db_type, ParameterDirection::Input)
    }

    /// Output parameter, null until the driver fills it.
    pub fn output(name: impl Into<String>, db_type: DbType) -> Self {
        Self::new(name, Value::Null, db_type, ParameterDirection::Output)
    }

    pub fn input_output(name: impl Into<String>, value: impl Into<Value>, db_type: DbType) -> Self {
        Self::new(name, value, db_type, ParameterDirection::InputOutput)
    }

    pub fn return_value(name: impl Into<String>, db_type: DbType) -> Self {
        Self::new(name, Value::Null, db_type, ParameterDirection::ReturnValue)
    }
}

/// Ordered, name-addressable collection of parameters.
///
/// Duplicate names are allowed in the collection and lookups return the first
/// match, but executing a command rejects repeated non-empty names. Empty
/// names are positional and may repeat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    items: Vec<ParameterSpec>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter piece by piece. Returns `self` for chaining.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        db_type: DbType,
        direction: ParameterDirection,
    ) -> &mut Self {
        self.items
            .push(ParameterSpec::new(name, value, db_type, direction));
        self
    }

    /// Append a parameter.
    pub fn push(&mut self, spec: ParameterSpec) -> &mut Self {
        self.items.push(spec);
        self
    }

    /// Replace the first parameter with the same name, or append.
    pub fn set(&mut self, spec: ParameterSpec) {
        match self.position(&spec.name) {
            Some(idx) => self.items[idx] = spec,
            None => self.items.push(spec),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.items.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ParameterSpec> {
        self.items.iter_mut().find(|p| p.name == name)
    }

    /// Value of the first parameter with this name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(|p| &p.value)
    }

    /// Remove the first parameter with this name.
    pub fn remove(&mut self, name: &str) -> Option<ParameterSpec> {
        self.position(name).map(|idx| self.items.remove(idx))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterSpec> {
        self.items.iter()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|p| p.name == name)
    }
}

impl std::ops::Index<usize> for ParameterSet {
    type Output = ParameterSpec;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a ParameterSpec;
    type IntoIter = std::slice::Iter<'a, ParameterSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<ParameterSpec> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = ParameterSpec>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

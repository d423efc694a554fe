//! Tabular results.
//!
//! A `RowSet` is the rectangular grid a bulk-fetch adapter produces. `Record`
//! and `RowMapper` are the two ways callers turn rows into something typed.

use crate::models::value::{DbType, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub db_type: DbType,
}

impl Column {
    pub fn new(name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            db_type,
        }
    }
}

/// One tabular result: named columns and rows of cells in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing trailing cells are filled with null, extra cells dropped.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Rows as ordered column-name to value records.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let fields = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| (col.name.clone(), value.clone()))
                    .collect();
                Record { fields }
            })
            .collect()
    }
}

/// Ordered mapping from column name to value for one row.
///
/// When a result has repeated column names the later column wins, at the
/// position of the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, Value>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert to a JSON object map, keeping column order.
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

type Setter<T> = Box<dyn Fn(&mut T, &Value) + Send + Sync>;

/// Explicit column-to-field mapping table.
///
/// ```ignore
/// let mapper = RowMapper::<User>::new()
///     .bind("id", |u, v| u.id = v.as_i64().unwrap_or_default())
///     .bind("name", |u, v| u.name = v.as_str().unwrap_or_default().to_string());
/// let users = command.retrieve_list(&mapper)?;
/// ```
pub struct RowMapper<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    bindings: Vec<(String, Setter<T>)>,
}

impl<T: Default + 'static> RowMapper<T> {
    pub fn new() -> Self {
        Self::with_factory(T::default)
    }
}

impl<T: Default + 'static> Default for RowMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RowMapper<T> {
    /// Mapper whose targets are built by `factory` instead of `Default`.
    pub fn with_factory(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            bindings: Vec::new(),
        }
    }

    /// Bind a column to a setter.
    pub fn bind(
        mut self,
        column: impl Into<String>,
        setter: impl Fn(&mut T, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.bindings.push((column.into(), Box::new(setter)));
        self
    }

    /// Map every row of a rowset.
    ///
    /// Columns without a binding are ignored; bindings whose column is missing
    /// leave the field as the factory built it.
    pub fn map(&self, rowset: &RowSet) -> Vec<T> {
        let resolved: Vec<(usize, &Setter<T>)> = self
            .bindings
            .iter()
            .filter_map(|(column, setter)| rowset.column_index(column).map(|idx| (idx, setter)))
            .collect();

        rowset
            .rows
            .iter()
            .map(|row| {
                let mut target = (self.factory)();
                for (idx, setter) in &resolved {
                    if let Some(value) = row.get(*idx) {
                        setter(&mut target, value);
                    }
                }
                target
            })
            .collect()
    }
}

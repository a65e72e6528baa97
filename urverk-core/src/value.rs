//! ## urverk-core::value
//! **Typed payload values**
//!
//! The closed sum carried by event attributes, conditions and observations.
//! Values compose recursively, deep-clone with `Clone`, and serialise with
//! `serde` for the scenario document and output plug-ins.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Discriminant of a [`Value`], used in error reporting and dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Integer,
    Double,
    String,
    Xml,
    Null,
    Tuple,
    Table,
    Set,
    Map,
    Matrix,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Double => "double",
            ValueKind::String => "string",
            ValueKind::Xml => "xml",
            ValueKind::Null => "null",
            ValueKind::Tuple => "tuple",
            ValueKind::Table => "table",
            ValueKind::Set => "set",
            ValueKind::Map => "map",
            ValueKind::Matrix => "matrix",
        };
        f.write_str(name)
    }
}

/// A fixed-length ordered vector of doubles.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tuple(pub Vec<f64>);

impl Tuple {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<f64, ValueError> {
        self.0.get(index).copied().ok_or(ValueError::OutOfBounds {
            index,
            len: self.0.len(),
        })
    }
}

/// A `width × height` grid of doubles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl Table {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Result<f64, ValueError> {
        self.index(x, y).map(|i| self.data[i])
    }

    pub fn set(&mut self, x: usize, y: usize, v: f64) -> Result<(), ValueError> {
        let i = self.index(x, y)?;
        self.data[i] = v;
        Ok(())
    }

    fn index(&self, x: usize, y: usize) -> Result<usize, ValueError> {
        if x >= self.width || y >= self.height {
            return Err(ValueError::OutOfBounds {
                index: y * self.width + x,
                len: self.data.len(),
            });
        }
        Ok(y * self.width + x)
    }
}

/// An ordered sequence of values (insertion order).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Set(pub Vec<Value>);

impl Set {
    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

/// A keyed mapping with unique keys. Iteration order is insertion order,
/// which keeps serialised output and observation streams deterministic.
/// Serialises as a plain mapping; document order becomes insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Serialize for Map {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Map {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor;

        impl<'de> serde::de::Visitor<'de> for MapVisitor {
            type Value = Map;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of names to values")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Map, A::Error> {
                let mut map = Map::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value. Re-inserting an existing key replaces the value in
    /// place without disturbing its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn try_get(&self, key: &str) -> Result<&Value, ValueError> {
        self.get(key)
            .ok_or_else(|| ValueError::KeyNotFound(key.to_string()))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = Map::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// A two-dimensional grid of values; cells default to `Null`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    columns: usize,
    rows: usize,
    data: Vec<Value>,
}

impl Matrix {
    pub fn new(columns: usize, rows: usize) -> Self {
        Self {
            columns,
            rows,
            data: vec![Value::Null; columns * rows],
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn get(&self, column: usize, row: usize) -> Result<&Value, ValueError> {
        let i = self.index(column, row)?;
        Ok(&self.data[i])
    }

    pub fn set(&mut self, column: usize, row: usize, value: Value) -> Result<(), ValueError> {
        let i = self.index(column, row)?;
        self.data[i] = value;
        Ok(())
    }

    /// Grows the matrix to at least `columns × rows`, filling new cells with
    /// `Null` and preserving existing cell positions.
    pub fn resize(&mut self, columns: usize, rows: usize) {
        let columns = columns.max(self.columns);
        let rows = rows.max(self.rows);
        if columns == self.columns && rows == self.rows {
            return;
        }
        let mut data = vec![Value::Null; columns * rows];
        for row in 0..self.rows {
            for col in 0..self.columns {
                data[row * columns + col] =
                    std::mem::replace(&mut self.data[row * self.columns + col], Value::Null);
            }
        }
        self.columns = columns;
        self.rows = rows;
        self.data = data;
    }

    fn index(&self, column: usize, row: usize) -> Result<usize, ValueError> {
        if column >= self.columns || row >= self.rows {
            return Err(ValueError::OutOfBounds {
                index: row * self.columns + column,
                len: self.data.len(),
            });
        }
        Ok(row * self.columns + column)
    }
}

/// The closed sum of payload values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Xml(String),
    Null,
    Tuple(Tuple),
    Table(Table),
    Set(Set),
    Map(Map),
    Matrix(Matrix),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Integer(_) => ValueKind::Integer,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Xml(_) => ValueKind::Xml,
            Value::Null => ValueKind::Null,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Table(_) => ValueKind::Table,
            Value::Set(_) => ValueKind::Set,
            Value::Map(_) => ValueKind::Map,
            Value::Matrix(_) => ValueKind::Matrix,
        }
    }

    pub fn as_boolean(&self) -> Result<bool, ValueError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(other.mismatch(ValueKind::Boolean)),
        }
    }

    pub fn as_integer(&self) -> Result<i64, ValueError> {
        match self {
            Value::Integer(i) => Ok(*i),
            other => Err(other.mismatch(ValueKind::Integer)),
        }
    }

    /// Doubles accept integers as well; conditions routinely write `3` for
    /// a parameter the model reads as a double.
    pub fn as_double(&self) -> Result<f64, ValueError> {
        match self {
            Value::Double(d) => Ok(*d),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(other.mismatch(ValueKind::Double)),
        }
    }

    pub fn as_string(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::String)),
        }
    }

    pub fn as_map(&self) -> Result<&Map, ValueError> {
        match self {
            Value::Map(m) => Ok(m),
            other => Err(other.mismatch(ValueKind::Map)),
        }
    }

    pub fn as_set(&self) -> Result<&Set, ValueError> {
        match self {
            Value::Set(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::Set)),
        }
    }

    pub fn as_tuple(&self) -> Result<&Tuple, ValueError> {
        match self {
            Value::Tuple(t) => Ok(t),
            other => Err(other.mismatch(ValueKind::Tuple)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn mismatch(&self, expected: ValueKind) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) | Value::Xml(s) => f.write_str(s),
            Value::Null => f.write_str("null"),
            Value::Tuple(t) => {
                let cells: Vec<String> = t.0.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", cells.join(","))
            }
            Value::Table(t) => write!(f, "table[{}x{}]", t.width, t.height),
            Value::Set(s) => {
                let cells: Vec<String> = s.0.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", cells.join(","))
            }
            Value::Map(m) => {
                let cells: Vec<String> =
                    m.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{{{}}}", cells.join(","))
            }
            Value::Matrix(m) => write!(f, "matrix[{}x{}]", m.columns, m.rows),
        }
    }
}

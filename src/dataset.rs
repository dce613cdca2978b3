//! In-memory tabular data model.
//!
//! A [`Table`] is an ordered list of named [`Column`]s whose cells are
//! positionally aligned. Missing cells are `None`. Row order is significant:
//! anomaly indices refer to row positions.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{data::Value, error::ProfileError};

/// Storage representation of a column, derived from its cells. Plays the
/// part a dtype plays in a dataframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    Numeric,
    DateTime,
    Boolean,
    Text,
    Mixed,
}

impl Representation {
    pub fn as_str(self) -> &'static str {
        match self {
            Representation::Numeric => "float64",
            Representation::DateTime => "datetime",
            Representation::Boolean => "bool",
            Representation::Text => "text",
            Representation::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<Value>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<Value>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn numbers(name: impl Into<String>, values: &[f64]) -> Self {
        Self::new(
            name,
            values.iter().map(|v| Some(Value::Number(*v))).collect(),
        )
    }

    pub fn texts<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        Self::new(
            name,
            values
                .iter()
                .map(|v| Some(Value::Text(v.as_ref().to_string())))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn present(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().flatten()
    }

    pub fn distinct_count(&self) -> usize {
        self.present().collect::<HashSet<_>>().len()
    }

    /// An all-missing column reports as numeric, mirroring how a dataframe
    /// types a column of nothing but nulls.
    pub fn representation(&self) -> Representation {
        let mut seen: Option<Representation> = None;
        for value in self.present() {
            let current = match value {
                Value::Number(_) => Representation::Numeric,
                Value::DateTime(_) => Representation::DateTime,
                Value::Boolean(_) => Representation::Boolean,
                Value::Text(_) => Representation::Text,
            };
            match seen {
                None => seen = Some(current),
                Some(previous) if previous != current => return Representation::Mixed,
                _ => {}
            }
        }
        seen.unwrap_or(Representation::Numeric)
    }

    /// Present numeric cells, skipping missing cells and non-numbers.
    pub fn numeric_values(&self) -> Vec<f64> {
        self.present().filter_map(Value::as_number).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Builds a table, rejecting columns of unequal length.
    pub fn new(columns: Vec<Column>) -> Result<Self, ProfileError> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(ProfileError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), ProfileError> {
        if !self.columns.is_empty() && column.len() != self.row_count() {
            return Err(ProfileError::DimensionMismatch {
                expected: self.row_count(),
                actual: column.len(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn missing_counts(&self) -> BTreeMap<String, usize> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.missing_count()))
            .collect()
    }

    pub fn dtypes(&self) -> BTreeMap<String, String> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.representation().as_str().to_string()))
            .collect()
    }

    /// Renders row `index` as display strings; missing cells become empty.
    pub fn row_strings(&self, index: usize) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| {
                c.values
                    .get(index)
                    .and_then(|v| v.as_ref())
                    .map(Value::as_display)
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Values keyed by column name, kept in insertion order and serialized as a
/// JSON object in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for ColumnMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> ColumnMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for ColumnMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl<T: Serialize> Serialize for ColumnMap<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_map_serializes_in_insertion_order() {
        let mut map = ColumnMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("zeta", 3);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("zeta"), Some(&3));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"zeta":3,"alpha":2}"#);
    }

    #[test]
    fn new_rejects_ragged_columns() {
        let err = Table::new(vec![
            Column::numbers("a", &[1.0, 2.0]),
            Column::numbers("b", &[1.0]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ProfileError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn representation_tracks_cell_variants() {
        assert_eq!(
            Column::numbers("n", &[1.0, 2.0]).representation(),
            Representation::Numeric
        );
        assert_eq!(
            Column::new("empty", vec![None, None]).representation(),
            Representation::Numeric
        );
        assert_eq!(
            Column::texts("t", &["a", "b"]).representation(),
            Representation::Text
        );
        let mixed = Column::new(
            "m",
            vec![Some(Value::Number(1.0)), Some(Value::Text("x".into()))],
        );
        assert_eq!(mixed.representation(), Representation::Mixed);
    }

    #[test]
    fn missing_and_distinct_counts_ignore_gaps() {
        let column = Column::new(
            "c",
            vec![
                Some(Value::Text("a".into())),
                None,
                Some(Value::Text("a".into())),
                Some(Value::Text("b".into())),
            ],
        );
        assert_eq!(column.missing_count(), 1);
        assert_eq!(column.distinct_count(), 2);
    }

    #[test]
    fn row_strings_render_missing_as_empty() {
        let table = Table::new(vec![
            Column::new("a", vec![Some(Value::Number(1.5)), None]),
            Column::texts("b", &["x", "y"]),
        ])
        .unwrap();
        assert_eq!(table.shape(), (2, 2));
        assert_eq!(table.row_strings(1), vec!["".to_string(), "y".to_string()]);
    }
}

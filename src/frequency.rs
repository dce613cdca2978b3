use std::collections::HashMap;

use crate::{data::Value, dataset::Column};

/// Distinct value counts for a column, most frequent first. Ties are broken
/// by value order so the result is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueCounts {
    total_rows: usize,
    items: Vec<(Value, usize)>,
}

impl ValueCounts {
    pub fn from_column(column: &Column) -> Self {
        let mut counts: HashMap<&Value, usize> = HashMap::new();
        for value in column.present() {
            *counts.entry(value).or_insert(0) += 1;
        }
        let mut items = counts
            .into_iter()
            .map(|(value, count)| (value.clone(), count))
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Self {
            total_rows: column.len(),
            items,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn distinct(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[(Value, usize)] {
        &self.items
    }

    pub fn top(&self, n: usize) -> &[(Value, usize)] {
        &self.items[..n.min(self.items.len())]
    }

    /// Most frequent value; the smallest value wins a tie.
    pub fn mode(&self) -> Option<&Value> {
        self.items.first().map(|(value, _)| value)
    }

    /// Share of all rows (missing included in the denominator).
    pub fn share(&self, count: usize) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            count as f64 / self.total_rows as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_sort_by_frequency_then_value() {
        let column = Column::texts("c", &["b", "a", "c", "a", "b", "a"]);
        let counts = ValueCounts::from_column(&column);
        let rendered = counts
            .items()
            .iter()
            .map(|(v, c)| (v.as_display(), *c))
            .collect::<Vec<_>>();
        assert_eq!(
            rendered,
            vec![
                ("a".to_string(), 3),
                ("b".to_string(), 2),
                ("c".to_string(), 1)
            ]
        );
        assert_eq!(counts.top(2).len(), 2);
        assert_eq!(counts.top(10).len(), 3);
    }

    #[test]
    fn mode_prefers_smallest_on_tie() {
        let column = Column::texts("c", &["z", "y", "z", "y"]);
        let counts = ValueCounts::from_column(&column);
        assert_eq!(counts.mode(), Some(&Value::Text("y".into())));
    }

    #[test]
    fn missing_cells_count_toward_total_only() {
        let column = Column::new("c", vec![Some(Value::Text("a".into())), None]);
        let counts = ValueCounts::from_column(&column);
        assert_eq!(counts.distinct(), 1);
        assert_eq!(counts.total_rows(), 2);
        assert_eq!(counts.share(1), 0.5);
        assert_eq!(ValueCounts::from_column(&Column::new("e", vec![None])).mode(), None);
    }
}

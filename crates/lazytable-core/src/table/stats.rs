//! Summary statistics over materialized cells.
//!
//! Statistics only look at what is already in the store; nothing is fetched.
//! Unknown cells are counted separately so callers can tell how
//! representative the numbers are.

use super::LazyTable;
use crate::value::{Cell, Value};

/// Per-attribute summary.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeStats {
    /// Attribute name.
    pub name: String,
    /// Smallest numeric value, if any.
    pub min: Option<f64>,
    /// Largest numeric value, if any.
    pub max: Option<f64>,
    /// Mean of numeric values, if any.
    pub mean: Option<f64>,
    /// Cells that are known (missing values included).
    pub known: usize,
    /// Cells not fetched yet.
    pub unknown: usize,
    /// Known cells whose value is missing or NaN.
    pub missing: usize,
}

impl LazyTable {
    /// Statistics for every attribute over the materialized rows.
    pub fn stats(&self) -> Vec<AttributeStats> {
        let store = self.shared.store.read();
        self.domain()
            .attributes()
            .iter()
            .enumerate()
            .map(|(pos, attr)| {
                let column = store.column(pos).unwrap_or(&[]);
                summarize(attr.name(), column)
            })
            .collect()
    }
}

fn summarize(name: &str, column: &[Cell]) -> AttributeStats {
    let mut stats = AttributeStats {
        name: name.to_string(),
        min: None,
        max: None,
        mean: None,
        known: 0,
        unknown: 0,
        missing: 0,
    };
    let mut sum = 0.0;
    let mut count = 0usize;

    for cell in column {
        let value = match cell {
            Cell::Unknown => {
                stats.unknown += 1;
                continue;
            }
            Cell::Known(value) => value,
        };
        stats.known += 1;
        let numeric = match value {
            Value::Missing => None,
            other => other.as_f64().filter(|v| !v.is_nan()),
        };
        match numeric {
            Some(v) => {
                stats.min = Some(stats.min.map_or(v, |m| m.min(v)));
                stats.max = Some(stats.max.map_or(v, |m| m.max(v)));
                sum += v;
                count += 1;
            }
            None if matches!(value, Value::Text(_)) => {}
            None => stats.missing += 1,
        }
    }
    if count > 0 {
        stats.mean = Some(sum / count as f64);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn stats_cover_only_materialized_cells() {
        let table =
            LazyTable::from_source(MemorySource::single_column("a", &[1.0, f64::NAN, 5.0, 9.0]).unwrap())
                .unwrap();
        table.value(0, "a").unwrap();
        table.value(1, "a").unwrap();
        table.value(2, "a").unwrap();
        table.get(3).unwrap();

        let stats = &table.stats()[0];
        assert_eq!(stats.name, "a");
        assert_eq!(stats.known, 3);
        assert_eq!(stats.unknown, 1);
        assert_eq!(stats.missing, 1);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.mean, Some(3.0));
    }

    #[test]
    fn empty_table_has_empty_stats() {
        let table = LazyTable::from_source(MemorySource::single_column("a", &[]).unwrap()).unwrap();
        let stats = &table.stats()[0];
        assert_eq!(stats.known, 0);
        assert!(stats.mean.is_none());
    }
}

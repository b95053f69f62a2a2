//! Concatenation of materialized rows.

use log::debug;
use snafu::prelude::*;

use super::{LazyTable, SchemaMismatchSnafu, StoreSnafu, TableResult};
use crate::{
    domain::ensure_compatible,
    store::{MaterializedIndex, StoredRow},
    value::Cell,
};

impl LazyTable {
    /// Append every materialized row of `other` after this table's rows.
    ///
    /// Both tables are fully resolved first (every unknown cell of every
    /// materialized row is fetched), so the appended rows are self-contained.
    /// Afterwards this table's rows are renumbered `0..m+n` in store order:
    /// its own rows first, then `other`'s, weights preserved. `other` is left
    /// untouched.
    pub fn extend(&self, other: &LazyTable) -> TableResult<()> {
        ensure_compatible(self.domain(), other.domain()).context(SchemaMismatchSnafu)?;

        self.resolve_materialized()?;
        if !self.ptr_eq(other) {
            other.resolve_materialized()?;
        }

        let rows: Vec<StoredRow> = other.shared.store.read().snapshot();
        let appended = rows.len();
        self.shared
            .store
            .write()
            .append_and_renumber(rows)
            .context(StoreSnafu)?;

        debug!(
            "table {:?} extended with {appended} rows from {:?}",
            self.shared.name, other.shared.name
        );
        Ok(())
    }

    /// Fetch every unknown cell of every materialized row.
    pub fn resolve_materialized(&self) -> TableResult<()> {
        let len = self.materialized_len();
        for slot in 0..len {
            let slot = slot as MaterializedIndex;
            let unknown: Vec<usize> = {
                let store = self.shared.store.read();
                store
                    .row(slot)
                    .context(StoreSnafu)?
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| matches!(cell, Cell::Unknown))
                    .map(|(pos, _)| pos)
                    .collect()
            };
            for attribute in unknown {
                self.resolve_cell(slot, attribute)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Attribute, Domain},
        source::{MemorySource, TableLength},
        table::{LengthMode, TableError},
        value::Value,
    };

    fn table(values: &[f64]) -> LazyTable {
        LazyTable::from_source(MemorySource::single_column("a", values).unwrap()).unwrap()
    }

    #[test]
    fn extend_appends_rows_in_order_and_renumbers() {
        let left = table(&[1.0, 2.0, 3.0]);
        left.get(2).unwrap();
        left.get(0).unwrap();
        let right = table(&[10.0, 20.0]);
        right.get(1).unwrap();
        right.set_weight(1, 0.25).unwrap();

        left.extend(&right).unwrap();

        assert_eq!(left.len(LengthMode::Materialized).unwrap(), TableLength::Finite(3));
        let values: Vec<f64> = (0..3)
            .map(|i| left.value(i, "a").unwrap().as_f64().unwrap())
            .collect();
        assert_eq!(values, vec![3.0, 1.0, 20.0]);
        assert_eq!(left.get(2).unwrap().weight(), 0.25);
        assert_eq!(right.materialized_len(), 1);
    }

    #[test]
    fn extend_resolves_pending_cells_first() {
        let left = table(&[1.0]);
        let right = table(&[5.0]);
        right.get(0).unwrap();
        assert!(!right.cached_cells(0).unwrap()[0].is_known());

        left.extend(&right).unwrap();
        let cells = left.cached_cells(0).unwrap();
        assert!(cells[0].value().unwrap().same_bits(&Value::Continuous(5.0)));
    }

    #[test]
    fn extend_with_itself_doubles_rows() {
        let t = table(&[1.0, 2.0]);
        t.get(0).unwrap();
        t.get(1).unwrap();
        t.extend(&t).unwrap();
        assert_eq!(t.materialized_len(), 4);
        assert!(t.value(3, "a").unwrap().same_bits(&Value::Continuous(2.0)));
    }

    #[test]
    fn extend_rejects_other_domains() {
        let left = table(&[1.0]);
        let other = LazyTable::from_domain(Domain::from_features(vec![Attribute::continuous("b")]).unwrap());
        let err = left.extend(&other).unwrap_err();
        assert!(matches!(err, TableError::SchemaMismatch { .. }));
    }
}

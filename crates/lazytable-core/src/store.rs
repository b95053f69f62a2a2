//! Materialized rows of a lazy table.
//!
//! The store owns every admitted row: its cells (column-major, one column per
//! domain attribute), its weight, the logical index it answers to, and the
//! upstream position its unknown cells are fetched from. Rows are appended in
//! admission order; the [`RowIdentityMap`] translates logical indices to
//! slots.
//!
//! The store is plain data. Locking and upstream access belong to
//! `table::LazyTable`.

use snafu::prelude::*;

use crate::{
    coverage::Coverage,
    domain::Domain,
    value::{Cell, Value},
};

mod columns;
pub mod row_map;

use columns::Columns;
pub use row_map::RowIdentityMap;

/// Row identifier in a table's logical row space.
pub type LogicalIndex = u64;

/// Position of a row in the materialized store.
pub type MaterializedIndex = u32;

/// Weight given to rows that never had one assigned.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Errors raised by store bookkeeping.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// The logical index is already mapped to a slot.
    #[snafu(display("Logical row {logical} is already materialized at slot {slot}"))]
    AlreadyMapped {
        /// Logical index that was inserted twice.
        logical: LogicalIndex,
        /// Slot it is already mapped to.
        slot: MaterializedIndex,
    },

    /// A slot outside `0..len` was addressed.
    #[snafu(display("Materialized slot {slot} out of bounds (store holds {len} rows)"))]
    SlotOutOfBounds {
        /// The offending slot.
        slot: MaterializedIndex,
        /// Current number of rows.
        len: usize,
    },

    /// An attribute position outside the domain was addressed.
    #[snafu(display("Attribute #{attribute} out of bounds (domain width {width})"))]
    AttributeOutOfBounds {
        /// The offending position.
        attribute: usize,
        /// Domain width.
        width: usize,
    },

    /// The store cannot address more rows.
    #[snafu(display("Materialized store is full ({len} rows)"))]
    CapacityExhausted {
        /// Current number of rows.
        len: usize,
    },

    /// Appended rows do not match the store width.
    #[snafu(display("Row width {got} does not match store width {expected}"))]
    RowWidth {
        /// Expected width.
        expected: usize,
        /// Width of the offending row.
        got: usize,
    },
}

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// A fully resident row as copied out of a store.
#[derive(Debug, Clone)]
pub struct StoredRow {
    /// Cells in domain order.
    pub cells: Vec<Cell>,
    /// Row weight.
    pub weight: f64,
}

/// Materialized rows plus their bookkeeping.
#[derive(Debug, Clone)]
pub struct MaterializedStore {
    columns: Columns,
    weights: Vec<f64>,
    logical: Vec<LogicalIndex>,
    upstream: Vec<LogicalIndex>,
    map: RowIdentityMap,
}

impl MaterializedStore {
    /// Empty store shaped after `domain`.
    pub fn new(domain: &Domain) -> Self {
        Self {
            columns: Columns::new(domain.len()),
            weights: Vec::new(),
            logical: Vec::new(),
            upstream: Vec::new(),
            map: RowIdentityMap::new(),
        }
    }

    /// Number of materialized rows.
    pub fn len(&self) -> usize {
        self.columns.rows()
    }

    /// Whether nothing is materialized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of attributes per row.
    pub fn width(&self) -> usize {
        self.columns.width()
    }

    /// Slot of `logical`, if admitted.
    pub fn resolve(&self, logical: LogicalIndex) -> Option<MaterializedIndex> {
        self.map.resolve(logical)
    }

    /// Admitted logical indices.
    pub fn coverage(&self) -> &Coverage {
        self.map.coverage()
    }

    /// The identity map.
    pub fn row_map(&self) -> &RowIdentityMap {
        &self.map
    }

    /// Append a row of unknown cells for `logical`, fetched from
    /// `upstream_position`.
    pub fn allocate(
        &mut self,
        logical: LogicalIndex,
        upstream_position: LogicalIndex,
    ) -> StoreResult<MaterializedIndex> {
        if let Some(slot) = self.map.resolve(logical) {
            return AlreadyMappedSnafu { logical, slot }.fail();
        }
        let slot = self.next_slot()?;
        self.map.insert(logical, slot)?;
        self.columns.push_unknown();
        self.weights.push(DEFAULT_WEIGHT);
        self.logical.push(logical);
        self.upstream.push(upstream_position);
        Ok(slot)
    }

    fn next_slot(&self) -> StoreResult<MaterializedIndex> {
        MaterializedIndex::try_from(self.len())
            .ok()
            .filter(|slot| *slot < MaterializedIndex::MAX)
            .context(CapacityExhaustedSnafu { len: self.len() })
    }

    fn check_slot(&self, slot: MaterializedIndex) -> StoreResult<usize> {
        let idx = slot as usize;
        ensure!(
            idx < self.len(),
            SlotOutOfBoundsSnafu {
                slot,
                len: self.len()
            }
        );
        Ok(idx)
    }

    fn check_attribute(&self, attribute: usize) -> StoreResult<()> {
        ensure!(
            attribute < self.width(),
            AttributeOutOfBoundsSnafu {
                attribute,
                width: self.width()
            }
        );
        Ok(())
    }

    /// Cell at `(slot, attribute)`.
    pub fn cell(&self, slot: MaterializedIndex, attribute: usize) -> StoreResult<&Cell> {
        let idx = self.check_slot(slot)?;
        self.check_attribute(attribute)?;
        self.columns
            .get(idx, attribute)
            .context(SlotOutOfBoundsSnafu {
                slot,
                len: self.len(),
            })
    }

    /// All cells of one attribute, in slot order.
    pub fn column(&self, attribute: usize) -> StoreResult<&[Cell]> {
        self.check_attribute(attribute)?;
        self.columns.column(attribute).context(AttributeOutOfBoundsSnafu {
            attribute,
            width: self.width(),
        })
    }

    /// Store `value` into an unknown cell and return the value now held.
    ///
    /// Cells only ever move from `Unknown` to `Known`; if another resolver got
    /// there first its value wins and is returned.
    pub fn fill_cell(
        &mut self,
        slot: MaterializedIndex,
        attribute: usize,
        value: Value,
    ) -> StoreResult<Value> {
        let idx = self.check_slot(slot)?;
        self.check_attribute(attribute)?;
        let len = self.len();
        self.columns
            .fill(idx, attribute, value)
            .context(SlotOutOfBoundsSnafu { slot, len })
    }

    /// Cells of the row at `slot`, without fetching.
    pub fn row(&self, slot: MaterializedIndex) -> StoreResult<Vec<Cell>> {
        let idx = self.check_slot(slot)?;
        self.columns.row(idx).context(SlotOutOfBoundsSnafu {
            slot,
            len: self.len(),
        })
    }

    /// Number of unknown cells in the row at `slot`.
    pub fn unknown_cells(&self, slot: MaterializedIndex) -> StoreResult<usize> {
        let idx = self.check_slot(slot)?;
        Ok(self.columns.unknown_in_row(idx))
    }

    /// Logical index answered by `slot`.
    pub fn logical_index(&self, slot: MaterializedIndex) -> StoreResult<LogicalIndex> {
        let idx = self.check_slot(slot)?;
        Ok(self.logical[idx])
    }

    /// Upstream position the row at `slot` is fetched from.
    pub fn upstream_position(&self, slot: MaterializedIndex) -> StoreResult<LogicalIndex> {
        let idx = self.check_slot(slot)?;
        Ok(self.upstream[idx])
    }

    /// Weight of the row at `slot`.
    pub fn weight(&self, slot: MaterializedIndex) -> StoreResult<f64> {
        let idx = self.check_slot(slot)?;
        Ok(self.weights[idx])
    }

    /// Set the weight of the row at `slot`.
    pub fn set_weight(&mut self, slot: MaterializedIndex, weight: f64) -> StoreResult<()> {
        let idx = self.check_slot(slot)?;
        self.weights[idx] = weight;
        Ok(())
    }

    /// Whether any row carries a non-default weight.
    pub fn has_weights(&self) -> bool {
        self.weights.iter().any(|w| *w != DEFAULT_WEIGHT)
    }

    /// Copy out every row in slot order.
    pub fn snapshot(&self) -> Vec<StoredRow> {
        (0..self.len())
            .filter_map(|idx| {
                self.columns.row(idx).map(|cells| StoredRow {
                    cells,
                    weight: self.weights[idx],
                })
            })
            .collect()
    }

    /// Append `rows` after the existing ones, then renumber: slot `s` answers
    /// logical index `s` and the mapping becomes the identity over all rows.
    ///
    /// Existing rows keep their cells, weights and upstream positions.
    /// Appended rows carry no upstream position of their own and must be
    /// fully known.
    pub fn append_and_renumber(&mut self, rows: Vec<StoredRow>) -> StoreResult<()> {
        let total = self.len() + rows.len();
        let total_slots = MaterializedIndex::try_from(total)
            .ok()
            .filter(|n| *n < MaterializedIndex::MAX)
            .context(CapacityExhaustedSnafu { len: self.len() })?;

        for row in &rows {
            ensure!(
                row.cells.len() == self.width(),
                RowWidthSnafu {
                    expected: self.width(),
                    got: row.cells.len()
                }
            );
        }

        for row in rows {
            let slot = self.len() as LogicalIndex;
            self.columns.push_row(row.cells);
            self.weights.push(row.weight);
            self.upstream.push(slot);
            self.logical.push(slot);
        }

        self.map = RowIdentityMap::identity(total_slots);
        for (slot, logical) in self.logical.iter_mut().enumerate() {
            *logical = slot as LogicalIndex;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attribute;

    fn domain() -> Domain {
        Domain::from_features(vec![Attribute::continuous("a"), Attribute::continuous("b")]).unwrap()
    }

    #[test]
    fn allocate_appends_unknown_row_with_default_weight() {
        let mut store = MaterializedStore::new(&domain());
        let slot = store.allocate(40, 40).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(store.resolve(40), Some(0));
        assert_eq!(store.logical_index(0).unwrap(), 40);
        assert_eq!(store.weight(0).unwrap(), DEFAULT_WEIGHT);
        assert_eq!(store.unknown_cells(0).unwrap(), 2);
        assert!(!store.has_weights());
    }

    #[test]
    fn allocating_same_logical_twice_fails() {
        let mut store = MaterializedStore::new(&domain());
        store.allocate(3, 3).unwrap();
        let err = store.allocate(3, 3).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyMapped { logical: 3, slot: 0 }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fill_keeps_first_value() {
        let mut store = MaterializedStore::new(&domain());
        store.allocate(0, 0).unwrap();
        store.fill_cell(0, 0, Value::Continuous(f64::NAN)).unwrap();
        let held = store.fill_cell(0, 0, Value::Continuous(1.0)).unwrap();
        assert!(held.as_f64().unwrap().is_nan());
    }

    #[test]
    fn addressing_outside_store_is_an_error() {
        let mut store = MaterializedStore::new(&domain());
        store.allocate(0, 0).unwrap();
        assert!(matches!(
            store.cell(1, 0).unwrap_err(),
            StoreError::SlotOutOfBounds { slot: 1, len: 1 }
        ));
        assert!(matches!(
            store.cell(0, 2).unwrap_err(),
            StoreError::AttributeOutOfBounds { attribute: 2, width: 2 }
        ));
    }

    #[test]
    fn append_and_renumber_rebuilds_identity() {
        let mut store = MaterializedStore::new(&domain());
        store.allocate(10, 10).unwrap();
        store.allocate(4, 4).unwrap();
        let known = |v: f64| Cell::Known(Value::Continuous(v));
        store
            .append_and_renumber(vec![StoredRow {
                cells: vec![known(1.0), known(2.0)],
                weight: 0.5,
            }])
            .unwrap();

        assert_eq!(store.len(), 3);
        for slot in 0..3u32 {
            assert_eq!(store.resolve(u64::from(slot)), Some(slot));
            assert_eq!(store.logical_index(slot).unwrap(), u64::from(slot));
        }
        assert_eq!(store.resolve(10), None);
        assert_eq!(store.weight(2).unwrap(), 0.5);
        assert!(store.has_weights());
    }

    #[test]
    fn append_rejects_rows_of_wrong_width() {
        let mut store = MaterializedStore::new(&domain());
        let err = store
            .append_and_renumber(vec![StoredRow {
                cells: vec![Cell::Unknown],
                weight: 1.0,
            }])
            .unwrap_err();
        assert!(matches!(err, StoreError::RowWidth { expected: 2, got: 1 }));
        assert!(store.is_empty());
    }
}

//! Handle to one materialized row.

use std::fmt;

use snafu::prelude::*;

use super::{LazyTable, StoreSnafu, TableResult, UnknownAttributeSnafu};
use crate::{
    domain::{AttributeRef, Domain, Role},
    filter::RowAccess,
    region::RegionOfInterest,
    store::{DEFAULT_WEIGHT, LogicalIndex, MaterializedIndex},
    value::{Cell, Value},
};

/// A materialized row of a [`LazyTable`]. Reading an unknown cell fetches it
/// and caches it in the table.
#[derive(Clone)]
pub struct RowView<'t> {
    table: &'t LazyTable,
    logical: LogicalIndex,
    slot: MaterializedIndex,
}

impl<'t> RowView<'t> {
    pub(crate) fn new(table: &'t LazyTable, logical: LogicalIndex, slot: MaterializedIndex) -> Self {
        Self {
            table,
            logical,
            slot,
        }
    }

    /// Table the row belongs to.
    pub fn table(&self) -> &'t LazyTable {
        self.table
    }

    /// Logical index of the row.
    pub fn index(&self) -> LogicalIndex {
        self.logical
    }

    /// Slot of the row in the materialized store.
    pub fn materialized_index(&self) -> MaterializedIndex {
        self.slot
    }

    /// Value of `attribute`, fetched on first access.
    pub fn get(&self, attribute: impl Into<AttributeRef>) -> TableResult<Value> {
        let position = self
            .table
            .domain()
            .resolve(&attribute.into())
            .context(UnknownAttributeSnafu)?;
        self.table.resolve_cell(self.slot, position)
    }

    /// Every value in domain order, fetching what is still unknown.
    pub fn values(&self) -> TableResult<Vec<Value>> {
        (0..self.table.domain().len())
            .map(|pos| self.table.resolve_cell(self.slot, pos))
            .collect()
    }

    /// Values of the attributes with `role`, fetching what is still unknown.
    pub fn values_with_role(&self, role: Role) -> TableResult<Vec<Value>> {
        let domain = self.table.domain();
        (0..domain.len())
            .filter(|pos| domain.role(*pos) == Some(role))
            .map(|pos| self.table.resolve_cell(self.slot, pos))
            .collect()
    }

    /// Cells as currently stored; nothing is fetched.
    pub fn cells(&self) -> Vec<Cell> {
        self.table
            .shared
            .store
            .read()
            .row(self.slot)
            .unwrap_or_default()
    }

    /// Whether every cell is known.
    pub fn is_fully_materialized(&self) -> bool {
        self.cells().iter().all(Cell::is_known)
    }

    /// Row weight.
    pub fn weight(&self) -> f64 {
        self.table
            .shared
            .store
            .read()
            .weight(self.slot)
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Set the row weight.
    pub fn set_weight(&self, weight: f64) -> TableResult<()> {
        self.table
            .shared
            .store
            .write()
            .set_weight(self.slot, weight)
            .context(StoreSnafu)
    }

    /// Whether the row lies inside `region`.
    pub fn in_region(&self, region: &RegionOfInterest) -> TableResult<bool> {
        region.resolve(self.table.domain())?.matches(self)
    }
}

impl RowAccess for RowView<'_> {
    fn domain(&self) -> &Domain {
        self.table.domain()
    }

    fn logical_index(&self) -> LogicalIndex {
        self.logical
    }

    fn value_at(&self, position: usize) -> TableResult<Value> {
        self.table.resolve_cell(self.slot, position)
    }
}

impl fmt::Debug for RowView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowView")
            .field("table", &self.table.name())
            .field("index", &self.logical)
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::test_util::abcd_source;

    #[test]
    fn values_fill_the_row_and_roles_select_groups() {
        let table = LazyTable::from_source(abcd_source()).unwrap();
        let row = table.get(2).unwrap();
        assert!(!row.is_fully_materialized());

        let labels = row.values_with_role(Role::Label).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(row.cells().iter().filter(|c| c.is_known()).count(), 1);

        let all = row.values().unwrap();
        assert_eq!(all.len(), 4);
        assert!(row.is_fully_materialized());
        assert_eq!(row.index(), 2);
        assert_eq!(row.materialized_index(), 0);
    }

    #[test]
    fn region_membership_reads_bounded_attributes() {
        let table = LazyTable::from_source(abcd_source()).unwrap();
        let row = table.get(0).unwrap();
        let inside = RegionOfInterest::everything().with_bound("a", -1e9, 1e9);
        let outside = RegionOfInterest::everything().with_rows(1..5);
        assert!(row.in_region(&inside).unwrap());
        assert!(!row.in_region(&outside).unwrap());
    }
}

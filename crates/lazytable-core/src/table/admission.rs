//! Row admission: Unseen -> Evaluating -> Materialized.
//!
//! A logical row that is not in the store is evaluated on a [`TransientRow`]:
//! cells the filters need are fetched into a scratch buffer, nothing is
//! stored. If the row is accepted it is allocated a slot and the scratch
//! values are promoted into it. A rejected row leaves no trace and is
//! evaluated again the next time it is addressed.
//!
//! Allocation re-checks the identity map under the write lock, so two
//! threads admitting the same row end up sharing one slot.

use std::cell::RefCell;

use log::trace;
use snafu::prelude::*;

use super::{
    Binding, LazyTable, OutOfRangeSnafu, RowRejectedSnafu, RowView, SourceMetadataSnafu,
    StoreSnafu, TableResult, TornDownSnafu, Upstream,
};
use crate::{
    domain::Domain,
    filter::RowAccess,
    region::ResolvedRegion,
    source::TableLength,
    store::{LogicalIndex, MaterializedIndex},
    value::{Cell, Value},
};

/// Who is asking for the row.
#[derive(Clone, Copy)]
pub(crate) enum Admission<'r> {
    /// A consumer read; only the filter chain decides.
    Foreground,
    /// The prefetcher; the row must also fall inside the region.
    RegionOnly(&'r ResolvedRegion),
}

/// Outcome of probing one logical row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    /// The row is materialized at `slot`; `fresh` when this probe admitted it.
    Admitted {
        slot: MaterializedIndex,
        fresh: bool,
    },
    /// The row exists but was not admitted.
    Rejected,
}

/// A row under evaluation. Reads go through `owner.peek_cell`, are cached in
/// a scratch buffer, and never touch the owner's store.
pub(crate) struct TransientRow<'t> {
    owner: &'t LazyTable,
    owner_index: LogicalIndex,
    logical_index: LogicalIndex,
    scratch: RefCell<Vec<Option<Value>>>,
}

impl<'t> TransientRow<'t> {
    /// Row `owner_index` of `owner`, presented to predicates as
    /// `logical_index`.
    pub(crate) fn new(owner: &'t LazyTable, owner_index: LogicalIndex, logical_index: LogicalIndex) -> Self {
        Self {
            owner,
            owner_index,
            logical_index,
            scratch: RefCell::new(vec![None; owner.domain().len()]),
        }
    }

    pub(crate) fn with_scratch(mut self, scratch: Vec<Option<Value>>) -> Self {
        if scratch.len() == self.owner.domain().len() {
            self.scratch = RefCell::new(scratch);
        }
        self
    }

    pub(crate) fn into_scratch(self) -> Vec<Option<Value>> {
        self.scratch.into_inner()
    }
}

impl RowAccess for TransientRow<'_> {
    fn domain(&self) -> &Domain {
        self.owner.domain()
    }

    fn logical_index(&self) -> LogicalIndex {
        self.logical_index
    }

    fn value_at(&self, position: usize) -> TableResult<Value> {
        if let Some(Some(value)) = self.scratch.borrow().get(position) {
            return Ok(value.clone());
        }
        let value = self.owner.peek_cell(self.owner_index, position)?;
        if let Some(slot) = self.scratch.borrow_mut().get_mut(position) {
            *slot = Some(value.clone());
        }
        Ok(value)
    }
}

impl LazyTable {
    /// Materialized row `index`, admitting it if needed.
    ///
    /// Fails with [`super::TableError::OutOfRange`] past the end and with
    /// [`super::TableError::RowRejected`] when this table's own filters reject
    /// the row.
    pub fn get(&self, index: LogicalIndex) -> TableResult<RowView<'_>> {
        match self.probe(index, Admission::Foreground)? {
            Probe::Admitted { slot, .. } => Ok(RowView::new(self, index, slot)),
            Probe::Rejected => RowRejectedSnafu { index }.fail(),
        }
    }

    /// Shorthand for `get(index)?.get(attribute)`.
    pub fn value(
        &self,
        index: LogicalIndex,
        attribute: impl Into<crate::domain::AttributeRef>,
    ) -> TableResult<Value> {
        self.get(index)?.get(attribute)
    }

    pub(crate) fn probe(&self, index: LogicalIndex, admission: Admission<'_>) -> TableResult<Probe> {
        let resident = self.shared.store.read().resolve(index);
        if let Some(slot) = resident {
            return Ok(Probe::Admitted { slot, fresh: false });
        }

        if let Admission::RegionOnly(region) = admission
            && !region.contains_row(index)
        {
            return Ok(Probe::Rejected);
        }

        let (position, row) = match self.upstream()? {
            Upstream::Source(source) => {
                let length = source.pull_length().context(SourceMetadataSnafu)?;
                ensure!(length.admits(index), OutOfRangeSnafu { index, length });

                let row = TransientRow::new(self, index, index);
                if length == TableLength::Unknown && !self.domain().is_empty() {
                    row.value_at(0)?;
                }
                if !self.shared.filters.evaluate(&row)? {
                    trace!("table {:?} rejected row {index}", self.shared.name);
                    return Ok(Probe::Rejected);
                }
                (index, row)
            }
            Upstream::Parent(parent) => {
                let located = self.locate_match(&parent, index)?;
                let row = TransientRow::new(self, index, index);
                (located.position, row.with_scratch(located.scratch))
            }
        };

        if let Admission::RegionOnly(region) = admission
            && !region.matches(&row)?
        {
            return Ok(Probe::Rejected);
        }

        self.admit(index, position, row.into_scratch())
    }

    fn admit(
        &self,
        index: LogicalIndex,
        position: LogicalIndex,
        scratch: Vec<Option<Value>>,
    ) -> TableResult<Probe> {
        let mut store = self.shared.store.write();
        if matches!(*self.shared.binding.read(), Binding::TornDown) {
            return TornDownSnafu { table: self.name() }.fail();
        }

        let (slot, fresh) = match store.resolve(index) {
            Some(slot) => (slot, false),
            None => (store.allocate(index, position).context(StoreSnafu)?, true),
        };
        for (attribute, value) in scratch.into_iter().enumerate() {
            if let Some(value) = value {
                store.fill_cell(slot, attribute, value).context(StoreSnafu)?;
            }
        }
        if fresh {
            trace!("table {:?} admitted row {index} at slot {slot}", self.shared.name);
        }
        Ok(Probe::Admitted { slot, fresh })
    }

    /// Cells of materialized row `index` without fetching anything.
    pub fn cached_cells(&self, index: LogicalIndex) -> Option<Vec<Cell>> {
        let store = self.shared.store.read();
        let slot = store.resolve(index)?;
        store.row(slot).ok()
    }
}

//! Row iteration.
//!
//! [`Rows`] walks logical indices from 0, admitting rows as it goes, and
//! stops at the known length or at the first out-of-range probe. Over an
//! unbounded source it never ends on its own; bound it with `take`.
//!
//! [`MaterializedRows`] only visits rows already in the store, in logical
//! order, and never admits anything.

use log::debug;

use super::{
    LazyTable, RowView, TableResult, Upstream,
    admission::{Admission, Probe},
};
use crate::{
    source::TableLength,
    store::{LogicalIndex, MaterializedIndex},
};

/// Iterator over all rows of a table. Yields `Err` for rows whose probe
/// failed and moves on to the next index.
pub struct Rows<'t> {
    table: &'t LazyTable,
    next: LogicalIndex,
    end: Option<LogicalIndex>,
    pending_error: Option<super::TableError>,
    done: bool,
}

impl<'t> Rows<'t> {
    fn new(table: &'t LazyTable) -> Self {
        let mut rows = Self {
            table,
            next: 0,
            end: None,
            pending_error: None,
            done: false,
        };
        match table.upstream() {
            Ok(Upstream::Source(source)) => match source.pull_length() {
                Ok(TableLength::Finite(n)) => rows.end = Some(n),
                Ok(_) => {}
                Err(err) => {
                    debug!("length of {:?} unavailable: {err}", table.name());
                }
            },
            Ok(Upstream::Parent(_)) => {}
            Err(err) => rows.pending_error = Some(err),
        }
        rows
    }
}

impl<'t> Iterator for Rows<'t> {
    type Item = TableResult<RowView<'t>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending_error.take() {
            self.done = true;
            return Some(Err(err));
        }
        loop {
            if self.done || self.end.is_some_and(|end| self.next >= end) {
                self.done = true;
                return None;
            }
            let index = self.next;
            self.next += 1;

            match self.table.probe(index, Admission::Foreground) {
                Ok(Probe::Admitted { slot, .. }) => {
                    return Some(Ok(RowView::new(self.table, index, slot)));
                }
                Ok(Probe::Rejected) => continue,
                Err(err) if err.is_out_of_range() => {
                    self.done = true;
                    return None;
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Iterator over the rows already materialized, in logical order.
pub struct MaterializedRows<'t> {
    table: &'t LazyTable,
    entries: std::vec::IntoIter<(LogicalIndex, MaterializedIndex)>,
}

impl<'t> Iterator for MaterializedRows<'t> {
    type Item = RowView<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries
            .next()
            .map(|(logical, slot)| RowView::new(self.table, logical, slot))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl ExactSizeIterator for MaterializedRows<'_> {}

impl LazyTable {
    /// Iterate every row, admitting as needed.
    pub fn iter(&self) -> Rows<'_> {
        Rows::new(self)
    }

    /// Iterate the rows materialized at the time of the call.
    pub fn materialized_rows(&self) -> MaterializedRows<'_> {
        let entries: Vec<_> = self.shared.store.read().row_map().iter_ordered().collect();
        MaterializedRows {
            table: self,
            entries: entries.into_iter(),
        }
    }
}

impl<'t> IntoIterator for &'t LazyTable {
    type Item = TableResult<RowView<'t>>;
    type IntoIter = Rows<'t>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

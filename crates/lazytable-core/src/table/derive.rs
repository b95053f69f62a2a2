//! Derived views.
//!
//! `derive` returns a new table whose upstream is the receiver and whose
//! filter chain is the receiver's chain plus one more filter. Logical row `i`
//! of the view is the `i`-th parent row that passes the whole chain; the
//! mapping is discovered by a forward scan and remembered in a
//! [`ScanCursor`].
//!
//! The cursor lock is never held while a parent row is evaluated. After an
//! evaluation the cursor is re-locked and the result is only recorded if no
//! other thread advanced the cursor in the meantime.

use std::sync::Arc;

use log::debug;
use snafu::prelude::*;

use super::{
    Binding, LazyTable, LengthMode, OutOfRangeSnafu, SourceMetadataSnafu, TableResult,
    UnknownAttributeSnafu, Upstream, admission::TransientRow,
};
use crate::{
    filter::{Predicate, RowAccess},
    source::TableLength,
    store::LogicalIndex,
    value::Value,
};

/// Progress of a derived view's scan over its parent.
#[derive(Debug, Default)]
pub(crate) struct ScanCursor {
    next_parent: LogicalIndex,
    matches: Vec<LogicalIndex>,
    exhausted: bool,
}

/// Where a derived row lives in the parent, plus any cells read while
/// evaluating it.
pub(crate) struct Located {
    pub(crate) position: LogicalIndex,
    pub(crate) scratch: Vec<Option<Value>>,
}

enum Scan {
    Passed(Vec<Option<Value>>),
    Failed,
    End,
}

impl LazyTable {
    /// Filtered view over this table.
    ///
    /// The view starts empty and shares nothing mutable with the receiver
    /// except through reads: cells it fetches are cached in the receiver's
    /// store too when the receiver has the row materialized.
    pub fn derive(&self, predicate: Predicate) -> TableResult<LazyTable> {
        let filter = predicate.compile(self.domain()).context(UnknownAttributeSnafu)?;
        self.upstream()?;

        let chain = self.shared.filters.with(filter);
        let name = format!("{}/derived{}", self.shared.name, chain.len());
        debug!("deriving {name:?} ({} filters)", chain.len());
        Ok(LazyTable::from_parts(
            name,
            Arc::clone(&self.shared.domain),
            chain,
            Binding::Bound(Upstream::Parent(self.clone())),
        ))
    }

    /// Parent position of this view's logical row `index`, scanning forward
    /// as far as needed.
    pub(crate) fn locate_match(&self, parent: &LazyTable, index: LogicalIndex) -> TableResult<Located> {
        loop {
            let probe_at = {
                let cursor = self.shared.cursor.lock();
                if let Some(&position) = usize::try_from(index).ok().and_then(|i| cursor.matches.get(i)) {
                    return Ok(Located {
                        position,
                        scratch: Vec::new(),
                    });
                }
                if cursor.exhausted {
                    return OutOfRangeSnafu {
                        index,
                        length: TableLength::Finite(cursor.matches.len() as u64),
                    }
                    .fail();
                }
                cursor.next_parent
            };

            let outcome = self.scan_parent_row(parent, probe_at)?;

            let mut cursor = self.shared.cursor.lock();
            if cursor.exhausted || cursor.next_parent != probe_at {
                continue;
            }
            match outcome {
                Scan::End => {
                    cursor.exhausted = true;
                    debug!(
                        "{:?} reached the end of its parent after {} matches",
                        self.shared.name,
                        cursor.matches.len()
                    );
                }
                Scan::Failed => cursor.next_parent += 1,
                Scan::Passed(scratch) => {
                    cursor.matches.push(probe_at);
                    cursor.next_parent += 1;
                    if cursor.matches.len() as u64 > index {
                        return Ok(Located {
                            position: probe_at,
                            scratch,
                        });
                    }
                }
            }
        }
    }

    fn scan_parent_row(&self, parent: &LazyTable, position: LogicalIndex) -> TableResult<Scan> {
        let row = TransientRow::new(parent, position, position);

        let exists = match parent.upstream()? {
            Upstream::Source(source) => match source.pull_length().context(SourceMetadataSnafu)? {
                TableLength::Finite(n) => Ok(position < n),
                TableLength::Unknown if !self.domain().is_empty() => row.value_at(0).map(|_| true),
                TableLength::Unknown | TableLength::Unbounded => Ok(true),
            },
            upstream @ Upstream::Parent(_) => parent.upstream_position_of(&upstream, position).map(|_| true),
        };
        match exists {
            Ok(true) => {}
            Ok(false) => return Ok(Scan::End),
            Err(err) if err.is_out_of_range() => return Ok(Scan::End),
            Err(err) => return Err(err),
        }

        match self.shared.filters.evaluate(&row) {
            Ok(true) => Ok(Scan::Passed(row.into_scratch())),
            Ok(false) => Ok(Scan::Failed),
            Err(err) if err.is_out_of_range() => Ok(Scan::End),
            Err(err) => Err(err),
        }
    }

    /// Full length of a derived view: finite parents are scanned to the end,
    /// unknown or unbounded parents pass their length through.
    pub(crate) fn derived_full_length(&self, parent: &LazyTable) -> TableResult<TableLength> {
        {
            let cursor = self.shared.cursor.lock();
            if cursor.exhausted {
                return Ok(TableLength::Finite(cursor.matches.len() as u64));
            }
        }

        match parent.len(LengthMode::Full)? {
            TableLength::Finite(_) => loop {
                let next = self.shared.cursor.lock().matches.len() as u64;
                match self.locate_match(parent, next) {
                    Ok(_) => continue,
                    Err(err) if err.is_out_of_range() => break Ok(TableLength::Finite(next)),
                    Err(err) => break Err(err),
                }
            },
            other => Ok(other),
        }
    }

    /// Parent rows scanned so far and how many of them matched.
    pub fn scan_progress(&self) -> (LogicalIndex, usize) {
        let cursor = self.shared.cursor.lock();
        (cursor.next_parent, cursor.matches.len())
    }
}

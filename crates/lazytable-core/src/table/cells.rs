//! Cell resolution.
//!
//! An unknown cell is resolved by walking up the upstream chain until some
//! ancestor already knows the value or the root source is reached. Every
//! table on the way that had the row materialized with the cell unknown gets
//! the value written back, so the same cell is never fetched twice.
//!
//! The walk is a loop, not recursion, and no lock is held while a source is
//! called.

use log::trace;
use snafu::prelude::*;

use super::{LazyTable, OutOfRangeSnafu, StoreSnafu, TableResult, UpstreamFetchSnafu, Upstream};
use crate::{
    domain::Domain,
    source::{DataSource, SourceError},
    store::{AttributeOutOfBoundsSnafu, LogicalIndex, MaterializedIndex},
    value::{Cell, Value},
};

/// Tables whose materialized row should receive the resolved value.
type WriteBacks = Vec<(LazyTable, MaterializedIndex)>;

impl LazyTable {
    /// Value of `attribute` in the materialized row at `slot`.
    pub(crate) fn resolve_cell(&self, slot: MaterializedIndex, attribute: usize) -> TableResult<Value> {
        let position = {
            let store = self.shared.store.read();
            match store.cell(slot, attribute).context(StoreSnafu)? {
                Cell::Known(value) => return Ok(value.clone()),
                Cell::Unknown => store.upstream_position(slot).context(StoreSnafu)?,
            }
        };

        let mut pending = vec![(self.clone(), slot)];
        let value = pull_through(self.upstream()?, position, attribute, self.domain(), &mut pending)?;
        Ok(write_back(&pending, attribute, value))
    }

    /// Value of `attribute` in logical row `index`, whether or not the row
    /// is materialized here. Nothing is admitted; ancestors that have the row
    /// materialized still cache what they fetch.
    pub(crate) fn peek_cell(&self, index: LogicalIndex, attribute: usize) -> TableResult<Value> {
        let slot = self.shared.store.read().resolve(index);
        if let Some(slot) = slot {
            return self.resolve_cell(slot, attribute);
        }

        let upstream = self.upstream()?;
        let position = self.upstream_position_of(&upstream, index)?;
        let mut pending = Vec::new();
        let value = pull_through(upstream, position, attribute, self.domain(), &mut pending)?;
        Ok(write_back(&pending, attribute, value))
    }

    /// Position in `upstream` that logical row `index` of this table maps to.
    pub(crate) fn upstream_position_of(
        &self,
        upstream: &Upstream,
        index: LogicalIndex,
    ) -> TableResult<LogicalIndex> {
        match upstream {
            Upstream::Source(_) => Ok(index),
            Upstream::Parent(parent) => Ok(self.locate_match(parent, index)?.position),
        }
    }
}

fn pull_through(
    mut upstream: Upstream,
    mut position: LogicalIndex,
    attribute: usize,
    domain: &Domain,
    pending: &mut WriteBacks,
) -> TableResult<Value> {
    loop {
        let parent = match upstream {
            Upstream::Source(source) => return fetch(source.as_ref(), position, attribute, domain),
            Upstream::Parent(parent) => parent,
        };

        let known = {
            let store = parent.shared.store.read();
            match store.resolve(position) {
                Some(slot) => {
                    let cell = store.cell(slot, attribute).context(StoreSnafu)?.clone();
                    let next = store.upstream_position(slot).context(StoreSnafu)?;
                    Some((slot, cell, next))
                }
                None => None,
            }
        };

        let next_upstream = match known {
            Some((_, Cell::Known(value), _)) => return Ok(value),
            Some((slot, Cell::Unknown, next)) => {
                let next_upstream = parent.upstream()?;
                pending.push((parent, slot));
                position = next;
                next_upstream
            }
            None => {
                let next_upstream = parent.upstream()?;
                position = parent.upstream_position_of(&next_upstream, position)?;
                next_upstream
            }
        };
        upstream = next_upstream;
    }
}

fn fetch(
    source: &dyn DataSource,
    row: LogicalIndex,
    attribute: usize,
    domain: &Domain,
) -> TableResult<Value> {
    let attr = domain
        .attribute(attribute)
        .context(AttributeOutOfBoundsSnafu {
            attribute,
            width: domain.len(),
        })
        .context(StoreSnafu)?;

    trace!("fetching {:?} of upstream row {row}", attr.name());
    match source.pull_cell(row, attr) {
        Ok(value) => Ok(value.conform_to(attr.kind())),
        Err(SourceError::RowOutOfRange { length, .. }) => OutOfRangeSnafu { index: row, length }.fail(),
        Err(source) => Err(source).context(UpstreamFetchSnafu {
            row,
            attribute: attr.name(),
        }),
    }
}

fn write_back(pending: &WriteBacks, attribute: usize, value: Value) -> Value {
    let mut result = None;
    for (table, slot) in pending {
        let stored = table.shared.store.write().fill_cell(*slot, attribute, value.clone());
        if result.is_none() {
            result = stored.ok();
        }
    }
    result.unwrap_or(value)
}

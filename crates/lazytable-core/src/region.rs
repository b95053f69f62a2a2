//! Region of interest: the part of the row space a consumer cares about.
//!
//! A region is an optional logical row window plus closed bounds on
//! attribute values. It is a hint: sources may use it to prioritise work and
//! the prefetcher only admits rows that fall inside it, but foreground reads
//! ignore it entirely.

use std::ops::Range;

use snafu::prelude::*;

use crate::{
    domain::{AttributeRef, Domain},
    filter::RowAccess,
    store::LogicalIndex,
    table::{TableResult, UnknownAttributeSnafu},
};

/// Closed interval `[lo, hi]` on one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBound {
    /// Attribute the bound applies to.
    pub attribute: AttributeRef,
    /// Inclusive lower bound.
    pub lo: f64,
    /// Inclusive upper bound.
    pub hi: f64,
}

/// Consumer-declared region of interest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionOfInterest {
    rows: Option<Range<LogicalIndex>>,
    bounds: Vec<AttributeBound>,
}

impl RegionOfInterest {
    /// The whole table.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Restrict to logical rows in `rows`.
    pub fn with_rows(mut self, rows: Range<LogicalIndex>) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Add the bound `lo <= attribute <= hi`.
    pub fn with_bound(mut self, attribute: impl Into<AttributeRef>, lo: f64, hi: f64) -> Self {
        self.bounds.push(AttributeBound {
            attribute: attribute.into(),
            lo,
            hi,
        });
        self
    }

    /// The row window, if any.
    pub fn rows(&self) -> Option<&Range<LogicalIndex>> {
        self.rows.as_ref()
    }

    /// Attribute bounds.
    pub fn bounds(&self) -> &[AttributeBound] {
        &self.bounds
    }

    /// Whether the region covers the whole table.
    pub fn is_everything(&self) -> bool {
        self.rows.is_none() && self.bounds.is_empty()
    }

    pub(crate) fn resolve(&self, domain: &Domain) -> TableResult<ResolvedRegion> {
        let bounds = self
            .bounds
            .iter()
            .map(|b| {
                domain
                    .resolve(&b.attribute)
                    .map(|pos| (pos, b.lo, b.hi))
                    .context(UnknownAttributeSnafu)
            })
            .collect::<TableResult<Vec<_>>>()?;
        Ok(ResolvedRegion {
            rows: self.rows.clone(),
            bounds,
        })
    }
}

/// A region with attribute references resolved to positions.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedRegion {
    rows: Option<Range<LogicalIndex>>,
    bounds: Vec<(usize, f64, f64)>,
}

impl ResolvedRegion {
    pub(crate) fn rows(&self) -> Option<&Range<LogicalIndex>> {
        self.rows.as_ref()
    }

    pub(crate) fn contains_row(&self, index: LogicalIndex) -> bool {
        self.rows.as_ref().is_none_or(|r| r.contains(&index))
    }

    /// Whether `row` lies inside every bound. Values without a numeric view
    /// (text, missing, NaN) fall outside.
    pub(crate) fn matches(&self, row: &dyn RowAccess) -> TableResult<bool> {
        if !self.contains_row(row.logical_index()) {
            return Ok(false);
        }
        for (pos, lo, hi) in &self.bounds {
            let inside = row
                .value_at(*pos)?
                .as_f64()
                .is_some_and(|v| *lo <= v && v <= *hi);
            if !inside {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

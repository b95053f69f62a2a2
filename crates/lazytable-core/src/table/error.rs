//! Error types and SNAFU context selectors for `table`.
//!
//! `TableError` is the single error type surfaced by `LazyTable` and its row
//! views. Selectors are `pub(crate)` so the sibling modules (and the filter
//! and region modules) can attach context without widening the public API.

use snafu::prelude::*;

use crate::{
    domain::DomainError,
    source::{SourceError, TableLength},
    store::{LogicalIndex, StoreError},
};

/// Errors from lazy table operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TableError {
    /// The logical index is not inside the table.
    #[snafu(display("Row {index} is out of range (length {length})"))]
    OutOfRange {
        /// Requested logical index.
        index: LogicalIndex,
        /// Table length as known when the request failed.
        length: TableLength,
    },

    /// Fetching a cell from the upstream source failed. The cell stays
    /// unknown and a later read retries.
    #[snafu(display("Failed to fetch {attribute:?} of upstream row {row}: {source}"))]
    UpstreamFetch {
        /// Upstream row position.
        row: LogicalIndex,
        /// Attribute name.
        attribute: String,
        /// Underlying source error.
        source: SourceError,
    },

    /// The upstream source could not report its schema or length.
    #[snafu(display("Failed to read source metadata: {source}"))]
    SourceMetadata {
        /// Underlying source error.
        source: SourceError,
    },

    /// Domains of the two tables (or of table and source) differ.
    #[snafu(display("Schema mismatch: {source}"))]
    SchemaMismatch {
        /// What differs.
        source: DomainError,
    },

    /// An attribute reference did not resolve against the table's domain.
    #[snafu(display("Attribute lookup failed: {source}"))]
    UnknownAttribute {
        /// Resolution failure.
        source: DomainError,
    },

    /// The table was created from a domain alone and has no upstream yet.
    #[snafu(display("Table {table:?} has no upstream bound"))]
    NotBound {
        /// Table name.
        table: String,
    },

    /// The table already has an upstream.
    #[snafu(display("Table {table:?} is already bound to an upstream"))]
    AlreadyBound {
        /// Table name.
        table: String,
    },

    /// The table was torn down; its upstream is gone.
    #[snafu(display("Table {table:?} has been torn down"))]
    TornDown {
        /// Table name.
        table: String,
    },

    /// The row exists upstream but this table's filters reject it.
    #[snafu(display("Row {index} is rejected by the table's filters"))]
    RowRejected {
        /// Requested logical index.
        index: LogicalIndex,
    },

    /// Internal store bookkeeping failed.
    #[snafu(display("Materialized store error: {source}"))]
    Store {
        /// Underlying store error.
        source: StoreError,
    },

    /// Background prefetching needs a Tokio runtime on the calling thread.
    #[snafu(display("Cannot start prefetching outside a Tokio runtime: {source}"))]
    PrefetchRuntime {
        /// Why no runtime handle was available.
        source: tokio::runtime::TryCurrentError,
    },
}

impl TableError {
    /// Whether this error means "no such row".
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, TableError::OutOfRange { .. })
    }

    /// Whether retrying the same read later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TableError::UpstreamFetch {
                source: SourceError::Io { .. }
                    | SourceError::Fetch { .. }
                    | SourceError::Timeout { .. },
                ..
            }
        )
    }
}

/// Convenience alias for table results.
pub type TableResult<T> = Result<T, TableError>;

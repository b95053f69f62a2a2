//! The upstream contract a lazy table pulls from.
//!
//! A [`DataSource`] answers four questions: what the schema is, how many rows
//! there are, what one cell holds, and (optionally) which region the consumer
//! currently cares about. Every call may be slow; the table never holds a lock
//! across one.

use std::{fmt, sync::Arc};

use snafu::prelude::*;

use crate::{
    domain::{Attribute, Domain},
    region::RegionOfInterest,
    store::LogicalIndex,
    value::Value,
};

/// Row count of a table or source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLength {
    /// Exactly this many rows.
    Finite(u64),
    /// Not known yet; rows are discovered by probing.
    Unknown,
    /// Rows never run out.
    Unbounded,
}

impl TableLength {
    /// Whether `index` may exist under this length.
    pub fn admits(&self, index: LogicalIndex) -> bool {
        match self {
            TableLength::Finite(n) => index < *n,
            TableLength::Unknown | TableLength::Unbounded => true,
        }
    }

    /// The count, if finite.
    pub fn as_finite(&self) -> Option<u64> {
        match self {
            TableLength::Finite(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for TableLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableLength::Finite(n) => write!(f, "{n}"),
            TableLength::Unknown => f.write_str("unknown"),
            TableLength::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// How cheaply a source can jump to an arbitrary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAccess {
    /// Any row costs about the same.
    RandomAccess,
    /// Rows are best read in ascending order.
    Sequential,
}

/// Failures reported by a data source.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// The row does not exist.
    #[snafu(display("Row {row} is beyond the end of the source ({length})"))]
    RowOutOfRange {
        /// Requested row.
        row: LogicalIndex,
        /// Length as known to the source.
        length: TableLength,
    },

    /// The source does not provide this attribute.
    #[snafu(display("Source has no attribute named {name:?}"))]
    NoSuchAttribute {
        /// Requested attribute name.
        name: String,
    },

    /// I/O failure while reading.
    #[snafu(display("I/O error while {action}: {source}"))]
    Io {
        /// What was being done.
        action: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Stored data could not be decoded.
    #[snafu(display("Malformed data: {message}"))]
    Malformed {
        /// Description of the problem.
        message: String,
    },

    /// Generic fetch failure.
    #[snafu(display("Fetch failed: {message}"))]
    Fetch {
        /// Description of the failure.
        message: String,
    },

    /// The source did not answer in time.
    #[snafu(display("Source timed out after {elapsed_ms} ms"))]
    Timeout {
        /// Time waited.
        elapsed_ms: u64,
    },

    /// The source went away.
    #[snafu(display("Source disconnected"))]
    Disconnected,
}

/// Convenience alias for source results.
pub type SourceResult<T> = Result<T, SourceError>;

/// Pull-based upstream of a lazy table.
///
/// Implementations must be safe to call from several threads at once: the
/// foreground reader and the background prefetcher share one source.
pub trait DataSource: Send + Sync {
    /// The schema of every row.
    fn pull_domain(&self) -> SourceResult<Domain>;

    /// Current row count.
    fn pull_length(&self) -> SourceResult<TableLength>;

    /// Value of `attribute` in `row`.
    ///
    /// Rows past the end must fail with [`SourceError::RowOutOfRange`].
    fn pull_cell(&self, row: LogicalIndex, attribute: &Attribute) -> SourceResult<Value>;

    /// Hint that the consumer is interested in `region`. The default ignores
    /// it.
    fn pull_region_of_interest(&self, region: &RegionOfInterest) -> SourceResult<()> {
        let _ = region;
        Ok(())
    }

    /// Access pattern the source prefers.
    fn access(&self) -> SourceAccess {
        SourceAccess::RandomAccess
    }

    /// Release resources. Called once on teardown; errors are logged and
    /// otherwise ignored.
    fn close(&self) -> SourceResult<()> {
        Ok(())
    }
}

impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn pull_domain(&self) -> SourceResult<Domain> {
        (**self).pull_domain()
    }

    fn pull_length(&self) -> SourceResult<TableLength> {
        (**self).pull_length()
    }

    fn pull_cell(&self, row: LogicalIndex, attribute: &Attribute) -> SourceResult<Value> {
        (**self).pull_cell(row, attribute)
    }

    fn pull_region_of_interest(&self, region: &RegionOfInterest) -> SourceResult<()> {
        (**self).pull_region_of_interest(region)
    }

    fn access(&self) -> SourceAccess {
        (**self).access()
    }

    fn close(&self) -> SourceResult<()> {
        (**self).close()
    }
}

/// An in-memory, row-major source. Mostly useful for tests and for wrapping
/// already-loaded data.
#[derive(Debug, Clone)]
pub struct MemorySource {
    domain: Domain,
    rows: Vec<Vec<Value>>,
}

impl MemorySource {
    /// Source over `rows`, each of which must have one value per attribute.
    pub fn new(domain: Domain, rows: Vec<Vec<Value>>) -> SourceResult<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != domain.len())
        {
            return MalformedSnafu {
                message: format!(
                    "row {idx} has {} values, domain has {} attributes",
                    row.len(),
                    domain.len()
                ),
            }
            .fail();
        }
        Ok(Self { domain, rows })
    }

    /// Single continuous feature column named `name`.
    pub fn single_column(name: &str, values: &[f64]) -> SourceResult<Self> {
        let domain = Domain::from_features(vec![Attribute::continuous(name)]).map_err(|e| {
            SourceError::Malformed {
                message: e.to_string(),
            }
        })?;
        let rows = values.iter().map(|v| vec![Value::Continuous(*v)]).collect();
        Ok(Self { domain, rows })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the source holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DataSource for MemorySource {
    fn pull_domain(&self) -> SourceResult<Domain> {
        Ok(self.domain.clone())
    }

    fn pull_length(&self) -> SourceResult<TableLength> {
        Ok(TableLength::Finite(self.rows.len() as u64))
    }

    fn pull_cell(&self, row: LogicalIndex, attribute: &Attribute) -> SourceResult<Value> {
        let pos = self
            .domain
            .position_of(attribute.name())
            .context(NoSuchAttributeSnafu {
                name: attribute.name(),
            })?;
        let values = usize::try_from(row)
            .ok()
            .and_then(|r| self.rows.get(r))
            .context(RowOutOfRangeSnafu {
                row,
                length: TableLength::Finite(self.rows.len() as u64),
            })?;
        Ok(values[pos].clone())
    }
}

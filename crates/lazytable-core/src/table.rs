//! Lazily materialized table handle.
//!
//! A [`LazyTable`] is a cheap, cloneable handle to shared table state:
//!
//! - an immutable [`Domain`] and [`FilterChain`],
//! - a [`MaterializedStore`] guarded by a `parking_lot::RwLock`,
//! - exactly one upstream: a [`DataSource`] or a parent table,
//! - optional region-of-interest and background prefetch state.
//!
//! Reads go through [`LazyTable::get`] and the iterators in `iter`. Cells are
//! fetched on first access and cached; rows are admitted to the store the
//! first time they are addressed and pass the filter chain.
//!
//! Locks are held only for bookkeeping. Upstream calls, which may be slow or
//! may re-enter a parent table, always run with no lock held.
//!
//! Submodules:
//! - `error`: `TableError` and its context selectors.
//! - `cells`: cell resolution up the parent chain, with write-back.
//! - `admission`: the Unseen -> Evaluating -> Materialized row lifecycle.
//! - `derive`: filtered views over a parent table.
//! - `extend`: concatenation.
//! - `iter` / `row_view`: iteration and row handles.
//! - `prefetch`: region of interest and the background prefetcher.
//! - `stats`: summary statistics over materialized cells.

use std::{fmt, ops::Range, sync::Arc};

use log::{Level, debug, log};
use parking_lot::{Mutex, RwLock};
use snafu::prelude::*;

use crate::{
    coverage::{Coverage, window},
    domain::{Domain, ensure_compatible},
    filter::{FilterChain, Predicate},
    source::{DataSource, SourceError, TableLength},
    store::{LogicalIndex, MaterializedIndex, MaterializedStore},
};

mod admission;
mod cells;
mod derive;
pub mod error;
mod extend;
pub mod iter;
pub mod prefetch;
pub mod row_view;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_util;

pub(crate) use error::*;
pub use error::{TableError, TableResult};
pub use iter::{MaterializedRows, Rows};
pub use prefetch::{CycleReport, PrefetchConfig};
pub use row_view::RowView;
pub use stats::AttributeStats;

use derive::ScanCursor;
use prefetch::{PrefetchHandle, RegionState};

/// Which length [`LazyTable::len`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthMode {
    /// Logical length of the table as seen through its upstream.
    Full,
    /// Number of rows currently materialized.
    Materialized,
}

/// Bound upstream of a table.
#[derive(Clone)]
pub(crate) enum Upstream {
    Source(Arc<dyn DataSource>),
    Parent(LazyTable),
}

enum Binding {
    Unbound,
    Bound(Upstream),
    TornDown,
}

pub(crate) struct TableShared {
    name: String,
    domain: Arc<Domain>,
    filters: FilterChain,
    store: RwLock<MaterializedStore>,
    binding: RwLock<Binding>,
    cursor: Mutex<ScanCursor>,
    region: Mutex<RegionState>,
    prefetch: Mutex<Option<PrefetchHandle>>,
}

impl Drop for TableShared {
    fn drop(&mut self) {
        if let Some(handle) = self.prefetch.get_mut().take() {
            handle.signal_stop();
        }
    }
}

/// Handle to a lazily materialized table.
#[derive(Clone)]
pub struct LazyTable {
    pub(crate) shared: Arc<TableShared>,
}

impl fmt::Debug for LazyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTable")
            .field("name", &self.shared.name)
            .field("attributes", &self.shared.domain.len())
            .field("filters", &self.shared.filters.len())
            .field("materialized", &self.materialized_len())
            .finish_non_exhaustive()
    }
}

/// Builder for source-bound and unbound tables.
#[derive(Default)]
pub struct LazyTableBuilder {
    name: Option<String>,
    domain: Option<Domain>,
    source: Option<Arc<dyn DataSource>>,
    predicates: Vec<Predicate>,
}

impl LazyTableBuilder {
    /// Display name used in logs and errors.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declared domain. When a source is also given, the source's domain
    /// must be compatible with it.
    pub fn domain(mut self, domain: Domain) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Upstream source.
    pub fn source(self, source: impl DataSource + 'static) -> Self {
        self.shared_source(Arc::new(source))
    }

    /// Upstream source shared with other owners.
    pub fn shared_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Filter applied when rows are admitted.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Build the table. Without a source the table is unbound and must be
    /// bound with [`LazyTable::bind_source`] before cells can be fetched.
    pub fn build(self) -> TableResult<LazyTable> {
        let name = self.name.unwrap_or_else(|| "table".to_string());
        let domain = match (self.domain, &self.source) {
            (Some(declared), Some(source)) => {
                let pulled = source.pull_domain().context(SourceMetadataSnafu)?;
                ensure_compatible(&declared, &pulled).context(SchemaMismatchSnafu)?;
                declared
            }
            (None, Some(source)) => source.pull_domain().context(SourceMetadataSnafu)?,
            (Some(declared), None) => declared,
            (None, None) => return NotBoundSnafu { table: name }.fail(),
        };

        let mut filters = FilterChain::new();
        for predicate in &self.predicates {
            filters.push(predicate.compile(&domain).context(UnknownAttributeSnafu)?);
        }

        let binding = match self.source {
            Some(source) => Binding::Bound(Upstream::Source(source)),
            None => Binding::Unbound,
        };
        Ok(LazyTable::from_parts(name, Arc::new(domain), filters, binding))
    }
}

impl LazyTable {
    /// Start building a table.
    pub fn builder() -> LazyTableBuilder {
        LazyTableBuilder::default()
    }

    /// Unfiltered table over `source`, adopting the source's domain.
    pub fn from_source(source: impl DataSource + 'static) -> TableResult<Self> {
        Self::builder().source(source).build()
    }

    /// Unbound table with `domain`.
    pub fn from_domain(domain: Domain) -> Self {
        Self::from_parts(
            "table".to_string(),
            Arc::new(domain),
            FilterChain::new(),
            Binding::Unbound,
        )
    }

    fn from_parts(name: String, domain: Arc<Domain>, filters: FilterChain, binding: Binding) -> Self {
        let store = MaterializedStore::new(&domain);
        Self {
            shared: Arc::new(TableShared {
                name,
                domain,
                filters,
                store: RwLock::new(store),
                binding: RwLock::new(binding),
                cursor: Mutex::new(ScanCursor::default()),
                region: Mutex::new(RegionState::default()),
                prefetch: Mutex::new(None),
            }),
        }
    }

    /// Bind an unbound table to `source`.
    pub fn bind_source(&self, source: Arc<dyn DataSource>) -> TableResult<()> {
        let pulled = source.pull_domain().context(SourceMetadataSnafu)?;
        ensure_compatible(&self.shared.domain, &pulled).context(SchemaMismatchSnafu)?;

        let mut binding = self.shared.binding.write();
        match &*binding {
            Binding::Unbound => {
                *binding = Binding::Bound(Upstream::Source(source));
                debug!("table {:?} bound to source", self.shared.name);
                Ok(())
            }
            Binding::Bound(_) => AlreadyBoundSnafu {
                table: self.name(),
            }
            .fail(),
            Binding::TornDown => TornDownSnafu { table: self.name() }.fail(),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Schema shared by every row.
    pub fn domain(&self) -> &Domain {
        &self.shared.domain
    }

    /// Filters applied at admission (the full chain, for derived views).
    pub fn filters(&self) -> &FilterChain {
        &self.shared.filters
    }

    /// Whether both handles refer to the same table.
    pub fn ptr_eq(&self, other: &LazyTable) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Parent table, for derived views.
    pub fn parent(&self) -> Option<LazyTable> {
        match &*self.shared.binding.read() {
            Binding::Bound(Upstream::Parent(parent)) => Some(parent.clone()),
            _ => None,
        }
    }

    /// Whether [`LazyTable::teardown`] has run.
    pub fn is_torn_down(&self) -> bool {
        matches!(*self.shared.binding.read(), Binding::TornDown)
    }

    pub(crate) fn upstream(&self) -> TableResult<Upstream> {
        match &*self.shared.binding.read() {
            Binding::Bound(upstream) => Ok(upstream.clone()),
            Binding::Unbound => NotBoundSnafu { table: self.name() }.fail(),
            Binding::TornDown => TornDownSnafu { table: self.name() }.fail(),
        }
    }

    /// Length of the table.
    ///
    /// `Materialized` counts admitted rows and never touches upstream.
    /// `Full` asks upstream: a source-bound table reports the source length;
    /// a derived view over a finite parent scans the parent to the end, and
    /// inherits `Unknown` / `Unbounded` otherwise.
    pub fn len(&self, mode: LengthMode) -> TableResult<TableLength> {
        match mode {
            LengthMode::Materialized => Ok(TableLength::Finite(self.materialized_len() as u64)),
            LengthMode::Full => match self.upstream()? {
                Upstream::Source(source) => source.pull_length().context(SourceMetadataSnafu),
                Upstream::Parent(parent) => self.derived_full_length(&parent),
            },
        }
    }

    /// Number of materialized rows.
    pub fn materialized_len(&self) -> usize {
        self.shared.store.read().len()
    }

    /// Whether `index` is materialized.
    pub fn is_materialized(&self, index: LogicalIndex) -> bool {
        self.shared.store.read().resolve(index).is_some()
    }

    /// Snapshot of the materialized logical indices.
    pub fn coverage(&self) -> Coverage {
        self.shared.store.read().coverage().clone()
    }

    /// Fraction of logical rows in `rows` that are materialized.
    pub fn coverage_ratio(&self, rows: Range<LogicalIndex>) -> f64 {
        self.shared.store.read().coverage().coverage_ratio(&window(rows))
    }

    /// Whether any materialized row carries a non-default weight.
    pub fn has_weights(&self) -> bool {
        self.shared.store.read().has_weights()
    }

    /// Set the weight of a materialized row.
    pub fn set_weight(&self, index: LogicalIndex, weight: f64) -> TableResult<()> {
        let mut store = self.shared.store.write();
        let slot = self.slot_in(&store, index)?;
        store.set_weight(slot, weight).context(StoreSnafu)
    }

    fn slot_in(&self, store: &MaterializedStore, index: LogicalIndex) -> TableResult<MaterializedIndex> {
        store.resolve(index).context(OutOfRangeSnafu {
            index,
            length: TableLength::Finite(store.len() as u64),
        })
    }

    /// Stop prefetching and release the upstream.
    ///
    /// Materialized rows stay readable as long as their cells are known;
    /// anything that needs upstream afterwards fails with
    /// [`TableError::TornDown`]. Calling this twice is harmless.
    pub fn teardown(&self) {
        self.stop_prefetch();
        let previous = std::mem::replace(&mut *self.shared.binding.write(), Binding::TornDown);
        if let Binding::Bound(Upstream::Source(source)) = previous
            && let Err(err) = source.close()
        {
            log!(
                close_failure_level(&err),
                "closing source of table {:?} failed: {err}",
                self.shared.name
            );
        }
        debug!("table {:?} torn down", self.shared.name);
    }
}

/// A source that is already disconnected has nothing left to release.
fn close_failure_level(err: &SourceError) -> Level {
    match err {
        SourceError::Disconnected => Level::Debug,
        _ => Level::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::Attribute,
        source::MemorySource,
        table::test_util::{CountingSource, abcd_source},
    };

    #[test]
    fn builder_adopts_source_domain() {
        let table = LazyTable::from_source(abcd_source()).unwrap();
        assert_eq!(table.domain().len(), 4);
        assert_eq!(table.len(LengthMode::Full).unwrap(), TableLength::Finite(5));
        assert_eq!(table.len(LengthMode::Materialized).unwrap(), TableLength::Finite(0));
    }

    #[test]
    fn builder_rejects_incompatible_declared_domain() {
        let declared = Domain::from_features(vec![Attribute::continuous("zzz")]).unwrap();
        let err = LazyTable::builder()
            .domain(declared)
            .source(abcd_source())
            .build()
            .unwrap_err();
        assert!(matches!(err, TableError::SchemaMismatch { .. }));
    }

    #[test]
    fn unbound_table_refuses_reads_until_bound() {
        let source = abcd_source();
        let table = LazyTable::from_domain(source.pull_domain().unwrap());
        assert!(matches!(table.get(0).unwrap_err(), TableError::NotBound { .. }));

        table.bind_source(Arc::new(source)).unwrap();
        assert!(table.get(0).is_ok());

        let again = table.bind_source(Arc::new(abcd_source())).unwrap_err();
        assert!(matches!(again, TableError::AlreadyBound { .. }));
    }

    #[test]
    fn teardown_keeps_known_cells_and_blocks_fetches() {
        let source = Arc::new(CountingSource::new(abcd_source()));
        let table = LazyTable::builder()
            .shared_source(source.clone())
            .build()
            .unwrap();
        let row = table.get(1).unwrap();
        let a = row.get("a").unwrap();

        table.teardown();
        assert!(table.is_torn_down());
        assert!(source.closed());

        let row = table.get(1).unwrap();
        assert!(row.get("a").unwrap().same_bits(&a));
        assert!(matches!(row.get("b").unwrap_err(), TableError::TornDown { .. }));
        assert!(matches!(table.get(2).unwrap_err(), TableError::TornDown { .. }));

        table.teardown();
    }

    #[test]
    fn disconnected_sources_close_quietly() {
        assert_eq!(close_failure_level(&SourceError::Disconnected), Level::Debug);
        let timeout = SourceError::Timeout { elapsed_ms: 50 };
        assert_eq!(close_failure_level(&timeout), Level::Warn);
    }

    #[test]
    fn weights_default_to_one_and_can_be_set() {
        let table = LazyTable::from_source(MemorySource::single_column("a", &[1.0, 2.0]).unwrap()).unwrap();
        table.get(1).unwrap();
        assert!(!table.has_weights());
        table.set_weight(1, 2.5).unwrap();
        assert!(table.has_weights());
        assert_eq!(table.get(1).unwrap().weight(), 2.5);
        assert!(table.set_weight(0, 1.0).unwrap_err().is_out_of_range());
    }
}

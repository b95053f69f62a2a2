use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::{
    domain::{Attribute, Domain},
    source::{DataSource, FetchSnafu, MemorySource, SourceResult, TableLength},
    store::LogicalIndex,
    value::Value,
};

/// Wraps a source, counting cell pulls and injecting failures on demand.
pub(crate) struct CountingSource<S> {
    inner: S,
    pulls: AtomicUsize,
    failures: AtomicUsize,
    unknown_length: bool,
    closed: AtomicBool,
}

impl<S: DataSource> CountingSource<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            pulls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            unknown_length: false,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_unknown_length(mut self) -> Self {
        self.unknown_length = true;
        self
    }

    /// Make the next `n` cell pulls fail.
    pub(crate) fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn cell_pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<S: DataSource> DataSource for CountingSource<S> {
    fn pull_domain(&self) -> SourceResult<Domain> {
        self.inner.pull_domain()
    }

    fn pull_length(&self) -> SourceResult<TableLength> {
        if self.unknown_length {
            return Ok(TableLength::Unknown);
        }
        self.inner.pull_length()
    }

    fn pull_cell(&self, row: LogicalIndex, attribute: &Attribute) -> SourceResult<Value> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return FetchSnafu {
                message: format!("injected failure for row {row}"),
            }
            .fail();
        }
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.inner.pull_cell(row, attribute)
    }

    fn close(&self) -> SourceResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Two features, a label and a meta column over five rows.
pub(crate) fn abcd_source() -> MemorySource {
    let domain = Domain::new(
        vec![Attribute::continuous("a"), Attribute::continuous("b")],
        vec![Attribute::discrete("class", ["no", "yes"])],
        vec![Attribute::string("id")],
    )
    .unwrap();
    let rows = (0..5u32)
        .map(|i| {
            vec![
                Value::Continuous(f64::from(i) * 1.5),
                Value::Continuous(-f64::from(i)),
                Value::Discrete(i % 2),
                Value::from(format!("row-{i}")),
            ]
        })
        .collect();
    MemorySource::new(domain, rows).unwrap()
}

/// Single feature `x` where row `i` holds `i`.
pub(crate) fn ramp_source(len: u32) -> MemorySource {
    let values: Vec<f64> = (0..len).map(f64::from).collect();
    MemorySource::single_column("x", &values).unwrap()
}

//! Region of interest and background prefetching.
//!
//! The prefetcher is a Tokio task that wakes on a fixed interval (or when the
//! region changes), and runs one *cycle* on the blocking pool:
//!
//! 1. walk up to the root table, the one bound directly to a source;
//! 2. hand the current region to the source as a hint;
//! 3. probe candidate rows of the root in ascending order, starting at the
//!    scan mark, skipping rows that are already resident;
//! 4. admit a candidate only if it passes the root's filters *and* lies in
//!    the region.
//!
//! A cycle stops after `batch_rows` admissions or `max_probes` probes. Fetch
//! failures are logged and counted, never raised; the failed row is retried
//! on a later cycle. The scan mark restarts from the beginning of the region
//! whenever the region changes.
//!
//! The task only holds a weak reference to the table: dropping the last
//! handle ends it.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tokio::{
    runtime::Handle,
    sync::Notify,
    task::JoinHandle,
    time::MissedTickBehavior,
};

use super::{
    LazyTable, PrefetchRuntimeSnafu, SourceMetadataSnafu, TableError, TableResult, TableShared,
    Upstream,
    admission::{Admission, Probe},
};
use crate::{
    coverage::window,
    region::{RegionOfInterest, ResolvedRegion},
    source::{DataSource, SourceAccess, TableLength},
    store::LogicalIndex,
};

/// Prefetcher tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrefetchConfig {
    /// Milliseconds between cycles.
    pub interval_ms: u64,
    /// Maximum rows admitted per cycle.
    pub batch_rows: usize,
    /// Maximum rows probed per cycle, admitted or not.
    pub max_probes: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            batch_rows: 5,
            max_probes: 1000,
        }
    }
}

impl PrefetchConfig {
    /// Interval between cycles, never shorter than one millisecond.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

/// What one prefetch cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Rows probed.
    pub probed: usize,
    /// Rows newly admitted.
    pub admitted: usize,
    /// Rows rejected by the filters or the region.
    pub rejected: usize,
    /// Probes that failed with a fetch error.
    pub failed: usize,
    /// Whether the end of the region (or source) was reached.
    pub exhausted: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RegionState {
    hint: RegionOfInterest,
    resolved: ResolvedRegion,
    generation: u64,
    scan_mark: LogicalIndex,
}

pub(crate) struct PrefetchHandle {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PrefetchHandle {
    pub(crate) fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl LazyTable {
    /// Replace the region of interest.
    ///
    /// The region is forwarded to the root source as a hint, the prefetch
    /// scan restarts from the region's first row, and a running prefetcher
    /// is woken immediately.
    ///
    /// Prefetching always admits into the root table, so on a derived view
    /// the row window is read as root logical indices, not as indices of
    /// the view. Attribute bounds apply to the root row's values.
    pub fn set_region_of_interest(&self, region: RegionOfInterest) -> TableResult<()> {
        let resolved = region.resolve(self.domain())?;
        {
            let mut state = self.shared.region.lock();
            state.hint = region.clone();
            state.resolved = resolved;
            state.generation += 1;
            state.scan_mark = 0;
        }

        if let Ok((_, source)) = self.root_source()
            && let Err(err) = source.pull_region_of_interest(&region)
        {
            debug!("source ignored region hint for {:?}: {err}", self.shared.name);
        }
        if let Some(handle) = self.shared.prefetch.lock().as_ref() {
            handle.wake.notify_one();
        }
        Ok(())
    }

    /// Current region of interest.
    pub fn region_of_interest(&self) -> RegionOfInterest {
        self.shared.region.lock().hint.clone()
    }

    /// Start the background prefetcher on the current Tokio runtime.
    ///
    /// Starting an already running prefetcher is a no-op.
    pub fn start_prefetch(&self, config: PrefetchConfig) -> TableResult<()> {
        let runtime = Handle::try_current().context(PrefetchRuntimeSnafu)?;
        self.upstream()?;

        let mut slot = self.shared.prefetch.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("prefetch for {:?} already running", self.shared.name);
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let task = runtime.spawn(run_ticker(
            Arc::downgrade(&self.shared),
            config.clone(),
            Arc::clone(&stop),
            Arc::clone(&wake),
        ));
        *slot = Some(PrefetchHandle { stop, wake, task });
        debug!(
            "prefetch for {:?} started (every {} ms, {} rows per cycle)",
            self.shared.name, config.interval_ms, config.batch_rows
        );
        Ok(())
    }

    /// Stop the background prefetcher. Once this returns no new probe is
    /// started; a probe already in flight may still complete. Stopping a
    /// table that is not prefetching is a no-op.
    pub fn stop_prefetch(&self) {
        let handle = self.shared.prefetch.lock().take();
        if let Some(handle) = handle {
            handle.signal_stop();
            debug!("prefetch for {:?} stopped", self.shared.name);
        }
    }

    /// Whether a prefetcher is running.
    pub fn is_prefetching(&self) -> bool {
        self.shared
            .prefetch
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one prefetch cycle on the calling thread.
    pub fn prefetch_once(&self, config: &PrefetchConfig) -> TableResult<CycleReport> {
        self.run_cycle(config, &AtomicBool::new(false))
    }

    /// The table bound directly to a source, and that source.
    pub(crate) fn root_source(&self) -> TableResult<(LazyTable, Arc<dyn DataSource>)> {
        let mut table = self.clone();
        loop {
            match table.upstream()? {
                Upstream::Source(source) => return Ok((table, source)),
                Upstream::Parent(parent) => table = parent,
            }
        }
    }

    fn run_cycle(&self, config: &PrefetchConfig, stop: &AtomicBool) -> TableResult<CycleReport> {
        let (hint, region, generation, mark) = {
            let state = self.shared.region.lock();
            (
                state.hint.clone(),
                state.resolved.clone(),
                state.generation,
                state.scan_mark,
            )
        };
        let (root, source) = self.root_source()?;

        if let Err(err) = source.pull_region_of_interest(&hint) {
            debug!("region hint rejected by source of {:?}: {err}", root.shared.name);
        }

        let length = source.pull_length().context(SourceMetadataSnafu)?;
        let start = region.rows().map_or(0, |rows| rows.start).max(mark);
        let mut end = region.rows().map_or(LogicalIndex::MAX, |rows| rows.end);
        if let TableLength::Finite(n) = length {
            end = end.min(n);
        }

        let (candidates, span_end) = candidates(&root, source.access(), start, end, config);

        let mut report = CycleReport::default();
        let mut first_failed = None;
        let mut next_mark = start;
        let mut cut_short = false;

        for index in candidates {
            if stop.load(Ordering::Acquire)
                || report.probed >= config.max_probes
                || report.admitted >= config.batch_rows
            {
                cut_short = true;
                break;
            }
            report.probed += 1;
            next_mark = index + 1;

            match root.probe(index, Admission::RegionOnly(&region)) {
                Ok(Probe::Admitted { fresh, .. }) => {
                    if fresh {
                        report.admitted += 1;
                    }
                }
                Ok(Probe::Rejected) => report.rejected += 1,
                Err(err) if err.is_out_of_range() => {
                    report.exhausted = true;
                    next_mark = index;
                    break;
                }
                Err(err @ (TableError::TornDown { .. } | TableError::NotBound { .. })) => {
                    return Err(err);
                }
                Err(err) => {
                    report.failed += 1;
                    first_failed.get_or_insert(index);
                    warn!("prefetch of row {index} in {:?} failed: {err}", root.shared.name);
                }
            }
        }
        if !cut_short && !report.exhausted {
            next_mark = span_end;
            report.exhausted = span_end >= end;
        }

        {
            let mut state = self.shared.region.lock();
            if state.generation == generation {
                state.scan_mark = first_failed.unwrap_or(next_mark);
            }
        }

        trace!("prefetch cycle on {:?}: {report:?}", root.shared.name);
        Ok(report)
    }
}

/// Candidate rows in `[start, end)`, ascending, plus the end of the span
/// they were drawn from.
///
/// Random-access sources use the coverage bitmap to skip resident rows
/// outright; sequential sources walk every index and let the probe's
/// resident fast path skip them.
fn candidates(
    root: &LazyTable,
    access: SourceAccess,
    start: LogicalIndex,
    end: LogicalIndex,
    config: &PrefetchConfig,
) -> (Box<dyn Iterator<Item = LogicalIndex>>, LogicalIndex) {
    if start >= end {
        return (Box::new(std::iter::empty()), end);
    }
    match access {
        SourceAccess::RandomAccess => {
            let resident = root.coverage();
            let span_end = end.min(
                start
                    .saturating_add(config.max_probes as u64)
                    .saturating_add(resident.cardinality()),
            );
            let runs = resident.missing_runs(&window(start..span_end), None);
            (Box::new(runs.into_iter().flatten()), span_end)
        }
        SourceAccess::Sequential => {
            let span_end = end.min(start.saturating_add(config.max_probes as u64));
            (Box::new(start..span_end), span_end)
        }
    }
}

async fn run_ticker(
    table: Weak<TableShared>,
    config: PrefetchConfig,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wake.notified() => {}
        }
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(shared) = table.upgrade() else {
            break;
        };

        let handle = LazyTable { shared };
        let cycle_config = config.clone();
        let cycle_stop = Arc::clone(&stop);
        let res = tokio::task::spawn_blocking(move || handle.run_cycle(&cycle_config, &cycle_stop)).await;

        match res {
            Ok(Ok(report)) if report.admitted > 0 || report.failed > 0 => {
                debug!(
                    "prefetch admitted {} rows ({} probed, {} failed)",
                    report.admitted, report.probed, report.failed
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(err @ (TableError::TornDown { .. } | TableError::NotBound { .. }))) => {
                debug!("prefetch ending: {err}");
                break;
            }
            Ok(Err(err)) => warn!("prefetch cycle failed: {err}"),
            Err(err) => warn!("prefetch cycle panicked: {err}"),
        }
    }
    trace!("prefetch task exited");
}

//! Residency bookkeeping over logical row indices.
//!
//! A [`Coverage`] records which logical rows of a table have been admitted to
//! its materialized store. It wraps a `roaring::RoaringTreemap` so that sparse
//! residency over very large (or unbounded) index spaces stays compact, and
//! adds the gap queries the prefetcher uses to pick its next candidates.
//!
//! ```
//! use lazytable_core::coverage::{Coverage, window};
//!
//! let cov: Coverage = [0u64, 1, 2, 4, 5, 9].into_iter().collect();
//! let expected = window(0..10);
//!
//! let runs = cov.missing_runs(&expected, None);
//! assert_eq!(runs, vec![3..=3, 6..=8]);
//! assert!((cov.coverage_ratio(&expected) - 0.6).abs() < 1e-9);
//! ```

use std::ops::{Range, RangeInclusive};

use roaring::RoaringTreemap;

/// Logical row indices that are resident in a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Coverage {
    rows: RoaringTreemap,
}

/// Build the expected index set for a half-open window of logical rows.
pub fn window(range: Range<u64>) -> RoaringTreemap {
    let mut rows = RoaringTreemap::new();
    if range.start < range.end {
        rows.insert_range(range);
    }
    rows
}

impl Coverage {
    /// Empty coverage; no row is resident.
    pub fn empty() -> Self {
        Self {
            rows: RoaringTreemap::new(),
        }
    }

    /// Coverage of the dense prefix `0..len`.
    pub fn dense(len: u64) -> Self {
        Self { rows: window(0..len) }
    }

    /// Wrap an existing treemap.
    pub fn from_treemap(rows: RoaringTreemap) -> Self {
        Self { rows }
    }

    /// Borrow the underlying set of resident rows.
    pub fn present(&self) -> &RoaringTreemap {
        &self.rows
    }

    /// Record `row` as resident. Returns `false` if it already was.
    pub fn insert(&mut self, row: u64) -> bool {
        self.rows.insert(row)
    }

    /// Whether `row` is resident.
    pub fn contains(&self, row: u64) -> bool {
        self.rows.contains(row)
    }

    /// Number of resident rows.
    pub fn cardinality(&self) -> u64 {
        self.rows.len()
    }

    /// Union of `self` and `other`.
    pub fn union(&self, other: &Coverage) -> Coverage {
        Coverage {
            rows: &self.rows | &other.rows,
        }
    }

    /// Rows that are expected but not resident (`expected - present`).
    pub fn missing_points(&self, expected: &RoaringTreemap) -> RoaringTreemap {
        let mut missing = expected.clone();
        missing -= &self.rows;
        missing
    }

    /// Group missing rows into contiguous inclusive runs, optionally split
    /// into chunks of at most `max_run_len` rows.
    pub fn missing_runs(
        &self,
        expected: &RoaringTreemap,
        max_run_len: Option<u64>,
    ) -> Vec<RangeInclusive<u64>> {
        let runs = runs_from_treemap(&self.missing_points(expected));
        match max_run_len {
            Some(max_len) => split_runs_by_len(runs, max_len),
            None => runs,
        }
    }

    /// Fraction of `expected` that is resident, in `[0.0, 1.0]`.
    ///
    /// An empty `expected` set counts as fully covered.
    pub fn coverage_ratio(&self, expected: &RoaringTreemap) -> f64 {
        let expected_count = expected.len();
        if expected_count == 0 {
            return 1.0;
        }
        let covered = &self.rows & expected;
        covered.len() as f64 / expected_count as f64
    }

    /// Length of the longest missing run inside `expected`; 0 when nothing
    /// is missing.
    pub fn max_gap_len(&self, expected: &RoaringTreemap) -> u64 {
        runs_from_treemap(&self.missing_points(expected))
            .into_iter()
            .map(|r| r.end() - r.start() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Number of rows in the unbroken resident prefix `0..n`.
    pub fn resident_prefix_len(&self) -> u64 {
        let mut expected = 0u64;
        for row in self.rows.iter() {
            if row != expected {
                break;
            }
            expected += 1;
        }
        expected
    }
}

impl FromIterator<u64> for Coverage {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

fn runs_from_treemap(rows: &RoaringTreemap) -> Vec<RangeInclusive<u64>> {
    let mut out = Vec::new();
    let mut iter = rows.iter();

    let Some(mut start) = iter.next() else {
        return out;
    };
    let mut prev = start;

    for v in iter {
        if v == prev + 1 {
            prev = v;
        } else {
            out.push(start..=prev);
            start = v;
            prev = v;
        }
    }

    out.push(start..=prev);
    out
}

fn split_runs_by_len(runs: Vec<RangeInclusive<u64>>, max_len: u64) -> Vec<RangeInclusive<u64>> {
    if max_len == 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for range in runs {
        let (start, end) = (*range.start(), *range.end());
        let mut cur = start;
        loop {
            let chunk_end = cur.saturating_add(max_len - 1).min(end);
            out.push(cur..=chunk_end);
            if chunk_end == end {
                break;
            }
            cur = chunk_end + 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_coverage_reports_whole_window_missing() {
        let cov = Coverage::empty();
        let expected = window(0..5);

        assert_eq!(cov.missing_points(&expected).len(), 5);
        assert_eq!(cov.missing_runs(&expected, None), vec![0..=4]);
        assert_eq!(cov.coverage_ratio(&expected), 0.0);
        assert_eq!(cov.max_gap_len(&expected), 5);
    }

    #[test]
    fn sparse_rows_split_into_bounded_runs() {
        let mut cov = Coverage::dense(20);
        let mut rows = cov.present().clone();
        for r in [3, 4, 10, 11, 12, 18] {
            rows.remove(r);
        }
        cov = Coverage::from_treemap(rows);
        let expected = window(0..20);

        assert_eq!(
            cov.missing_runs(&expected, None),
            vec![3..=4, 10..=12, 18..=18]
        );
        assert_eq!(
            cov.missing_runs(&expected, Some(2)),
            vec![3..=4, 10..=11, 12..=12, 18..=18]
        );
        assert_eq!(cov.max_gap_len(&expected), 3);
        assert_eq!(cov.resident_prefix_len(), 3);
    }

    #[test]
    fn huge_indices_stay_addressable() {
        let far = u64::from(u32::MAX) * 4 + 7;
        let mut cov = Coverage::empty();
        assert!(cov.insert(far));
        assert!(!cov.insert(far));
        assert!(cov.contains(far));

        let expected = window(far - 2..far + 2);
        assert_eq!(cov.missing_runs(&expected, None), vec![far - 2..=far - 1, far + 1..=far + 1]);
    }

    #[test]
    fn empty_expected_is_vacuously_covered() {
        let cov = Coverage::dense(10);
        let expected = window(5..5);
        assert!(cov.missing_points(&expected).is_empty());
        assert_eq!(cov.coverage_ratio(&expected), 1.0);
        assert_eq!(cov.max_gap_len(&expected), 0);
    }

    #[test]
    fn zero_max_run_len_yields_no_runs() {
        let cov = Coverage::empty();
        assert!(cov.missing_runs(&window(0..3), Some(0)).is_empty());
    }
}

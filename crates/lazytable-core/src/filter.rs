//! Row predicates and filter chains.
//!
//! Callers describe filters as [`Predicate`]s that name attributes however
//! they like. A predicate is compiled against a domain into a [`Filter`] with
//! resolved positions, and filters are stacked into a [`FilterChain`]. A row
//! passes a chain when it passes every filter; evaluation short-circuits, so
//! cells of later filters are never fetched for a row an earlier one rejects.

use std::{fmt, sync::Arc};

use snafu::prelude::*;

use crate::{
    domain::{AttributeRef, Domain, DomainResult},
    store::LogicalIndex,
    table::{TableError, TableResult, UnknownAttributeSnafu},
    value::Value,
};

/// Read access to one row while a predicate evaluates it.
///
/// Implemented by admitted rows and by transient rows that are still being
/// evaluated; in both cases `value_at` may fetch from upstream.
pub trait RowAccess {
    /// Schema of the row.
    fn domain(&self) -> &Domain;

    /// Logical index of the row in the table being evaluated.
    fn logical_index(&self) -> LogicalIndex;

    /// Value at a resolved attribute position.
    fn value_at(&self, position: usize) -> TableResult<Value>;

    /// Value of any attribute reference.
    fn value(&self, attribute: &AttributeRef) -> TableResult<Value> {
        let position = self
            .domain()
            .resolve(attribute)
            .context(UnknownAttributeSnafu)?;
        self.value_at(position)
    }

    /// Value of the attribute called `name`.
    fn value_by_name(&self, name: &str) -> TableResult<Value> {
        self.value(&AttributeRef::from(name))
    }
}

/// Numeric test applied to one attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Comparison {
    /// `v < x`
    Less(f64),
    /// `v <= x`
    LessEqual(f64),
    /// `v > x`
    Greater(f64),
    /// `v >= x`
    GreaterEqual(f64),
    /// `v == x`
    Equal(f64),
    /// `v != x`
    NotEqual(f64),
    /// `lo <= v <= hi`
    Between(f64, f64),
    /// `v < lo || v > hi`
    Outside(f64, f64),
}

impl Comparison {
    /// Apply the test. NaN fails every comparison, `NotEqual` included.
    pub fn holds(&self, v: f64) -> bool {
        if v.is_nan() {
            return false;
        }
        match *self {
            Comparison::Less(x) => v < x,
            Comparison::LessEqual(x) => v <= x,
            Comparison::Greater(x) => v > x,
            Comparison::GreaterEqual(x) => v >= x,
            Comparison::Equal(x) => v == x,
            Comparison::NotEqual(x) => v != x,
            Comparison::Between(lo, hi) => lo <= v && v <= hi,
            Comparison::Outside(lo, hi) => v < lo || v > hi,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Less(x) => write!(f, "< {x}"),
            Comparison::LessEqual(x) => write!(f, "<= {x}"),
            Comparison::Greater(x) => write!(f, "> {x}"),
            Comparison::GreaterEqual(x) => write!(f, ">= {x}"),
            Comparison::Equal(x) => write!(f, "== {x}"),
            Comparison::NotEqual(x) => write!(f, "!= {x}"),
            Comparison::Between(lo, hi) => write!(f, "in [{lo}, {hi}]"),
            Comparison::Outside(lo, hi) => write!(f, "outside [{lo}, {hi}]"),
        }
    }
}

type RowTest = dyn Fn(&dyn RowAccess) -> Result<bool, TableError> + Send + Sync;

/// A named caller-supplied predicate.
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    test: Arc<RowTest>,
}

impl CustomPredicate {
    /// Wrap `test` under a display name.
    pub fn new<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&dyn RowAccess) -> Result<bool, TableError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Caller-side predicate description.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Numeric comparison on one attribute.
    Continuous {
        /// Tested attribute.
        attribute: AttributeRef,
        /// The comparison.
        test: Comparison,
    },
    /// Membership of a discrete code in a set.
    Discrete {
        /// Tested attribute.
        attribute: AttributeRef,
        /// Accepted codes.
        codes: Vec<u32>,
    },
    /// Conjunction.
    All(Vec<Predicate>),
    /// Arbitrary row test.
    Custom(CustomPredicate),
}

impl Predicate {
    /// `attribute` compared with `test`.
    pub fn continuous(attribute: impl Into<AttributeRef>, test: Comparison) -> Self {
        Predicate::Continuous {
            attribute: attribute.into(),
            test,
        }
    }

    /// `attribute > x`.
    pub fn greater(attribute: impl Into<AttributeRef>, x: f64) -> Self {
        Self::continuous(attribute, Comparison::Greater(x))
    }

    /// `attribute < x`.
    pub fn less(attribute: impl Into<AttributeRef>, x: f64) -> Self {
        Self::continuous(attribute, Comparison::Less(x))
    }

    /// `lo <= attribute <= hi`.
    pub fn between(attribute: impl Into<AttributeRef>, lo: f64, hi: f64) -> Self {
        Self::continuous(attribute, Comparison::Between(lo, hi))
    }

    /// `attribute` has one of `codes`.
    pub fn one_of(attribute: impl Into<AttributeRef>, codes: impl IntoIterator<Item = u32>) -> Self {
        Predicate::Discrete {
            attribute: attribute.into(),
            codes: codes.into_iter().collect(),
        }
    }

    /// Row test implemented by a closure.
    pub fn custom<F>(name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&dyn RowAccess) -> Result<bool, TableError> + Send + Sync + 'static,
    {
        Predicate::Custom(CustomPredicate::new(name, test))
    }

    /// Resolve attribute references against `domain`.
    pub fn compile(&self, domain: &Domain) -> DomainResult<Filter> {
        Ok(match self {
            Predicate::Continuous { attribute, test } => Filter::Continuous {
                position: domain.resolve(attribute)?,
                test: *test,
            },
            Predicate::Discrete { attribute, codes } => Filter::Discrete {
                position: domain.resolve(attribute)?,
                codes: codes.clone(),
            },
            Predicate::All(parts) => Filter::All(
                parts
                    .iter()
                    .map(|p| p.compile(domain))
                    .collect::<DomainResult<Vec<_>>>()?,
            ),
            Predicate::Custom(custom) => Filter::Custom(custom.clone()),
        })
    }
}

/// A predicate compiled against a domain.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Numeric comparison at a position.
    Continuous {
        /// Attribute position.
        position: usize,
        /// The comparison.
        test: Comparison,
    },
    /// Code membership at a position.
    Discrete {
        /// Attribute position.
        position: usize,
        /// Accepted codes.
        codes: Vec<u32>,
    },
    /// Conjunction.
    All(Vec<Filter>),
    /// Arbitrary row test.
    Custom(CustomPredicate),
}

impl Filter {
    /// Evaluate against `row`, fetching only the cells the filter needs.
    pub fn evaluate(&self, row: &dyn RowAccess) -> TableResult<bool> {
        match self {
            Filter::Continuous { position, test } => Ok(row
                .value_at(*position)?
                .as_f64()
                .is_some_and(|v| test.holds(v))),
            Filter::Discrete { position, codes } => Ok(row
                .value_at(*position)?
                .as_code()
                .is_some_and(|c| codes.contains(&c))),
            Filter::All(parts) => {
                for part in parts {
                    if !part.evaluate(row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Custom(custom) => (custom.test)(row),
        }
    }
}

/// Ordered conjunction of filters. Cheap to clone; derived views copy their
/// parent's chain and append to the copy.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<Filter>>,
}

impl FilterChain {
    /// Chain that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter.
    pub fn push(&mut self, filter: Filter) {
        self.filters.push(Arc::new(filter));
    }

    /// Copy of this chain with `filter` appended.
    pub fn with(&self, filter: Filter) -> Self {
        let mut chain = self.clone();
        chain.push(filter);
        chain
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain accepts everything.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether `row` passes every filter, in order.
    pub fn evaluate(&self, row: &dyn RowAccess) -> TableResult<bool> {
        for filter in &self.filters {
            if !filter.evaluate(row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod test_row {
    use std::cell::RefCell;

    use super::RowAccess;
    use crate::{domain::Domain, store::LogicalIndex, table::TableResult, value::Value};

    /// In-memory row that records which positions were read.
    pub(crate) struct FixedRow<'a> {
        domain: &'a Domain,
        index: LogicalIndex,
        values: Vec<Value>,
        pub(crate) reads: RefCell<Vec<usize>>,
    }

    impl<'a> FixedRow<'a> {
        pub(crate) fn new(domain: &'a Domain, index: LogicalIndex, values: Vec<Value>) -> Self {
            Self {
                domain,
                index,
                values,
                reads: RefCell::new(Vec::new()),
            }
        }
    }

    impl RowAccess for FixedRow<'_> {
        fn domain(&self) -> &Domain {
            self.domain
        }

        fn logical_index(&self) -> LogicalIndex {
            self.index
        }

        fn value_at(&self, position: usize) -> TableResult<Value> {
            self.reads.borrow_mut().push(position);
            Ok(self.values[position].clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_row::FixedRow, *};
    use crate::domain::Attribute;

    fn domain() -> Domain {
        Domain::new(
            vec![Attribute::continuous("a"), Attribute::continuous("b")],
            vec![Attribute::discrete("class", ["x", "y", "z"])],
            vec![],
        )
        .unwrap()
    }

    fn row(d: &Domain, a: f64, b: f64, class: u32) -> FixedRow<'_> {
        FixedRow::new(
            d,
            0,
            vec![Value::Continuous(a), Value::Continuous(b), Value::Discrete(class)],
        )
    }

    #[test]
    fn nan_fails_every_comparison() {
        for test in [
            Comparison::Less(0.0),
            Comparison::Greater(0.0),
            Comparison::Equal(f64::NAN),
            Comparison::NotEqual(0.0),
            Comparison::Outside(0.0, 1.0),
        ] {
            assert!(!test.holds(f64::NAN), "{test}");
        }
    }

    #[test]
    fn discrete_membership_uses_codes() {
        let d = domain();
        let f = Predicate::one_of("class", [0, 2]).compile(&d).unwrap();
        assert!(f.evaluate(&row(&d, 0.0, 0.0, 2)).unwrap());
        assert!(!f.evaluate(&row(&d, 0.0, 0.0, 1)).unwrap());
    }

    #[test]
    fn chain_short_circuits_on_first_rejection() {
        let d = domain();
        let mut chain = FilterChain::new();
        chain.push(Predicate::greater("a", 10.0).compile(&d).unwrap());
        chain.push(Predicate::less("b", 0.0).compile(&d).unwrap());

        let r = row(&d, 1.0, -1.0, 0);
        assert!(!chain.evaluate(&r).unwrap());
        assert_eq!(*r.reads.borrow(), vec![0]);

        let r = row(&d, 11.0, -1.0, 0);
        assert!(chain.evaluate(&r).unwrap());
        assert_eq!(*r.reads.borrow(), vec![0, 1]);
    }

    #[test]
    fn custom_predicates_read_through_row_access() {
        let d = domain();
        let f = Predicate::custom("a_plus_b_positive", |row| {
            let a = row.value_by_name("a")?.as_f64().unwrap_or(f64::NAN);
            let b = row.value_by_name("b")?.as_f64().unwrap_or(f64::NAN);
            Ok(a + b > 0.0)
        })
        .compile(&d)
        .unwrap();
        assert!(f.evaluate(&row(&d, 2.0, -1.0, 0)).unwrap());
        assert!(!f.evaluate(&row(&d, 2.0, -3.0, 0)).unwrap());
    }

    #[test]
    fn compile_fails_on_unknown_attribute() {
        let d = domain();
        let nested = Predicate::All(vec![Predicate::greater("a", 0.0), Predicate::greater("nope", 0.0)]);
        assert!(nested.compile(&d).is_err());
    }
}

//! Procedural tables.
//!
//! A [`GeneratorSource`] owns a domain and one closure per attribute. Cells
//! are computed on demand from a random stream seeded by
//! `(seed, row, attribute)`, so the same cell always reads the same value no
//! matter which thread asks or in which order. A closure may read other
//! cells of its row through [`CellContext::cell`], which is how dependent
//! columns (a feature whose distribution depends on the label, say) are
//! expressed.

use std::{collections::HashMap, fmt, sync::Arc};

use lazytable_core::{
    domain::{Attribute, Domain},
    source::{
        DataSource, MalformedSnafu, NoSuchAttributeSnafu, RowOutOfRangeSnafu, SourceError,
        SourceResult, TableLength,
    },
    value::Value,
};
use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use snafu::prelude::*;

/// Nesting limit for [`CellContext::cell`]; deeper chains are reported as a
/// dependency cycle.
const MAX_DEPTH: usize = 32;

/// Default row count of [`GeneratorSource::two_gaussians`].
pub const DEMO_LENGTH: u64 = 10_000_000;

type CellFn = Arc<dyn Fn(&mut CellContext<'_>) -> SourceResult<Value> + Send + Sync>;

/// What a generator closure sees while producing one cell.
pub struct CellContext<'g> {
    source: &'g GeneratorSource,
    row: u64,
    depth: usize,
    rng: StdRng,
}

impl CellContext<'_> {
    /// Row being generated.
    pub fn row(&self) -> u64 {
        self.row
    }

    /// This cell's random stream.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draw from `N(mean, std_dev)`.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> SourceResult<f64> {
        let dist = Normal::new(mean, std_dev).map_err(|e| SourceError::Malformed {
            message: format!("invalid normal distribution N({mean}, {std_dev}): {e}"),
        })?;
        Ok(dist.sample(&mut self.rng))
    }

    /// Value of another attribute in the same row.
    pub fn cell(&self, name: &str) -> SourceResult<Value> {
        ensure!(
            self.depth < MAX_DEPTH,
            MalformedSnafu {
                message: format!("generator dependency cycle through {name:?}"),
            }
        );
        let pos = self.source.position(name)?;
        self.source.generate(self.row, pos, self.depth + 1)
    }
}

/// Source whose cells are generated on demand.
#[derive(Clone)]
pub struct GeneratorSource {
    seed: u64,
    length: TableLength,
    domain: Domain,
    generators: Vec<CellFn>,
    positions: HashMap<String, usize>,
}

impl fmt::Debug for GeneratorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorSource")
            .field("seed", &self.seed)
            .field("length", &self.length)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl GeneratorSource {
    /// Start building a generator seeded with `seed`.
    pub fn builder(seed: u64) -> GeneratorSourceBuilder {
        GeneratorSourceBuilder {
            seed,
            length: TableLength::Unbounded,
            features: Vec::new(),
            labels: Vec::new(),
            metas: Vec::new(),
        }
    }

    /// Two continuous features `a` and `b` drawn from a Gaussian whose
    /// parameters depend on the binary label `class`.
    ///
    /// | class   | a         | b           |
    /// |---------|-----------|-------------|
    /// | `alpha` | N(1, 2)   | N(-3, 1)    |
    /// | `beta`  | N(5, 2)   | N(1, 0.5)   |
    pub fn two_gaussians(seed: u64) -> SourceResult<Self> {
        fn by_class(
            ctx: &mut CellContext<'_>,
            first: (f64, f64),
            second: (f64, f64),
        ) -> SourceResult<Value> {
            let (mean, std_dev) = match ctx.cell("class")?.as_code() {
                Some(0) => first,
                _ => second,
            };
            ctx.normal(mean, std_dev).map(Value::Continuous)
        }

        Self::builder(seed)
            .length(TableLength::Finite(DEMO_LENGTH))
            .feature(Attribute::continuous("a"), |ctx| {
                by_class(ctx, (1.0, 2.0), (5.0, 2.0))
            })
            .feature(Attribute::continuous("b"), |ctx| {
                by_class(ctx, (-3.0, 1.0), (1.0, 0.5))
            })
            .label(Attribute::discrete("class", ["alpha", "beta"]), |ctx| {
                Ok(Value::Discrete(ctx.rng().random_range(0..2)))
            })
            .build()
    }

    /// Same generator with a different length.
    pub fn with_length(mut self, length: TableLength) -> Self {
        self.length = length;
        self
    }

    /// Seed every cell stream is derived from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn position(&self, name: &str) -> SourceResult<usize> {
        self.positions
            .get(name)
            .copied()
            .context(NoSuchAttributeSnafu { name })
    }

    fn generate(&self, row: u64, pos: usize, depth: usize) -> SourceResult<Value> {
        let mut ctx = CellContext {
            source: self,
            row,
            depth,
            rng: StdRng::seed_from_u64(cell_seed(self.seed, row, pos)),
        };
        (self.generators[pos])(&mut ctx)
    }
}

impl DataSource for GeneratorSource {
    fn pull_domain(&self) -> SourceResult<Domain> {
        Ok(self.domain.clone())
    }

    fn pull_length(&self) -> SourceResult<TableLength> {
        Ok(self.length)
    }

    fn pull_cell(&self, row: u64, attribute: &Attribute) -> SourceResult<Value> {
        ensure!(
            self.length.admits(row),
            RowOutOfRangeSnafu {
                row,
                length: self.length,
            }
        );
        let pos = self.position(attribute.name())?;
        self.generate(row, pos, 0)
    }
}

/// Builder for [`GeneratorSource`].
pub struct GeneratorSourceBuilder {
    seed: u64,
    length: TableLength,
    features: Vec<(Attribute, CellFn)>,
    labels: Vec<(Attribute, CellFn)>,
    metas: Vec<(Attribute, CellFn)>,
}

impl GeneratorSourceBuilder {
    /// Row count; unbounded unless set.
    pub fn length(mut self, length: TableLength) -> Self {
        self.length = length;
        self
    }

    /// Add a feature column.
    pub fn feature<F>(mut self, attribute: Attribute, generate: F) -> Self
    where
        F: Fn(&mut CellContext<'_>) -> SourceResult<Value> + Send + Sync + 'static,
    {
        self.features.push((attribute, Arc::new(generate)));
        self
    }

    /// Add a label column.
    pub fn label<F>(mut self, attribute: Attribute, generate: F) -> Self
    where
        F: Fn(&mut CellContext<'_>) -> SourceResult<Value> + Send + Sync + 'static,
    {
        self.labels.push((attribute, Arc::new(generate)));
        self
    }

    /// Add a metadata column.
    pub fn meta<F>(mut self, attribute: Attribute, generate: F) -> Self
    where
        F: Fn(&mut CellContext<'_>) -> SourceResult<Value> + Send + Sync + 'static,
    {
        self.metas.push((attribute, Arc::new(generate)));
        self
    }

    /// Build the source. Fails on duplicate attribute names.
    pub fn build(self) -> SourceResult<GeneratorSource> {
        let (features, feature_fns): (Vec<_>, Vec<_>) = self.features.into_iter().unzip();
        let (labels, label_fns): (Vec<_>, Vec<_>) = self.labels.into_iter().unzip();
        let (metas, meta_fns): (Vec<_>, Vec<_>) = self.metas.into_iter().unzip();

        let domain = Domain::new(features, labels, metas).map_err(|e| SourceError::Malformed {
            message: e.to_string(),
        })?;
        let generators: Vec<CellFn> = feature_fns
            .into_iter()
            .chain(label_fns)
            .chain(meta_fns)
            .collect();
        let positions = domain
            .attributes()
            .iter()
            .enumerate()
            .map(|(pos, attr)| (attr.name().to_string(), pos))
            .collect();

        debug!(
            "built generator with {} attributes, seed {}, length {}",
            domain.len(),
            self.seed,
            self.length
        );
        Ok(GeneratorSource {
            seed: self.seed,
            length: self.length,
            domain,
            generators,
            positions,
        })
    }
}

/// Mix `(seed, row, attribute)` into one well-spread stream seed.
fn cell_seed(seed: u64, row: u64, attribute: usize) -> u64 {
    let mut z = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(row.wrapping_mul(0xBF58_476D_1CE4_E5B9))
        .wrapping_add((attribute as u64).wrapping_mul(0x94D0_49BB_1331_11EB));
    // splitmix64 finalizer
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_reproducible_and_independent_of_read_order() {
        let source = GeneratorSource::two_gaussians(7).unwrap();
        let a = Attribute::continuous("a");

        let forward: Vec<_> = (0..20).map(|r| source.pull_cell(r, &a).unwrap()).collect();
        let backward: Vec<_> = (0..20)
            .rev()
            .map(|r| source.pull_cell(r, &a).unwrap())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        for (x, y) in forward.iter().zip(&backward) {
            assert!(x.same_bits(y));
        }
    }

    #[test]
    fn different_seeds_give_different_tables() {
        let a = Attribute::continuous("a");
        let one = GeneratorSource::two_gaussians(1).unwrap();
        let two = GeneratorSource::two_gaussians(2).unwrap();
        let differs = (0..10).any(|r| {
            !one.pull_cell(r, &a)
                .unwrap()
                .same_bits(&two.pull_cell(r, &a).unwrap())
        });
        assert!(differs);
    }

    #[test]
    fn features_follow_the_label() {
        let source = GeneratorSource::two_gaussians(42).unwrap();
        let class = Attribute::discrete("class", ["alpha", "beta"]);
        let b = Attribute::continuous("b");

        let (mut alpha, mut beta) = (Vec::new(), Vec::new());
        for row in 0..2000 {
            let label = source.pull_cell(row, &class).unwrap().as_code().unwrap();
            let value = source.pull_cell(row, &b).unwrap().as_f64().unwrap();
            if label == 0 { alpha.push(value) } else { beta.push(value) }
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!(!alpha.is_empty() && !beta.is_empty());
        assert!((mean(&alpha) + 3.0).abs() < 0.3);
        assert!((mean(&beta) - 1.0).abs() < 0.3);
    }

    #[test]
    fn finite_length_is_enforced() {
        let source = GeneratorSource::two_gaussians(0)
            .unwrap()
            .with_length(TableLength::Finite(3));
        let err = source.pull_cell(3, &Attribute::continuous("a")).unwrap_err();
        assert!(matches!(err, SourceError::RowOutOfRange { row: 3, .. }));
    }

    #[test]
    fn self_referencing_generators_are_reported() {
        let source = GeneratorSource::builder(0)
            .feature(Attribute::continuous("loop"), |ctx| ctx.cell("loop"))
            .build()
            .unwrap();
        let err = source
            .pull_cell(0, &Attribute::continuous("loop"))
            .unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = GeneratorSource::builder(0)
            .feature(Attribute::continuous("x"), |_| Ok(Value::Continuous(0.0)))
            .meta(Attribute::string("x"), |_| Ok(Value::from("x")))
            .build();
        assert!(result.is_err());
    }
}

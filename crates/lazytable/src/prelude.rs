//! Wrapper prelude.
//!
//! The `lazytable` crate is the supported public entry point. Downstream code
//! should prefer importing from this prelude instead of depending on internal
//! core module paths.

pub use crate::coverage;
pub use crate::{
    Attribute, AttributeKind, Comparison, DataSource, Domain, LazyTable, LengthMode,
    MemorySource, Predicate, PrefetchConfig, RegionOfInterest, RowAccess, TableError,
    TableLength, Value,
};

#[cfg(feature = "sources")]
pub use crate::{FixedWidthSource, GeneratorSource};

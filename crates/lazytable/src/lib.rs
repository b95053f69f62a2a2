//! # lazytable
//!
//! Tables that look complete but only hold what has been read.
//!
//! A [`LazyTable`] wraps a pull-based [`DataSource`] and materializes rows
//! and cells the first time they are touched. Filtered views are derived
//! lazily on top, and a background prefetcher can fill a region of interest
//! ahead of the reader.
//!
//! This crate is the supported public entry point and provides a small,
//! stable surface.
//!
//! ## Features
//!
//! - `sources` (default): fixed-width file and generator sources
//!
//! ## Example
//!
//! ```rust
//! use lazytable::prelude::*;
//!
//! let source = MemorySource::single_column("a", &[1.0, 20.0, 3.0, 40.0]).unwrap();
//! let table = LazyTable::from_source(source).unwrap();
//! let big = table.derive(Predicate::greater("a", 10.0)).unwrap();
//! assert_eq!(big.len(LengthMode::Full).unwrap(), TableLength::Finite(2));
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Coverage namespace (wrapper-only).
pub mod coverage {
    pub use lazytable_core::coverage::Coverage;
}

/// Concrete sources (enabled by default).
#[cfg(feature = "sources")]
pub mod sources {
    pub use lazytable_sources::*;
}

pub use lazytable_core::domain::{Attribute, AttributeKind, AttributeRef, Domain, Role};
pub use lazytable_core::filter::{Comparison, Predicate, RowAccess};
pub use lazytable_core::region::RegionOfInterest;
pub use lazytable_core::source::{
    DataSource, MemorySource, SourceAccess, SourceError, SourceResult, TableLength,
};
pub use lazytable_core::table::{
    AttributeStats, CycleReport, LazyTable, LazyTableBuilder, LengthMode, PrefetchConfig,
    RowView, TableError, TableResult,
};
pub use lazytable_core::value::{Cell, Value};

/// File and generator sources at the crate root (enabled by default).
#[cfg(feature = "sources")]
pub use lazytable_sources::{FixedWidthSource, GeneratorSource};

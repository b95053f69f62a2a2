//! Concrete [`DataSource`](lazytable_core::source::DataSource)
//! implementations for lazytable.
//!
//! - [`fixed_width`]: text files whose columns have a fixed byte width, so
//!   any cell can be read with a single seek.
//! - [`convert`]: turns tab-separated files into the fixed-width layout.
//! - [`generator`]: procedural tables whose cells are computed on demand
//!   from a deterministic per-cell random stream.
#![deny(missing_docs)]

pub mod convert;
pub mod fixed_width;
pub mod generator;

pub use convert::{ConvertSummary, convert_tab_to_fixed, fixed_path_for};
pub use fixed_width::FixedWidthSource;
pub use generator::{CellContext, GeneratorSource, GeneratorSourceBuilder};

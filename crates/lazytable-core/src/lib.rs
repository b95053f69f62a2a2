//! Core engine for lazily materialized tables.
//!
//! A [`table::LazyTable`] presents a fixed-schema, row-addressable table whose
//! cells are pulled from an upstream [`source::DataSource`] only when they are
//! first read. The crate is organized as:
//!
//! - `domain` / `value`: the schema (ordered attributes grouped by role) and
//!   the cell representation that separates "not yet fetched" from any real
//!   value, NaN included.
//! - `store`: the materialized rows, their identity mapping and weights.
//! - `filter`: composable row predicates evaluated on demand.
//! - `source` / `region`: the upstream contract and the region-of-interest
//!   hint handed to it.
//! - `table`: the handle itself, derived views, concatenation, iteration and
//!   the background prefetcher.
//! - `coverage`: RoaringTreemap-based bookkeeping of which logical rows are
//!   resident.
//!
//! Concrete file-backed and synthetic sources live in `lazytable-sources`.
#![deny(missing_docs)]
pub mod coverage;
pub mod domain;
pub mod filter;
pub mod region;
pub mod source;
pub mod store;
pub mod table;
pub mod value;

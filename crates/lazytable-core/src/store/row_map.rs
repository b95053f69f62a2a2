//! Logical index to materialized slot mapping.

use std::collections::HashMap;

use super::{AlreadyMappedSnafu, LogicalIndex, MaterializedIndex, StoreResult};
use crate::coverage::Coverage;

/// Injective map from logical row index to storage slot.
///
/// Every logical index maps to at most one slot; a second insert for the
/// same index is an error rather than a silent overwrite.
#[derive(Debug, Clone, Default)]
pub struct RowIdentityMap {
    slots: HashMap<LogicalIndex, MaterializedIndex>,
    admitted: Coverage,
}

impl RowIdentityMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity mapping `i -> i` for `0..len`.
    pub fn identity(len: MaterializedIndex) -> Self {
        Self {
            slots: (0..len).map(|slot| (LogicalIndex::from(slot), slot)).collect(),
            admitted: Coverage::dense(u64::from(len)),
        }
    }

    /// Slot of `logical`, if admitted.
    pub fn resolve(&self, logical: LogicalIndex) -> Option<MaterializedIndex> {
        self.slots.get(&logical).copied()
    }

    /// Record `logical -> slot`.
    pub fn insert(&mut self, logical: LogicalIndex, slot: MaterializedIndex) -> StoreResult<()> {
        if let Some(existing) = self.resolve(logical) {
            return AlreadyMappedSnafu {
                logical,
                slot: existing,
            }
            .fail();
        }
        self.slots.insert(logical, slot);
        self.admitted.insert(logical);
        Ok(())
    }

    /// Number of admitted rows.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no row is admitted.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Admitted logical indices.
    pub fn coverage(&self) -> &Coverage {
        &self.admitted
    }

    /// `(logical, slot)` pairs in ascending logical order.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (LogicalIndex, MaterializedIndex)> + '_ {
        self.admitted
            .present()
            .iter()
            .filter_map(|logical| self.resolve(logical).map(|slot| (logical, slot)))
    }
}

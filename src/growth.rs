//! Growth policy: when the slot table is remapped and how large it becomes.

use crate::error::StoreError;
use crate::slots::SlotTable;
use log::debug;

#[derive(Clone, Copy, Debug)]
pub(crate) struct GrowthPolicy {
    multiplier: usize,
    threshold: usize,
}

impl GrowthPolicy {
    pub(crate) fn new(multiplier: usize, threshold: usize) -> Self {
        debug_assert!(multiplier >= 2);
        Self {
            multiplier,
            threshold,
        }
    }

    pub(crate) fn multiplier(&self) -> usize {
        self.multiplier
    }

    pub(crate) fn threshold(&self) -> usize {
        self.threshold
    }

    /// Checked before every insert. Removal never consults the policy.
    pub(crate) fn should_grow(&self, occupied: usize) -> bool {
        occupied >= self.threshold
    }

    /// Remap `table` into `multiplier` times as many slots and advance the
    /// threshold by the same factor. On error the policy and table are
    /// unchanged.
    pub(crate) fn grow(&mut self, table: &SlotTable) -> Result<SlotTable, StoreError> {
        let len = table
            .len()
            .checked_mul(self.multiplier)
            .ok_or(StoreError::CapacityOverflow)?;
        let threshold = self
            .threshold
            .checked_mul(self.multiplier)
            .ok_or(StoreError::CapacityOverflow)?;
        let next = table.rehomed(len)?;
        debug!(
            "remapped {} slots into {len}; next growth at {threshold} entries",
            table.len()
        );
        self.threshold = threshold;
        Ok(next)
    }
}

//! Construction parameters for [`CoalescedStore`](crate::CoalescedStore).

use thiserror::Error;

/// Rejected construction parameters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("initial slot count must be greater than zero")]
    ZeroSlots,
    #[error("load factor {0} is outside (0, 1]")]
    LoadFactorOutOfRange(f64),
    #[error("growth multiplier {0} is smaller than 2")]
    MultiplierTooSmall(usize),
}

/// Sizing and growth parameters.
///
/// The growth threshold starts at `initial_slots * load_factor` (rounded down,
/// never below one) and is multiplied by `growth_multiplier` on every grow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StoreConfig {
    pub initial_slots: usize,
    pub load_factor: f64,
    pub growth_multiplier: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_slots: 10,
            load_factor: 0.7,
            growth_multiplier: 2,
        }
    }
}

impl StoreConfig {
    pub fn new(initial_slots: usize, load_factor: f64, growth_multiplier: usize) -> Self {
        Self {
            initial_slots,
            load_factor,
            growth_multiplier,
        }
    }

    pub fn initial_slots(mut self, n: usize) -> Self {
        self.initial_slots = n;
        self
    }

    pub fn load_factor(mut self, f: f64) -> Self {
        self.load_factor = f;
        self
    }

    pub fn growth_multiplier(mut self, m: usize) -> Self {
        self.growth_multiplier = m;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_slots == 0 {
            return Err(ConfigError::ZeroSlots);
        }
        // NaN fails both comparisons.
        if !(self.load_factor > 0.0 && self.load_factor <= 1.0) {
            return Err(ConfigError::LoadFactorOutOfRange(self.load_factor));
        }
        if self.growth_multiplier < 2 {
            return Err(ConfigError::MultiplierTooSmall(self.growth_multiplier));
        }
        Ok(())
    }

    /// Occupancy at which the first grow happens.
    pub fn initial_threshold(&self) -> usize {
        let raw = (self.initial_slots as f64 * self.load_factor) as usize;
        raw.min(self.initial_slots).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = StoreConfig::default();
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(c.initial_threshold(), 7);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(
            StoreConfig::default().initial_slots(0).validate(),
            Err(ConfigError::ZeroSlots)
        );
        assert_eq!(
            StoreConfig::default().load_factor(0.0).validate(),
            Err(ConfigError::LoadFactorOutOfRange(0.0))
        );
        assert_eq!(
            StoreConfig::default().load_factor(1.5).validate(),
            Err(ConfigError::LoadFactorOutOfRange(1.5))
        );
        assert!(StoreConfig::default().load_factor(f64::NAN).validate().is_err());
        assert_eq!(
            StoreConfig::default().growth_multiplier(1).validate(),
            Err(ConfigError::MultiplierTooSmall(1))
        );
    }

    #[test]
    fn threshold_never_drops_to_zero() {
        let c = StoreConfig::new(1, 0.5, 2);
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(c.initial_threshold(), 1);
    }

    #[test]
    fn full_load_factor_threshold_equals_slot_count() {
        assert_eq!(StoreConfig::new(16, 1.0, 3).initial_threshold(), 16);
    }
}

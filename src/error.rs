//! Error taxonomy for store operations.

use crate::config::ConfigError;
use crate::ownership::OwnedSet;
use core::fmt;
use thiserror::Error;

/// Why a store operation did not succeed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StoreError {
    /// Insert found an existing entry with the same key.
    #[error("key already present")]
    DuplicateKey,
    /// Lookup or removal found no entry with the key.
    #[error("key not found")]
    NotFound,
    /// Keys must contain at least one byte.
    #[error("empty key")]
    EmptyKey,
    /// The slot array could not be allocated.
    #[error("failed to allocate a slot array of {slots} slots")]
    AllocationFailure { slots: usize },
    /// The next slot count or growth threshold does not fit in `usize`.
    #[error("slot count overflow while growing")]
    CapacityOverflow,
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

/// A rejected insert. The value and its auxiliaries are handed back untouched
/// so the caller decides what to release.
#[derive(Error)]
#[error("insert rejected: {kind}")]
pub struct InsertError<V> {
    kind: StoreError,
    value: Box<V>,
    owned: OwnedSet,
}

impl<V> InsertError<V> {
    pub(crate) fn new(kind: StoreError, value: Box<V>, owned: OwnedSet) -> Self {
        Self { kind, value, owned }
    }

    pub fn kind(&self) -> &StoreError {
        &self.kind
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind == StoreError::DuplicateKey
    }

    /// Recover the rejected value and auxiliaries.
    pub fn into_parts(self) -> (Box<V>, OwnedSet) {
        (self.value, self.owned)
    }
}

impl<V> fmt::Debug for InsertError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertError")
            .field("kind", &self.kind)
            .field("owned", &self.owned)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(StoreError::DuplicateKey.to_string(), "key already present");
        assert_eq!(
            StoreError::AllocationFailure { slots: 40 }.to_string(),
            "failed to allocate a slot array of 40 slots"
        );
        let e = InsertError::new(StoreError::EmptyKey, Box::new(1u8), OwnedSet::new());
        assert_eq!(e.to_string(), "insert rejected: empty key");
    }

    #[test]
    fn parts_are_returned_intact() {
        let owned = OwnedSet::new().owning(String::from("aux"));
        let e = InsertError::new(StoreError::DuplicateKey, Box::new(7i32), owned);
        assert!(e.is_duplicate());
        let (value, owned) = e.into_parts();
        assert_eq!(*value, 7);
        assert_eq!(owned.get::<String>(0).map(String::as_str), Some("aux"));
    }
}

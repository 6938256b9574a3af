//! coalesced-store: a string-keyed store built on coalesced hashing that
//! owns its values and the auxiliary allocations they reference.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one contiguous slot array addressed by `hash(key) mod slots`,
//!   with collisions chained in place, plus an ownership ledger so callers
//!   can hand over a value together with the other allocations it owns.
//! - Layers:
//!   - SlotTable: the slot array and the placement rules (direct home slot,
//!     chain append via linear probing, eviction of squatters, head
//!     compaction on removal). Works on arena handles and cached hashes,
//!     never on keys.
//!   - GrowthPolicy: grows the slot array by a fixed multiplier once
//!     occupancy reaches the threshold, re-placing handles only.
//!   - CoalescedStore<V>: public API. Owns a generational arena of entries
//!     (key, boxed value, `OwnedSet`) and composes the two layers above.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` (the ledger holds `Box<dyn Any>`).
//! - Keys are strings hashed with djb2; duplicate inserts fail.
//! - Capacity only grows; removal never shrinks the table.
//! - Allocation failure of the slot array is returned as an error.
//!
//! Chain invariant
//! - Whenever a chain is non-empty its head sits at its home slot. Lookup
//!   therefore reads one slot to decide whether a chain exists at all; a
//!   slot held by a member of a different chain is not evidence of the key.
//! - The free-slot scan is a plain linear probe with wraparound. It is
//!   O(slot_count) in the worst case and always terminates because growth
//!   runs before any insert that would overfill the table.
//!
//! Ownership
//! - On a successful insert the store owns the key copy, the boxed value and
//!   every auxiliary. Removal and destruction release the auxiliaries in
//!   insertion order and then the value, exactly once.
//! - A failed insert hands the value and auxiliaries back inside
//!   [`InsertError`]; nothing is released.
//!
//! Diagnostics
//! - Placement, eviction, removal and growth are reported through the `log`
//!   facade at `trace`/`debug` level. No logger is installed here.

mod config;
mod error;
mod growth;
pub mod hash;
mod ownership;
mod slots;
mod store;
mod store_proptest;

// Public surface
pub use config::{ConfigError, StoreConfig};
pub use error::{InsertError, StoreError};
pub use ownership::{InsertOptions, InsertStatus, OwnedSet};
pub use store::{CoalescedStore, Handle};

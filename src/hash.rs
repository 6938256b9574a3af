//! String hash used to pick home slots.

/// djb2 over the key's bytes (`h = h * 33 + byte`, seeded with 5381).
///
/// The full 64-bit value is returned; callers reduce it modulo the current
/// slot count. Keeping the unreduced hash lets the table re-home entries on
/// growth without touching the key again.
#[inline]
pub fn djb2(key: &str) -> u64 {
    key.bytes().fold(5381u64, |h, b| {
        (h << 5).wrapping_add(h).wrapping_add(u64::from(b))
    })
}

/// Home slot of `hash` in a table of `slot_count` slots.
#[inline]
pub(crate) fn home_of(hash: u64, slot_count: usize) -> usize {
    debug_assert!(slot_count > 0);
    (hash % slot_count as u64) as usize
}

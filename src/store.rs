//! CoalescedStore: public facade over the slot table, growth policy and
//! per-entry ownership ledger.

use crate::config::StoreConfig;
use crate::error::{InsertError, StoreError};
use crate::growth::GrowthPolicy;
use crate::hash::djb2;
use crate::ownership::{InsertOptions, InsertStatus, OwnedSet};
use crate::slots::{Occupant, SlotTable};
use log::{debug, trace};
use slotmap::{DefaultKey, SlotMap};

/// Stable reference to a stored entry.
///
/// Survives relocation and growth. After the entry is removed the handle
/// resolves to `None`, and it never aliases a later entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    pub fn key<'a, V>(&self, store: &'a CoalescedStore<V>) -> Option<&'a str> {
        store.entries.get(self.0).map(|e| &*e.key)
    }

    pub fn value<'a, V>(&self, store: &'a CoalescedStore<V>) -> Option<&'a V> {
        store.entries.get(self.0).map(|e| &*e.value)
    }

    pub fn value_mut<'a, V>(&self, store: &'a mut CoalescedStore<V>) -> Option<&'a mut V> {
        store.entries.get_mut(self.0).map(|e| &mut *e.value)
    }

    pub fn owned<'a, V>(&self, store: &'a CoalescedStore<V>) -> Option<&'a OwnedSet> {
        store.entries.get(self.0).map(|e| &e.owned)
    }
}

struct Entry<V> {
    key: Box<str>,
    value: Box<V>,
    owned: OwnedSet,
}

impl<V> Entry<V> {
    /// Release auxiliaries, then the value. Returns the number of
    /// allocations released, the value included.
    fn release(self) -> usize {
        let Entry { key, value, owned } = self;
        let n = owned.release();
        drop(value);
        drop(key);
        n + 1
    }
}

/// String-keyed store using coalesced hashing that owns its values.
///
/// Every entry owns its key (copied on insert), its boxed value and an
/// [`OwnedSet`] of auxiliary allocations. Removing an entry or dropping the
/// store releases all of them together.
pub struct CoalescedStore<V> {
    table: SlotTable,
    growth: GrowthPolicy,
    entries: SlotMap<DefaultKey, Entry<V>>,
}

impl<V> CoalescedStore<V> {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self {
            table: SlotTable::with_len(config.initial_slots)?,
            growth: GrowthPolicy::new(config.growth_multiplier, config.initial_threshold()),
            entries: SlotMap::with_key(),
        })
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn slot_count(&self) -> usize {
        self.table.len()
    }

    pub fn growth_threshold(&self) -> usize {
        self.growth.threshold()
    }

    pub fn growth_multiplier(&self) -> usize {
        self.growth.multiplier()
    }

    /// Slot index `key` hashes to at the current slot count.
    pub fn home_slot(&self, key: &str) -> usize {
        self.table.home(djb2(key))
    }

    /// Slot index currently holding `key`, if present.
    pub fn slot_of(&self, key: &str) -> Option<usize> {
        self.locate(key, "get").map(|(idx, _)| idx)
    }

    fn locate(&self, key: &str, op: &'static str) -> Option<(usize, Occupant)> {
        let hash = djb2(key);
        self.table.find(hash, op, |id| {
            self.entries.get(id).is_some_and(|e| &*e.key == key)
        })
    }

    /// Insert `value` with no auxiliaries.
    pub fn insert(&mut self, key: &str, value: V) -> Result<Handle, InsertError<V>> {
        self.insert_boxed(key, Box::new(value), InsertOptions::new())
    }

    /// Box `value` and insert it with `options`.
    pub fn insert_with(
        &mut self,
        key: &str,
        value: V,
        options: InsertOptions<'_>,
    ) -> Result<Handle, InsertError<V>> {
        self.insert_boxed(key, Box::new(value), options)
    }

    /// Insert an already boxed value.
    ///
    /// On success the store owns `value` and every auxiliary in `options`.
    /// On failure both come back inside the error and nothing in the store
    /// changes, except that a pending grow may already have happened.
    pub fn insert_boxed(
        &mut self,
        key: &str,
        value: Box<V>,
        options: InsertOptions<'_>,
    ) -> Result<Handle, InsertError<V>> {
        let (owned, sink) = options.into_parts();
        let result = self.try_insert(key, value, owned);
        if let Some(sink) = sink {
            *sink = match result {
                Ok(_) => InsertStatus::Success,
                Err(_) => InsertStatus::Failure,
            };
        }
        result
    }

    fn try_insert(
        &mut self,
        key: &str,
        value: Box<V>,
        owned: OwnedSet,
    ) -> Result<Handle, InsertError<V>> {
        if key.is_empty() {
            return Err(InsertError::new(StoreError::EmptyKey, value, owned));
        }
        if self.growth.should_grow(self.entries.len()) {
            if let Err(e) = self.grow() {
                return Err(InsertError::new(e, value, owned));
            }
        }
        if self.locate(key, "insert").is_some() {
            debug!("rejected duplicate key {key:?}");
            return Err(InsertError::new(StoreError::DuplicateKey, value, owned));
        }

        let hash = djb2(key);
        let id = self.entries.insert(Entry {
            key: key.into(),
            value,
            owned,
        });
        self.table.place(Occupant { id, hash }, "insert");
        Ok(Handle(id))
    }

    fn grow(&mut self) -> Result<(), StoreError> {
        let grown = self.growth.grow(&self.table)?;
        self.table = grown;
        Ok(())
    }

    /// Borrow the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&V> {
        match self.locate(key, "get") {
            Some((_, o)) => self.entries.get(o.id).map(|e| &*e.value),
            None => {
                trace!("lookup miss for key {key:?}");
                None
            }
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let (_, o) = self.locate(key, "get")?;
        self.entries.get_mut(o.id).map(|e| &mut *e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.locate(key, "get").is_some()
    }

    /// Handle for the entry under `key`.
    pub fn find(&self, key: &str) -> Option<Handle> {
        self.locate(key, "get").map(|(_, o)| Handle(o.id))
    }

    /// Auxiliaries owned by the entry under `key`.
    pub fn owned(&self, key: &str) -> Option<&OwnedSet> {
        let (_, o) = self.locate(key, "get")?;
        self.entries.get(o.id).map(|e| &e.owned)
    }

    /// Remove the entry under `key`, releasing its value and auxiliaries.
    ///
    /// The chain is repaired before anything is released.
    pub fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let Some((idx, _)) = self.locate(key, "remove") else {
            debug!("remove miss for key {key:?}");
            return Err(StoreError::NotFound);
        };
        let occupant = self.table.unlink(idx);
        let Some(entry) = self.entries.remove(occupant.id) else {
            panic!("remove: slot {idx} referenced a released entry");
        };
        entry.release();
        Ok(())
    }

    /// Release every entry and the slot array. Equivalent to dropping the store.
    pub fn destroy(self) {
        drop(self);
    }

    /// Entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &str, &V)> + '_ {
        self.table.occupants().filter_map(move |(_, o)| {
            self.entries
                .get(o.id)
                .map(|e| (Handle(o.id), &*e.key, &*e.value))
        })
    }

    /// Write the slot layout to the `debug` log, one record per occupied slot.
    pub fn log_layout(&self) {
        for (idx, o) in self.table.occupants() {
            if let Some(e) = self.entries.get(o.id) {
                debug!(
                    "slot {idx}: key {:?}, home {}, {} auxiliaries",
                    e.key,
                    self.table.home(o.hash),
                    e.owned.len()
                );
            }
        }
        debug!(
            "{} slots, {} entries, growth at {}",
            self.table.len(),
            self.entries.len(),
            self.growth.threshold()
        );
    }

    #[cfg(test)]
    pub(crate) fn validate(&self) -> Result<(), String> {
        let occupied = self.table.validate()?;
        if occupied != self.entries.len() {
            return Err(format!(
                "{occupied} occupied slots for {} entries",
                self.entries.len()
            ));
        }
        for (idx, o) in self.table.occupants() {
            let e = self
                .entries
                .get(o.id)
                .ok_or_else(|| format!("slot {idx} names a released entry"))?;
            if djb2(&e.key) != o.hash {
                return Err(format!("slot {idx} caches a stale hash"));
            }
        }
        if self.entries.len() > self.table.len() {
            return Err("more entries than slots".to_string());
        }
        Ok(())
    }
}

impl<V> Drop for CoalescedStore<V> {
    fn drop(&mut self) {
        let entries = self.entries.len();
        let mut released = 0;
        for (_, o) in self.table.occupants() {
            if let Some(e) = self.entries.remove(o.id) {
                released += e.release();
            }
        }
        debug!("destroyed store: {entries} entries, {released} allocations released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    fn store<V>() -> CoalescedStore<V> {
        CoalescedStore::new(StoreConfig::default()).unwrap()
    }

    /// First `count` keys of the form `k{i}` whose home is `home` in `slots` slots.
    fn keys_homed_at(home: usize, slots: usize, count: usize) -> Vec<String> {
        (0..)
            .map(|i| format!("k{i}"))
            .filter(|k| crate::hash::home_of(djb2(k), slots) == home)
            .take(count)
            .collect()
    }

    struct DropCount(Rc<Cell<usize>>);
    impl Drop for DropCount {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    /// Invariant: Duplicate keys are rejected and the store remains unchanged.
    #[test]
    fn duplicate_insert_rejected() {
        let mut m: CoalescedStore<i32> = store();
        let handle = m.insert("dup", 1).unwrap();
        let err = m.insert("dup", 2).unwrap_err();
        assert_eq!(err.kind(), &StoreError::DuplicateKey);
        let (value, _) = err.into_parts();
        assert_eq!(*value, 2);
        assert_eq!(handle.value(&m), Some(&1));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn empty_key_rejected() {
        let mut m: CoalescedStore<i32> = store();
        let err = m.insert("", 1).unwrap_err();
        assert_eq!(err.kind(), &StoreError::EmptyKey);
        assert!(m.is_empty());
        assert!(m.get("").is_none());
        assert_eq!(m.remove(""), Err(StoreError::NotFound));
    }

    #[test]
    fn invalid_config_rejected() {
        let r = CoalescedStore::<u8>::new(StoreConfig::default().growth_multiplier(1));
        assert!(matches!(r, Err(StoreError::InvalidConfig(_))));
    }

    /// Invariant: Handle access yields references while the entry exists and
    /// becomes `None` after removal.
    #[test]
    fn handle_access_and_mutation() {
        let mut m: CoalescedStore<i32> = store();
        let h = m.insert("k1", 10).unwrap();
        assert_eq!(h.key(&m), Some("k1"));
        assert_eq!(h.value(&m), Some(&10));
        *h.value_mut(&mut m).unwrap() += 5;
        assert_eq!(m.get("k1"), Some(&15));
        *m.get_mut("k1").unwrap() += 1;
        assert_eq!(h.value(&m), Some(&16));

        m.remove("k1").unwrap();
        assert!(h.value(&m).is_none());
    }

    /// Invariant: a removed entry's handle does not alias a new entry, even if
    /// the arena slot is reused.
    #[test]
    fn stale_handle_does_not_alias_new_entry() {
        let mut m: CoalescedStore<i32> = store();
        let h1 = m.insert("old", 1).unwrap();
        m.remove("old").unwrap();
        let h2 = m.insert("new", 2).unwrap();
        assert_ne!(h1, h2);
        assert!(h1.value(&m).is_none());
        assert!(m.contains_key("new"));
        assert!(!m.contains_key("old"));
    }

    /// Invariant: iteration yields each live entry exactly once.
    #[test]
    fn iteration_yields_live_entries() {
        let mut m: CoalescedStore<usize> = store();
        let keys = ["k1", "k2", "k3"];
        for (i, k) in keys.iter().enumerate() {
            m.insert(k, i).unwrap();
        }
        let seen: BTreeSet<&str> = m.iter().map(|(_, k, _)| k).collect();
        let expected: BTreeSet<&str> = keys.iter().copied().collect();
        assert_eq!(seen, expected);
        for (h, k, v) in m.iter() {
            assert_eq!(m.find(k), Some(h));
            assert_eq!(m.get(k), Some(v));
        }
    }

    #[test]
    fn remove_then_reinsert_same_key_yields_new_value() {
        let mut m: CoalescedStore<i32> = store();
        m.insert("k", 1).unwrap();
        m.remove("k").unwrap();
        assert!(m.get("k").is_none());
        assert_eq!(m.remove("k"), Err(StoreError::NotFound));
        m.insert("k", 2).unwrap();
        assert_eq!(m.get("k"), Some(&2));
    }

    #[test]
    fn len_tracks_successful_operations_only() {
        let mut m: CoalescedStore<i32> = store();
        assert!(m.is_empty());
        m.insert("a", 1).unwrap();
        assert!(m.insert("a", 2).is_err());
        m.insert("b", 2).unwrap();
        assert_eq!(m.len(), 2);
        assert!(m.remove("zzz").is_err());
        m.remove("a").unwrap();
        assert_eq!(m.len(), 1);
        m.remove("b").unwrap();
        assert!(m.is_empty());
    }

    /// Scenario: (10, 0.7, 2) grows exactly once on the eighth insert.
    #[test]
    fn eighth_insert_grows_once() {
        let mut m: CoalescedStore<usize> = store();
        assert_eq!(m.growth_threshold(), 7);
        for i in 0..7 {
            m.insert(&format!("key{i}"), i).unwrap();
        }
        assert_eq!(m.slot_count(), 10);
        m.insert("key7", 7).unwrap();
        assert_eq!(m.slot_count(), 20);
        assert_eq!(m.growth_threshold(), 14);
        for i in 0..8 {
            assert_eq!(m.get(&format!("key{i}")), Some(&i));
        }
        m.validate().unwrap();

        let err = m.insert("key3", 99).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(m.len(), 8);
        assert_eq!(m.get("key3"), Some(&3));

        m.remove("key3").unwrap();
        assert!(m.get("key3").is_none());
        assert_eq!(m.len(), 7);
        assert_eq!(m.slot_count(), 20);
    }

    /// Scenario: removing a chain head pulls the next member into the home slot.
    #[test]
    fn removing_head_keeps_successor_at_home() {
        let mut m: CoalescedStore<&'static str> = store();
        let keys = keys_homed_at(4, 10, 2);
        let (a, b) = (keys[0].as_str(), keys[1].as_str());
        m.insert(a, "A").unwrap();
        m.insert(b, "B").unwrap();
        assert_eq!(m.slot_of(a), Some(4));
        assert_eq!(m.slot_of(b), Some(5));
        assert_eq!(m.get(a), Some(&"A"));
        assert_eq!(m.get(b), Some(&"B"));

        m.remove(a).unwrap();
        assert_eq!(m.home_slot(b), 4);
        assert_eq!(m.slot_of(b), Some(4));
        assert_eq!(m.get(b), Some(&"B"));
        assert!(m.get(a).is_none());
        m.validate().unwrap();
    }

    /// A key whose home is held by a squatter is absent, and its insert
    /// evicts the squatter without losing it.
    #[test]
    fn squatter_is_evicted_by_rightful_head() {
        let mut m: CoalescedStore<u8> = store();
        let chain = keys_homed_at(2, 10, 2);
        let rightful = keys_homed_at(3, 10, 1);
        m.insert(&chain[0], 0).unwrap();
        m.insert(&chain[1], 1).unwrap();
        assert_eq!(m.slot_of(&chain[1]), Some(3));
        assert!(m.get(&rightful[0]).is_none());

        m.insert(&rightful[0], 2).unwrap();
        assert_eq!(m.slot_of(&rightful[0]), Some(3));
        assert_eq!(m.slot_of(&chain[1]), Some(4));
        assert_eq!(m.get(&chain[1]), Some(&1));
        m.validate().unwrap();
    }

    #[test]
    fn handles_survive_relocation_and_growth() {
        let mut m: CoalescedStore<usize> = store();
        let chain = keys_homed_at(2, 10, 2);
        let old = m.insert(&chain[1], 1).unwrap();
        m.insert(&chain[0], 0).unwrap();
        // Head removal pulls chain[0] into the home slot.
        m.remove(&chain[1]).unwrap();
        assert!(old.value(&m).is_none());
        let h = m.insert(&chain[1], 11).unwrap();
        for i in 0..20 {
            m.insert(&format!("fill{i}"), i).unwrap();
        }
        assert!(m.slot_count() > 10);
        assert_eq!(h.value(&m), Some(&11));
        assert_eq!(h.key(&m), Some(chain[1].as_str()));
        m.validate().unwrap();
    }

    #[test]
    fn result_sink_reports_outcome() {
        let mut m: CoalescedStore<i32> = store();
        let mut status = InsertStatus::Pending;
        m.insert_with("k", 1, InsertOptions::new().report_to(&mut status))
            .unwrap();
        assert_eq!(status, InsertStatus::Success);
        let mut status = InsertStatus::Pending;
        let r = m.insert_with("k", 2, InsertOptions::new().report_to(&mut status));
        assert!(r.is_err());
        assert_eq!(status, InsertStatus::Failure);
    }

    #[test]
    fn remove_releases_value_and_auxiliaries_once() {
        let drops = Rc::new(Cell::new(0));
        let mut m: CoalescedStore<DropCount> = store();
        let opts = InsertOptions::new()
            .owning(DropCount(drops.clone()))
            .owning(DropCount(drops.clone()));
        m.insert_with("k", DropCount(drops.clone()), opts).unwrap();
        assert_eq!(m.owned("k").map(OwnedSet::len), Some(2));
        assert_eq!(drops.get(), 0);

        m.remove("k").unwrap();
        assert_eq!(drops.get(), 3);
        assert_eq!(m.remove("k"), Err(StoreError::NotFound));
        drop(m);
        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn failed_insert_releases_nothing() {
        let drops = Rc::new(Cell::new(0));
        let mut m: CoalescedStore<DropCount> = store();
        m.insert("k", DropCount(drops.clone())).unwrap();
        let opts = InsertOptions::new().owning(DropCount(drops.clone()));
        let err = m
            .insert_boxed("k", Box::new(DropCount(drops.clone())), opts)
            .unwrap_err();
        assert_eq!(drops.get(), 0);
        let (value, owned) = err.into_parts();
        assert_eq!(owned.len(), 1);
        drop(value);
        owned.release();
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn destroy_releases_every_entry() {
        let drops = Rc::new(Cell::new(0));
        let mut m: CoalescedStore<DropCount> = store();
        for i in 0..25 {
            let opts = InsertOptions::new().owning(DropCount(drops.clone()));
            m.insert_with(&format!("k{i}"), DropCount(drops.clone()), opts)
                .unwrap();
        }
        m.remove("k0").unwrap();
        assert_eq!(drops.get(), 2);
        m.log_layout();
        m.destroy();
        assert_eq!(drops.get(), 50);
    }

    /// Scenario: a duplicate arriving at the threshold is rejected after the
    /// pending grow has already run; entries and count are untouched.
    #[test]
    fn duplicate_at_threshold_grows_then_rejects() {
        let mut m = store();
        for i in 0..7 {
            m.insert(&format!("k{i}"), i).unwrap();
        }
        assert_eq!(m.slot_count(), 10);
        let err = m.insert("k3", 99).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(*err.into_parts().0, 99);
        assert_eq!(m.len(), 7);
        assert_eq!(m.slot_count(), 20);
        assert_eq!(m.growth_threshold(), 14);
        for i in 0..7 {
            assert_eq!(m.get(&format!("k{i}")), Some(&i));
        }
        m.validate().unwrap();
    }

    #[test]
    fn full_load_factor_grows_before_overfilling() {
        let mut m: CoalescedStore<usize> =
            CoalescedStore::new(StoreConfig::new(4, 1.0, 2)).unwrap();
        for i in 0..4 {
            m.insert(&format!("x{i}"), i).unwrap();
        }
        assert_eq!(m.slot_count(), 4);
        m.insert("x4", 4).unwrap();
        assert_eq!(m.slot_count(), 8);
        m.validate().unwrap();
    }
}

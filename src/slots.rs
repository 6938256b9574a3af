//! SlotTable: the backing array and the coalesced-chaining placement rules.
//!
//! Each slot names at most one arena entry (`Occupant`) and carries the
//! `next`/`prev` slot indices that thread the collision chain the occupant
//! belongs to. A chain is rooted at its home slot: whenever a chain is
//! non-empty, the slot at its home index holds the chain head. Chain members
//! may live in any other slot, including the home slots of other chains;
//! such squatters are evicted when the rightful head arrives.
//!
//! The table never looks at keys. Occupants carry the full key hash, so
//! placement and rehoming on growth work on handles alone; key comparison is
//! delegated to the caller through a predicate.

use crate::error::StoreError;
use crate::hash::home_of;
use log::trace;
use slotmap::DefaultKey;

/// Arena handle plus the cached hash of its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Occupant {
    pub(crate) id: DefaultKey,
    pub(crate) hash: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    occupant: Option<Occupant>,
    next: Option<usize>,
    prev: Option<usize>,
}

impl Slot {
    const EMPTY: Slot = Slot {
        occupant: None,
        next: None,
        prev: None,
    };

    fn head(occupant: Occupant) -> Self {
        Slot {
            occupant: Some(occupant),
            next: None,
            prev: None,
        }
    }
}

pub(crate) struct SlotTable {
    slots: Vec<Slot>,
}

/// Iterator over one collision chain, head first.
pub(crate) struct Chain<'a> {
    table: &'a SlotTable,
    cursor: Option<usize>,
    op: &'static str,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (usize, Occupant);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let slot = &self.table.slots[idx];
        let Some(occupant) = slot.occupant else {
            panic!(
                "{}: chain link points at empty slot {idx}; slot table is corrupt",
                self.op
            );
        };
        self.cursor = slot.next;
        Some((idx, occupant))
    }
}

impl SlotTable {
    /// Allocate `len` empty slots, reporting allocation failure instead of aborting.
    pub(crate) fn with_len(len: usize) -> Result<Self, StoreError> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(len)
            .map_err(|_| StoreError::AllocationFailure { slots: len })?;
        slots.resize(len, Slot::EMPTY);
        Ok(Self { slots })
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn home(&self, hash: u64) -> usize {
        home_of(hash, self.slots.len())
    }

    #[cfg(test)]
    pub(crate) fn occupant(&self, idx: usize) -> Option<Occupant> {
        self.slots.get(idx).and_then(|s| s.occupant)
    }

    /// True if `idx` holds an entry whose home is `idx`.
    fn holds_head(&self, idx: usize) -> bool {
        self.slots[idx]
            .occupant
            .is_some_and(|o| self.home(o.hash) == idx)
    }

    /// The chain rooted at `home`. Empty when the slot is vacant or occupied
    /// by a member of some other chain. `op` names the walking operation in
    /// corruption panics.
    pub(crate) fn chain(&self, home: usize, op: &'static str) -> Chain<'_> {
        let cursor = self.holds_head(home).then_some(home);
        Chain {
            table: self,
            cursor,
            op,
        }
    }

    /// Locate the chain member with `hash` accepted by `is_match`.
    pub(crate) fn find<F>(
        &self,
        hash: u64,
        op: &'static str,
        mut is_match: F,
    ) -> Option<(usize, Occupant)>
    where
        F: FnMut(DefaultKey) -> bool,
    {
        self.chain(self.home(hash), op)
            .find(|(_, o)| o.hash == hash && is_match(o.id))
    }

    /// Every occupied slot in index order.
    pub(crate) fn occupants(&self) -> impl Iterator<Item = (usize, Occupant)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.occupant.map(|o| (i, o)))
    }

    /// First vacant slot after `from`, scanning linearly with wraparound.
    fn probe_vacant(&self, from: usize) -> usize {
        let n = self.slots.len();
        (1..n)
            .map(|d| (from + d) % n)
            .find(|&i| self.slots[i].occupant.is_none())
            .unwrap_or_else(|| panic!("no vacant slot in a table of {n} slots; growth must run first"))
    }

    /// Move the slot at `from` into the vacant slot `to`, repointing both
    /// neighbours at the new position.
    fn relocate(&mut self, from: usize, to: usize) {
        debug_assert!(self.slots[to].occupant.is_none());
        let moved = self.slots[from];
        if let Some(p) = moved.prev {
            self.slots[p].next = Some(to);
        }
        if let Some(n) = moved.next {
            self.slots[n].prev = Some(to);
        }
        self.slots[to] = moved;
        self.slots[from] = Slot::EMPTY;
    }

    /// Place `occupant` without checking for duplicates; returns its slot.
    ///
    /// Caller must ensure at least one slot is vacant.
    pub(crate) fn place(&mut self, occupant: Occupant, op: &'static str) -> usize {
        let home = self.home(occupant.hash);
        let Some(current) = self.slots[home].occupant else {
            trace!("placed at home slot {home}");
            self.slots[home] = Slot::head(occupant);
            return home;
        };

        let vacant = self.probe_vacant(home);
        if self.home(current.hash) == home {
            let tail = self
                .chain(home, op)
                .last()
                .map(|(i, _)| i)
                .unwrap_or(home);
            self.slots[vacant] = Slot {
                occupant: Some(occupant),
                next: None,
                prev: Some(tail),
            };
            self.slots[tail].next = Some(vacant);
            trace!("chained at slot {vacant} behind slot {tail} (home {home})");
            vacant
        } else {
            self.relocate(home, vacant);
            self.slots[home] = Slot::head(occupant);
            trace!("evicted squatter from home slot {home} to slot {vacant}");
            home
        }
    }

    /// Remove the occupant at `idx` and repair its chain.
    ///
    /// A removed head with successors pulls its successor into the home slot
    /// so the head never leaves home.
    pub(crate) fn unlink(&mut self, idx: usize) -> Occupant {
        let slot = self.slots[idx];
        let Some(removed) = slot.occupant else {
            panic!("remove: unlink of empty slot {idx}");
        };
        match (slot.prev, slot.next) {
            (None, Some(next)) => {
                let successor = self.slots[next];
                self.slots[idx] = Slot {
                    occupant: successor.occupant,
                    next: successor.next,
                    prev: None,
                };
                if let Some(after) = successor.next {
                    self.slots[after].prev = Some(idx);
                }
                self.slots[next] = Slot::EMPTY;
                trace!("removed head at slot {idx}; successor pulled in from slot {next}");
            }
            (None, None) => {
                self.slots[idx] = Slot::EMPTY;
                trace!("removed sole entry at slot {idx}");
            }
            (Some(prev), next) => {
                self.slots[prev].next = next;
                if let Some(next) = next {
                    self.slots[next].prev = Some(prev);
                }
                self.slots[idx] = Slot::EMPTY;
                trace!("spliced slot {idx} out of chain after slot {prev}");
            }
        }
        removed
    }

    /// Build a table of `len` slots holding every current occupant, placed
    /// in old index order with the usual rules.
    pub(crate) fn rehomed(&self, len: usize) -> Result<SlotTable, StoreError> {
        let mut next = SlotTable::with_len(len)?;
        for (_, occupant) in self.occupants() {
            next.place(occupant, "grow");
        }
        Ok(next)
    }

    /// Check linkage and the head-at-home rule; returns the number of
    /// occupied slots.
    #[cfg(test)]
    pub(crate) fn validate(&self) -> Result<usize, String> {
        let mut occupied = 0;
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(o) = slot.occupant else {
                if slot.next.is_some() || slot.prev.is_some() {
                    return Err(format!("empty slot {i} carries links"));
                }
                continue;
            };
            occupied += 1;
            let home = self.home(o.hash);
            match slot.prev {
                None if home != i => {
                    return Err(format!("slot {i} has no prev but its home is {home}"));
                }
                None => {}
                Some(p) => {
                    if self.slots[p].next != Some(i) {
                        return Err(format!("slot {p} does not point forward to {i}"));
                    }
                }
            }
            if let Some(n) = slot.next {
                if self.slots[n].prev != Some(i) {
                    return Err(format!("slot {n} does not point back to {i}"));
                }
            }
            if !self.chain(home, "validate").any(|(j, _)| j == i) {
                return Err(format!("slot {i} unreachable from home slot {home}"));
            }
        }
        Ok(occupied)
    }
}

#![cfg(test)]

// Property tests for CoalescedStore kept inside the crate so they can check
// the slot-level invariants through `validate()`.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::ownership::{InsertOptions, InsertStatus};
use crate::store::{CoalescedStore, Handle};
use proptest::prelude::*;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

// Counts live tracked objects and remembers which ids were released, so a
// double release or a leak shows up as a failed property.
#[derive(Default)]
struct Ledger {
    live: Cell<usize>,
    next_id: Cell<u64>,
    released: RefCell<HashSet<u64>>,
}

struct Tracked {
    id: u64,
    ledger: Rc<Ledger>,
}

impl Tracked {
    fn new(ledger: &Rc<Ledger>) -> Self {
        let id = ledger.next_id.get();
        ledger.next_id.set(id + 1);
        ledger.live.set(ledger.live.get() + 1);
        Tracked {
            id,
            ledger: ledger.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        let fresh = self.ledger.released.borrow_mut().insert(self.id);
        assert!(fresh, "object {} released twice", self.id);
        self.ledger.live.set(self.ledger.live.get() - 1);
    }
}

struct Val {
    n: i32,
    _guard: Tracked,
}

// Pool-indexed operations so shrinking moves toward earlier keys.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    InsertOwning(usize, i32, usize),
    Remove(usize),
    Get(usize),
    Mutate(usize, i32),
    Iterate,
}

fn arb_config() -> impl Strategy<Value = StoreConfig> {
    (
        1usize..=8,
        prop::sample::select(vec![0.25, 0.5, 0.7, 1.0]),
        2usize..=4,
    )
        .prop_map(|(slots, load, mult)| StoreConfig::new(slots, load, mult))
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{1,4}", 1..=24).prop_flat_map(|pool| {
        let idx = 0..pool.len();
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            (idx.clone(), any::<i32>(), 0usize..4).prop_map(|(i, v, n)| Op::InsertOwning(i, v, n)),
            idx.clone().prop_map(Op::Remove),
            idx.clone().prop_map(Op::Get),
            (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants checked after every operation:
// - duplicate inserts fail without mutating; failed inputs come back intact;
// - get/contains parity with the model, handles stay valid across growth;
// - len == successful inserts - successful removes; slot_count never shrinks;
// - the chain-head rule and chain linkage hold (`validate`);
// - live tracked objects == 1 + auxiliaries per model entry (no leak, no
//   double release), and zero after the store is dropped.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(config in arb_config(), (pool, ops) in arb_scenario()) {
        let ledger = Rc::new(Ledger::default());
        let mut sut: CoalescedStore<Val> = CoalescedStore::new(config).unwrap();
        // key -> (value, auxiliary count, handle)
        let mut model: HashMap<String, (i32, usize, Handle)> = HashMap::new();
        let mut stale: Vec<Handle> = Vec::new();
        let mut slots = sut.slot_count();

        for op in ops {
            match op {
                Op::Insert(i, v) | Op::InsertOwning(i, v, _) => {
                    let aux = match op { Op::InsertOwning(_, _, n) => n, _ => 0 };
                    let key = &pool[i];
                    let mut opts = InsertOptions::new();
                    for _ in 0..aux {
                        opts = opts.owning(Tracked::new(&ledger));
                    }
                    let mut status = InsertStatus::Pending;
                    let value = Val { n: v, _guard: Tracked::new(&ledger) };
                    match sut.insert_with(key, value, opts.report_to(&mut status)) {
                        Ok(h) => {
                            prop_assert!(!model.contains_key(key));
                            prop_assert_eq!(status, InsertStatus::Success);
                            model.insert(key.clone(), (v, aux, h));
                        }
                        Err(e) => {
                            prop_assert_eq!(e.kind(), &StoreError::DuplicateKey);
                            prop_assert!(model.contains_key(key));
                            prop_assert_eq!(status, InsertStatus::Failure);
                            let (value, owned) = e.into_parts();
                            prop_assert_eq!(value.n, v);
                            prop_assert_eq!(owned.len(), aux);
                        }
                    }
                }
                Op::Remove(i) => {
                    let key = &pool[i];
                    match model.remove(key) {
                        Some((_, _, h)) => {
                            prop_assert_eq!(sut.remove(key), Ok(()));
                            stale.push(h);
                        }
                        None => prop_assert_eq!(sut.remove(key), Err(StoreError::NotFound)),
                    }
                    prop_assert!(sut.get(key).is_none());
                }
                Op::Get(i) => {
                    let key = &pool[i];
                    let got = sut.get(key).map(|v| v.n);
                    prop_assert_eq!(got, model.get(key).map(|(v, _, _)| *v));
                    prop_assert_eq!(sut.contains_key(key), model.contains_key(key));
                    if let Some((_, aux, h)) = model.get(key) {
                        prop_assert_eq!(sut.find(key), Some(*h));
                        prop_assert_eq!(sut.owned(key).map(|o| o.len()), Some(*aux));
                    }
                }
                Op::Mutate(i, d) => {
                    let key = &pool[i];
                    if let Some((mv, _, h)) = model.get_mut(key) {
                        let v = h.value_mut(&mut sut).expect("live handle resolves");
                        v.n = v.n.wrapping_add(d);
                        *mv = mv.wrapping_add(d);
                    } else {
                        prop_assert!(sut.get_mut(key).is_none());
                    }
                }
                Op::Iterate => {
                    let s_keys: BTreeSet<String> = sut.iter().map(|(_, k, _)| k.to_string()).collect();
                    let m_keys: BTreeSet<String> = model.keys().cloned().collect();
                    prop_assert_eq!(s_keys, m_keys);
                }
            }

            prop_assert!(sut.slot_count() >= slots);
            slots = sut.slot_count();
            prop_assert_eq!(sut.len(), model.len());
            if let Err(msg) = sut.validate() {
                prop_assert!(false, "{}", msg);
            }
            for h in &stale {
                prop_assert!(h.value(&sut).is_none());
            }
            for (k, (v, _, h)) in &model {
                prop_assert_eq!(h.key(&sut), Some(k.as_str()));
                prop_assert_eq!(h.value(&sut).map(|x| x.n), Some(*v));
            }
            let expected_live: usize = model.values().map(|(_, aux, _)| 1 + aux).sum();
            prop_assert_eq!(ledger.live.get(), expected_live);
        }

        sut.destroy();
        prop_assert_eq!(ledger.live.get(), 0);
    }
}

// Property: inserting past the threshold grows exactly once per crossing, by
// the configured multiplier, and every key survives.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_growth_preserves_mappings(config in arb_config(), n in 1usize..200) {
        let mut sut: CoalescedStore<usize> = CoalescedStore::new(config).unwrap();
        for i in 0..n {
            let before_slots = sut.slot_count();
            let before_threshold = sut.growth_threshold();
            let will_grow = sut.len() >= before_threshold;
            sut.insert(&format!("key{i}"), i).unwrap();
            if will_grow {
                prop_assert_eq!(sut.slot_count(), before_slots * config.growth_multiplier);
                prop_assert_eq!(sut.growth_threshold(), before_threshold * config.growth_multiplier);
            } else {
                prop_assert_eq!(sut.slot_count(), before_slots);
            }
            prop_assert!(sut.len() <= sut.slot_count());
        }
        for i in 0..n {
            prop_assert_eq!(sut.get(&format!("key{i}")), Some(&i));
        }
        if let Err(msg) = sut.validate() {
            prop_assert!(false, "{}", msg);
        }
    }
}

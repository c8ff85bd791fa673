//! Randomised checks of the reference invariants.
//!
//! Seeds are fixed so a failure names the seed that reproduces it.
//!
//! Run with: cargo test -p lbs-core --test properties_test

mod common;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use lbs_core::SessionManager;
use lbs_protocol::ResourceClass;

use common::{make_arbitrated_manager, make_manager};

const CLIENTS: [&str; 5] = [":1.1", ":1.2", ":1.3", ":1.4", ":1.5"];

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(usize, ResourceClass),
    Remove(usize, ResourceClass),
    ForceRemove(usize),
    Interval(usize, ResourceClass, u32),
}

fn apply(manager: &mut SessionManager, op: Op) {
    match op {
        Op::Add(c, r) => {
            manager.add_reference(CLIENTS[c], r).expect("valid add");
        }
        Op::Remove(c, r) => {
            manager.remove_reference(CLIENTS[c], r).expect("valid remove");
        }
        Op::ForceRemove(c) => {
            manager.force_remove_client(CLIENTS[c]);
        }
        Op::Interval(c, r, ms) => {
            manager.request_interval(CLIENTS[c], r, ms).expect("valid interval");
        }
    }
}

fn random_op(rng: &mut StdRng) -> Op {
    let client = rng.gen_range(0..CLIENTS.len());
    let resource = ResourceClass::ALL[rng.gen_range(0..ResourceClass::COUNT)];
    match rng.gen_range(0..12) {
        0..=4 => Op::Add(client, resource),
        5..=8 => Op::Remove(client, resource),
        9 | 10 => Op::Interval(client, resource, rng.gen_range(1..10_000)),
        _ => Op::ForceRemove(client),
    }
}

/// First index at or after `at` where a remove of (c, r) keeps every later
/// prefix of that pair non-negative.
fn remove_slot(ops: &[Op], c: usize, r: ResourceClass, at: usize) -> usize {
    let mut balance = vec![0i64];
    for op in ops {
        let last = *balance.last().unwrap_or(&0);
        let next = match *op {
            Op::Add(oc, or) if oc == c && or == r => last + 1,
            Op::Remove(oc, or) if oc == c && or == r => last - 1,
            _ => last,
        };
        balance.push(next);
    }
    (at..=ops.len())
        .find(|&p| balance[p..].iter().all(|&b| b >= 1))
        .unwrap_or(ops.len())
}

/// What the manager should hold after a sequence of operations.
#[derive(Default)]
struct Model {
    /// Reference counts, clamped at zero like the manager
    counts: HashMap<(usize, ResourceClass), u32>,
    /// Recorded interval requests
    intervals: HashMap<(usize, ResourceClass), u32>,
}

impl Model {
    fn count(&self, c: usize, r: ResourceClass) -> u32 {
        self.counts.get(&(c, r)).copied().unwrap_or(0)
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Add(c, r) => *self.counts.entry((c, r)).or_default() += 1,
            Op::Remove(c, r) => {
                if self.count(c, r) > 0 {
                    let n = self.counts.entry((c, r)).or_default();
                    *n -= 1;
                    if *n == 0 {
                        self.intervals.remove(&(c, r));
                    }
                }
            }
            Op::ForceRemove(c) => {
                self.counts.retain(|(mc, _), _| *mc != c);
                self.intervals.retain(|(mc, _), _| *mc != c);
            }
            Op::Interval(c, r, ms) => {
                self.intervals.insert((c, r), ms);
            }
        }
    }

    fn tracked(&self, c: usize) -> bool {
        ResourceClass::ALL
            .iter()
            .any(|&r| self.count(c, r) > 0 || self.intervals.contains_key(&(c, r)))
    }

    /// Smallest interval among clients that reference `r`.
    fn effective_interval(&self, r: ResourceClass) -> Option<u32> {
        (0..CLIENTS.len())
            .filter(|&c| self.count(c, r) > 0)
            .filter_map(|c| self.intervals.get(&(c, r)).copied())
            .min()
    }

    fn sum(&self, r: ResourceClass) -> u32 {
        (0..CLIENTS.len()).map(|c| self.count(c, r)).sum()
    }
}

#[test]
fn test_shutdown_matches_reference_sums() {
    for seed in 0..32u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (mut manager, shutdown, intervals) = make_arbitrated_manager();
        let mut model = Model::default();
        // last interval the listener reported per class
        let mut reported: HashMap<ResourceClass, Option<u32>> = HashMap::new();

        for step in 0..400 {
            let op = random_op(&mut rng);
            apply(&mut manager, op);
            model.apply(op);
            for (r, interval) in intervals.take() {
                reported.insert(r, interval);
            }

            let vector = manager.compute_shutdown_vector();
            assert_eq!(shutdown.last(), Some(vector), "seed {} step {} after {:?}", seed, step, op);
            for r in ResourceClass::ALL {
                let sum = model.sum(r);
                assert_eq!(vector[r], sum == 0, "seed {} step {} class {}", seed, step, r);
                assert_eq!(manager.table().total(r), u64::from(sum));
                assert_eq!(
                    manager.effective_interval(r),
                    model.effective_interval(r),
                    "seed {} step {} class {} after {:?}",
                    seed,
                    step,
                    r,
                    op
                );
                assert_eq!(
                    reported.get(&r).copied().flatten(),
                    model.effective_interval(r),
                    "seed {} step {}: listener out of date for {}",
                    seed,
                    step,
                    r
                );
            }
            for (c, client) in CLIENTS.iter().enumerate() {
                assert_eq!(
                    manager.is_tracked(client),
                    model.tracked(c),
                    "seed {} step {}: no stale entry for {}",
                    seed,
                    step,
                    client
                );
            }
        }
    }
}

#[test]
fn test_balanced_sequences_leave_no_entry() {
    for seed in 0..32u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (mut manager, _) = make_manager();
        let resource = ResourceClass::ALL[rng.gen_range(0..ResourceClass::COUNT)];
        let n = rng.gen_range(1..20);

        // n adds and n removes, shuffled so that no prefix goes negative
        let mut ops = Vec::new();
        let mut outstanding = 0;
        let (mut adds, mut removes) = (n, n);
        while adds + removes > 0 {
            let add = removes == 0 || (adds > 0 && (outstanding == 0 || rng.gen_bool(0.5)));
            if add {
                adds -= 1;
                outstanding += 1;
                ops.push(Op::Add(0, resource));
            } else {
                removes -= 1;
                outstanding -= 1;
                ops.push(Op::Remove(0, resource));
            }
        }
        for op in ops {
            apply(&mut manager, op);
        }

        assert!(!manager.is_tracked(CLIENTS[0]), "seed {}", seed);
        assert!(manager.compute_shutdown_vector().all_shutdown(), "seed {}", seed);
        assert_eq!(manager.anomaly_count(), 0, "seed {}", seed);
    }
}

#[test]
fn test_final_vector_is_order_independent() {
    for seed in 0..16u64 {
        let mut rng = StdRng::seed_from_u64(seed);

        // a multiset of net-positive deltas plus balanced add/remove pairs
        let mut ops = Vec::new();
        for _ in 0..rng.gen_range(1..12) {
            let c = rng.gen_range(0..CLIENTS.len());
            let r = ResourceClass::ALL[rng.gen_range(0..ResourceClass::COUNT)];
            ops.push(Op::Add(c, r));
            if rng.gen_bool(0.5) {
                ops.push(Op::Add(c, r));
                ops.push(Op::Remove(c, r));
            }
        }

        let (mut reference, _) = make_manager();
        for &op in &ops {
            apply(&mut reference, op);
        }
        let expected = reference.compute_shutdown_vector();

        for _ in 0..8 {
            // keep every remove after an add of the same pair so no release
            // underflows; the order is otherwise arbitrary
            let mut shuffled = ops.clone();
            shuffled.shuffle(&mut rng);
            let (mut adds, removes): (Vec<Op>, Vec<Op>) = shuffled
                .into_iter()
                .partition(|o| matches!(o, Op::Add(..)));
            for remove in removes {
                let Op::Remove(c, r) = remove else {
                    panic!("expected a remove, got {:?}", remove)
                };
                let at = rng.gen_range(0..=adds.len());
                let slot = remove_slot(&adds, c, r, at);
                adds.insert(slot, remove);
            }

            let (mut manager, _) = make_manager();
            for op in adds {
                apply(&mut manager, op);
            }
            assert_eq!(manager.compute_shutdown_vector(), expected, "seed {}", seed);
            assert_eq!(manager.anomaly_count(), 0, "seed {}", seed);
        }
    }
}

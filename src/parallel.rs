use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};

/// Scheduling policy for a parallel traversal.
///
/// # Variants
///
/// * `Fixed` - Splits the range into one contiguous block per worker thread.
///   Cheap to schedule, but a block holding a few hub vertices becomes the
///   straggler of the phase.
/// * `Dynamic` - Lets rayon split the range adaptively and steal work, which
///   evens out skewed degree distributions at the cost of more splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    Fixed,
    #[default]
    Dynamic,
}

impl Policy {
    /// Returns the minimum split length handed to `with_min_len` for a range of `len` items.
    pub(crate) fn min_len(self, len: usize) -> usize {
        match self {
            Policy::Fixed => len.div_ceil(rayon::current_num_threads()).max(1),
            Policy::Dynamic => 1,
        }
    }
}

/// Index of the replica owned by the calling worker.
///
/// Slot 0 is reserved for callers outside any rayon pool; worker `i` of the
/// current pool writes slot `i + 1`, wrapping when the pool is larger than
/// the replica array.
fn local_replica(replicas: usize) -> usize {
    rayon::current_thread_index().map_or(0, |index| index + 1) % replicas
}

fn default_replicas() -> usize {
    rayon::current_num_threads() + 1
}

/// A boolean replicated once per worker and combined with logical OR.
///
/// Workers only ever store `true` into their own slot, so setting the flag
/// never contends on a shared cache line. The round-level value is obtained
/// with [`ReplicatedFlag::reduce`] once the phase has joined.
pub struct ReplicatedFlag {
    slots: Box<[CachePadded<AtomicBool>]>,
}

impl ReplicatedFlag {
    pub fn new() -> Self {
        Self::with_replicas(default_replicas())
    }

    pub fn with_replicas(replicas: usize) -> Self {
        let slots = (0..replicas.max(1))
            .map(|_| CachePadded::new(AtomicBool::new(false)))
            .collect();
        Self { slots }
    }

    pub fn replicas(&self) -> usize {
        self.slots.len()
    }

    /// Sets the calling worker's replica.
    pub fn set(&self) {
        self.set_at(local_replica(self.slots.len()));
    }

    /// Sets one specific replica.
    pub fn set_at(&self, replica: usize) {
        self.slots[replica % self.slots.len()].store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(false, Ordering::Relaxed);
        }
    }

    /// Logical OR over every replica.
    pub fn reduce(&self) -> bool {
        self.slots
            .iter()
            .fold(false, |acc, slot| acc | slot.load(Ordering::Relaxed))
    }
}

impl Default for ReplicatedFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A counter replicated once per worker and combined by summation.
pub struct ReplicatedCounter {
    slots: Box<[CachePadded<AtomicUsize>]>,
}

impl ReplicatedCounter {
    pub fn new() -> Self {
        Self::with_replicas(default_replicas())
    }

    pub fn with_replicas(replicas: usize) -> Self {
        let slots = (0..replicas.max(1))
            .map(|_| CachePadded::new(AtomicUsize::new(0)))
            .collect();
        Self { slots }
    }

    /// Adds `value` to the calling worker's replica.
    pub fn add(&self, value: usize) {
        self.add_at(local_replica(self.slots.len()), value);
    }

    pub fn add_at(&self, replica: usize, value: usize) {
        self.slots[replica % self.slots.len()].fetch_add(value, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Sum over every replica.
    pub fn reduce(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for ReplicatedCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;
    use rayon::ThreadPoolBuilder;

    use super::*;

    /// A flag set by any single replica must reduce to `true`.
    #[test]
    fn test_flag_set_by_any_replica() {
        let flag = ReplicatedFlag::with_replicas(8);
        assert!(!flag.reduce());
        for replica in 0..flag.replicas() {
            flag.clear();
            flag.set_at(replica);
            assert!(flag.reduce(), "replica {replica} was lost by the reduction");
        }
        flag.clear();
        assert!(!flag.reduce());
    }

    /// Only one task out of many sets the flag; the combined value is still `true`.
    #[test]
    fn test_flag_set_inside_pool() {
        let pool = ThreadPoolBuilder::new().num_threads(6).build().unwrap();
        pool.install(|| {
            let flag = ReplicatedFlag::new();
            (0..10_000usize).into_par_iter().for_each(|i| {
                if i == 7_777 {
                    flag.set();
                }
            });
            assert!(flag.reduce());

            flag.clear();
            (0..10_000usize).into_par_iter().for_each(|_| {});
            assert!(!flag.reduce());
        });
    }

    #[test]
    fn test_counter_sum() {
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        pool.install(|| {
            let counter = ReplicatedCounter::new();
            (0..1_000usize).into_par_iter().for_each(|_| counter.add(2));
            assert_eq!(counter.reduce(), 2_000);
            counter.clear();
            assert_eq!(counter.reduce(), 0);
        });
    }

    #[test]
    fn test_fixed_policy_splits_per_thread() {
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        pool.install(|| {
            assert_eq!(Policy::Fixed.min_len(100), 25);
            assert_eq!(Policy::Fixed.min_len(0), 1);
            assert_eq!(Policy::Dynamic.min_len(100), 1);
        });
    }
}

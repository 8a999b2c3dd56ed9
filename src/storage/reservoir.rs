//! Placement and eviction rules for bounded record stores.
//!
//! Event logs use random placement: the stored order is independent of arrival order.
//! Merge targets evict the least recently used record. The carrier-id mismatch log keeps the
//! newest entries in arrival order.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// New records land on a uniformly random position; a full store overwrites a random slot.
    #[default]
    RandomPlacement,
    /// A full store evicts the record with the smallest `last_used_millis`, first found on ties.
    LeastRecentlyUsed,
    /// A full store drops its first record and appends the new one at the end.
    OldestFirst,
}

/// Where a new record goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Push at the end.
    Append,
    /// Push at the end, then swap it with the record at this index.
    AppendSwapped(usize),
    /// Overwrite the record at this index.
    Replace(usize),
    /// Remove the first record, then push at the end.
    ShiftOut,
}

impl EvictionPolicy {
    /// Picks the slot for a new record.
    ///
    /// `last_used` yields the LRU timestamps of the current records in storage order and is
    /// only consumed by `LeastRecentlyUsed` when the store is full. `capacity` must be positive.
    pub fn choose_slot<R, I>(self, len: usize, capacity: usize, last_used: I, rng: &mut R) -> Slot
    where
        R: Rng + ?Sized,
        I: IntoIterator<Item = i64>,
    {
        let full = len >= capacity;
        match (self, full) {
            (EvictionPolicy::OldestFirst, false) => Slot::Append,
            (EvictionPolicy::OldestFirst, true) => Slot::ShiftOut,
            (_, false) => {
                // The new record takes a random position among len + 1 slots; the displaced
                // occupant moves to the end.
                let index = rng.gen_range(0..=len);
                if index == len {
                    Slot::Append
                } else {
                    Slot::AppendSwapped(index)
                }
            }
            (EvictionPolicy::RandomPlacement, true) => Slot::Replace(rng.gen_range(0..len)),
            (EvictionPolicy::LeastRecentlyUsed, true) => Slot::Replace(least_recently_used(last_used)),
        }
    }
}

/// Index of the smallest timestamp, first one on ties. Empty input yields 0.
fn least_recently_used<I: IntoIterator<Item = i64>>(last_used: I) -> usize {
    let mut best: Option<(usize, i64)> = None;
    for (index, millis) in last_used.into_iter().enumerate() {
        match best {
            Some((_, best_millis)) if best_millis <= millis => {}
            _ => best = Some((index, millis)),
        }
    }
    best.map(|(index, _)| index).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_lru_picks_first_minimum() {
        assert_eq!(least_recently_used([5, 3, 9, 3, 4]), 1);
        assert_eq!(least_recently_used([1]), 0);
        assert_eq!(least_recently_used(std::iter::empty()), 0);
    }

    #[test]
    fn test_full_lru_store_replaces_oldest() {
        let mut rng = StdRng::seed_from_u64(7);
        let slot = EvictionPolicy::LeastRecentlyUsed.choose_slot(3, 3, [30, 10, 20], &mut rng);
        assert_eq!(slot, Slot::Replace(1));
    }

    #[test]
    fn test_oldest_first_never_uses_randomness() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = EvictionPolicy::OldestFirst;
        assert_eq!(policy.choose_slot(1, 2, [], &mut rng), Slot::Append);
        assert_eq!(policy.choose_slot(2, 2, [], &mut rng), Slot::ShiftOut);
    }

    #[test]
    fn test_random_placement_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for len in 0..10 {
            match EvictionPolicy::RandomPlacement.choose_slot(len, 10, [], &mut rng) {
                Slot::Append => {}
                Slot::AppendSwapped(index) => assert!(index < len),
                other => panic!("unexpected slot {:?} for len {}", other, len),
            }
        }
        for _ in 0..50 {
            match EvictionPolicy::RandomPlacement.choose_slot(10, 10, [], &mut rng) {
                Slot::Replace(index) => assert!(index < 10),
                other => panic!("unexpected slot {:?}", other),
            }
        }
    }

    #[test]
    fn test_random_placement_reaches_every_position() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 4];
        for _ in 0..200 {
            match EvictionPolicy::RandomPlacement.choose_slot(3, 10, [], &mut rng) {
                Slot::Append => seen[3] = true,
                Slot::AppendSwapped(index) => seen[index] = true,
                other => panic!("unexpected slot {:?}", other),
            }
        }
        assert!(seen.iter().all(|hit| *hit));
    }
}

use super::reservoir::{EvictionPolicy, Slot};
use crate::atoms::{Dimensioned, Mergeable};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A record plus the bookkeeping that never leaves storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord<T> {
    pub record: T,
    /// Wall time of the last insert or merge, used for LRU ranking.
    pub last_used_millis: i64,
}

/// Bounded collection of records of one category.
///
/// Only the records are persisted; capacity and policy come from the running configuration
/// and are applied with [`RecordStore::configure`] after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordStore<T> {
    slots: Vec<StoredRecord<T>>,
    #[serde(skip)]
    capacity: usize,
    #[serde(skip)]
    policy: EvictionPolicy,
}

impl<T> Default for RecordStore<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            capacity: 0,
            policy: EvictionPolicy::default(),
        }
    }
}

impl<T> RecordStore<T> {
    pub fn with_capacity(capacity: usize, policy: EvictionPolicy) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Applies capacity and policy, dropping records beyond the capacity.
    ///
    /// Returns the number of records dropped.
    pub fn configure(&mut self, capacity: usize, policy: EvictionPolicy) -> usize {
        self.capacity = capacity;
        self.policy = policy;
        let excess = self.slots.len().saturating_sub(capacity);
        self.slots.truncate(capacity);
        excess
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().map(|slot| &slot.record)
    }

    pub fn stored(&self) -> &[StoredRecord<T>] {
        &self.slots
    }

    /// Inserts a record without merging, placing it according to the eviction policy.
    ///
    /// A store without capacity drops the record.
    pub fn insert<R: Rng + ?Sized>(&mut self, record: T, now_millis: i64, rng: &mut R) {
        if self.capacity == 0 {
            return;
        }
        let slot = self.policy.choose_slot(
            self.slots.len(),
            self.capacity,
            self.slots.iter().map(|slot| slot.last_used_millis),
            rng,
        );
        let stored = StoredRecord {
            record,
            last_used_millis: now_millis,
        };
        match slot {
            Slot::Append => self.slots.push(stored),
            Slot::AppendSwapped(index) => {
                self.slots.push(stored);
                let last = self.slots.len() - 1;
                self.slots.swap(index, last);
            }
            Slot::Replace(index) => self.slots[index] = stored,
            Slot::ShiftOut => {
                self.slots.remove(0);
                self.slots.push(stored);
            }
        }
    }

    /// Removes and returns every record, without the bookkeeping.
    pub fn drain_all(&mut self) -> Vec<T> {
        std::mem::take(&mut self.slots)
            .into_iter()
            .map(|slot| slot.record)
            .collect()
    }

    pub(crate) fn find_by<P>(&mut self, predicate: P) -> Option<&mut StoredRecord<T>>
    where
        P: Fn(&T) -> bool,
    {
        self.slots.iter_mut().find(|slot| predicate(&slot.record))
    }
}

impl<T: Dimensioned> RecordStore<T> {
    /// Finds the record with the same dimensions as `probe`.
    pub fn find(&self, probe: &T) -> Option<&T> {
        self.slots
            .iter()
            .map(|slot| &slot.record)
            .find(|record| record.same_dimensions(probe))
    }

    pub fn contains(&self, probe: &T) -> bool {
        self.find(probe).is_some()
    }
}

impl<T: Mergeable> RecordStore<T> {
    /// Merges `record` into the stored record with the same dimensions, or inserts it.
    ///
    /// Returns true if the record was merged.
    pub fn upsert<R: Rng + ?Sized>(&mut self, record: T, now_millis: i64, rng: &mut R) -> bool {
        if let Some(existing) = self.find_by(|stored| stored.same_dimensions(&record)) {
            existing.record.merge(&record);
            existing.last_used_millis = now_millis;
            return true;
        }
        self.insert(record, now_millis, rng);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::CellularServiceState;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn state(voice_rat: i32, millis: i64) -> CellularServiceState {
        CellularServiceState {
            voice_rat,
            data_rat: voice_rat,
            carrier_id: 1,
            total_time_millis: millis,
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_merges_identical_dimensions() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = RecordStore::with_capacity(5, EvictionPolicy::LeastRecentlyUsed);

        assert!(!store.upsert(state(13, 100), 1, &mut rng));
        assert!(store.upsert(state(13, 200), 2, &mut rng));
        assert!(store.upsert(state(13, 300), 3, &mut rng));

        assert_eq!(store.len(), 1);
        assert_eq!(store.stored()[0].record.total_time_millis, 600);
        assert_eq!(store.stored()[0].last_used_millis, 3);
    }

    #[test]
    fn test_lru_keeps_most_recently_touched() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = RecordStore::with_capacity(3, EvictionPolicy::LeastRecentlyUsed);
        for (millis, rat) in [1, 2, 3, 4, 5].into_iter().zip([1, 2, 3, 4, 5]) {
            store.upsert(state(rat, 10), millis, &mut rng);
            assert!(store.len() <= 3);
        }

        let mut rats: Vec<i32> = store.iter().map(|s| s.voice_rat).collect();
        rats.sort();
        assert_eq!(rats, vec![3, 4, 5]);
    }

    #[test]
    fn test_merge_refresh_protects_from_eviction() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = RecordStore::with_capacity(2, EvictionPolicy::LeastRecentlyUsed);
        store.upsert(state(1, 10), 1, &mut rng);
        store.upsert(state(2, 10), 2, &mut rng);
        store.upsert(state(1, 10), 3, &mut rng);
        store.upsert(state(3, 10), 4, &mut rng);

        let mut rats: Vec<i32> = store.iter().map(|s| s.voice_rat).collect();
        rats.sort();
        assert_eq!(rats, vec![1, 3]);
    }

    #[test]
    fn test_drain_all_empties_store() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut store = RecordStore::with_capacity(4, EvictionPolicy::RandomPlacement);
        for rat in 0..4 {
            store.insert(state(rat, 1), 7, &mut rng);
        }
        let drained = store.drain_all();
        assert_eq!(drained.len(), 4);
        assert!(store.is_empty());
        assert!(store.drain_all().is_empty());
    }

    #[test]
    fn test_random_placement_never_exceeds_capacity() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut store = RecordStore::with_capacity(3, EvictionPolicy::RandomPlacement);
        for rat in 0..20 {
            store.insert(state(rat, 1), rat as i64, &mut rng);
            assert!(store.len() <= 3);
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_configure_truncates() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut store = RecordStore::with_capacity(5, EvictionPolicy::RandomPlacement);
        for rat in 0..5 {
            store.insert(state(rat, 1), 0, &mut rng);
        }
        assert_eq!(store.configure(2, EvictionPolicy::RandomPlacement), 3);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unconfigured_store_drops_records() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut store: RecordStore<CellularServiceState> = RecordStore::default();
        store.insert(state(1, 1), 0, &mut rng);
        assert!(store.is_empty());
    }
}

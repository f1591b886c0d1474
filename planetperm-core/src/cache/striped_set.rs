//! Lock-striped concurrent hash set
//!
//! Items hash to one of N shards and only that shard is locked for
//! insert/remove/contains. Enumeration locks each shard in turn and copies,
//! so a snapshot is consistent per shard but not across shards.

use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::HashSet;
use std::hash::{BuildHasher, Hash};

pub struct StripedHashSet<T> {
    shards: Box<[Mutex<HashSet<T>>]>,
    hasher: RandomState,
}

impl<T> StripedHashSet<T>
where
    T: Hash + Eq + Clone,
{
    /// One shard per available core
    #[must_use]
    pub fn new() -> Self {
        let stripes = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
        Self::with_stripes(stripes)
    }

    /// A stripe count of zero is treated as one
    #[must_use]
    pub fn with_stripes(stripes: usize) -> Self {
        let shards = (0..stripes.max(1))
            .map(|_| Mutex::new(HashSet::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, item: &T) -> &Mutex<HashSet<T>> {
        let index = (self.hasher.hash_one(item) as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Returns `true` if the item was not already present
    pub fn insert(&self, item: T) -> bool {
        self.shard(&item).lock().insert(item)
    }

    pub fn remove(&self, item: &T) -> bool {
        self.shard(item).lock().remove(item)
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.shard(item).lock().contains(item)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }

    pub fn clear(&self) {
        for shard in &*self.shards {
            shard.lock().clear();
        }
    }

    /// Copy of the current contents
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        for shard in &*self.shards {
            out.extend(shard.lock().iter().cloned());
        }
        out
    }

    #[must_use]
    pub fn stripe_count(&self) -> usize {
        self.shards.len()
    }
}

impl<T> Default for StripedHashSet<T>
where
    T: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for StripedHashSet<T>
where
    T: Hash + Eq + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripedHashSet")
            .field("stripes", &self.shards.len())
            .field("len", &self.len())
            .finish()
    }
}

//! Per-channel-type permission cache
//!
//! Maps `(RoleMembership, ChannelId)` to a resolved permission bitfield and
//! keeps two inverse indices so a combo or a channel can be evicted without
//! scanning the whole cache.
//!
//! Entries moka drops for capacity leave the indices on the next write or
//! [`ChannelPermissionCache::run_pending_tasks`], so the indices stay bounded
//! by the live entries. Explicit invalidation leaves them in place.

use dashmap::DashMap;
use moka::notification::RemovalCause;
use parking_lot::Mutex;
use std::sync::Arc;

use super::StripedHashSet;
use crate::models::{ChannelId, ChannelType, RoleMembership};

type ChannelKey = (RoleMembership, ChannelId);

pub struct ChannelPermissionCache {
    channel_type: ChannelType,
    entries: moka::sync::Cache<ChannelKey, u64>,
    /// combo -> channels it has entries for
    by_combo: DashMap<RoleMembership, Arc<StripedHashSet<ChannelId>>>,
    /// channel -> combos that have entries for it
    by_channel: DashMap<ChannelId, Arc<StripedHashSet<RoleMembership>>>,
    /// keys evicted for capacity, still to be dropped from the indices
    evicted: Arc<Mutex<Vec<ChannelKey>>>,
    stripes: usize,
}

impl ChannelPermissionCache {
    #[must_use]
    pub fn new(channel_type: ChannelType, max_capacity: u64, stripes: usize) -> Self {
        let surface = channel_type.as_str();
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let queue = Arc::clone(&evicted);
        let entries = moka::sync::Cache::builder()
            .max_capacity(max_capacity)
            .eviction_listener(move |key: Arc<ChannelKey>, _value, cause| {
                if cause == RemovalCause::Size {
                    queue.lock().push(*key);
                }
                if cause != RemovalCause::Replaced {
                    crate::metrics::cache::CACHE_EVICTIONS
                        .with_label_values(&[surface])
                        .inc();
                }
            })
            .build();

        Self {
            channel_type,
            entries,
            by_combo: DashMap::new(),
            by_channel: DashMap::new(),
            evicted,
            stripes,
        }
    }

    #[must_use]
    pub const fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// Cached bitfield; `None` means not yet computed
    #[must_use]
    pub fn get(&self, combo: &RoleMembership, channel_id: ChannelId) -> Option<u64> {
        let surface = self.channel_type.as_str();
        match self.entries.get(&(*combo, channel_id)) {
            Some(bits) => {
                crate::metrics::cache::CACHE_HITS.with_label_values(&[surface]).inc();
                Some(bits)
            }
            None => {
                crate::metrics::cache::CACHE_MISSES.with_label_values(&[surface]).inc();
                None
            }
        }
    }

    /// Record `(combo, channel_id)` in both inverse indices.
    ///
    /// Must happen before the entry is inserted so a concurrent invalidation
    /// that reads the indices after bumping the generation finds it.
    pub fn register(&self, combo: RoleMembership, channel_id: ChannelId) {
        // inserted under the map guard so an emptied set is never dropped
        // between lookup and insert
        self.by_combo
            .entry(combo)
            .or_insert_with(|| Arc::new(StripedHashSet::with_stripes(self.stripes)))
            .insert(channel_id);
        self.by_channel
            .entry(channel_id)
            .or_insert_with(|| Arc::new(StripedHashSet::with_stripes(self.stripes)))
            .insert(combo);
    }

    fn unindex(&self, combo: RoleMembership, channel_id: ChannelId) {
        if let Some(channels) = self.by_combo.get(&combo) {
            channels.remove(&channel_id);
        }
        self.by_combo.remove_if(&combo, |_, channels| channels.is_empty());

        if let Some(combos) = self.by_channel.get(&channel_id) {
            combos.remove(&combo);
        }
        self.by_channel.remove_if(&channel_id, |_, combos| combos.is_empty());
    }

    /// Drop the index records of entries evicted for capacity.
    ///
    /// A key stored again since its eviction is re-registered: `store`
    /// registers after inserting, and this checks the cache after
    /// unindexing, so one of the two always sees the other.
    fn reap_evicted(&self) {
        let keys = std::mem::take(&mut *self.evicted.lock());
        for (combo, channel_id) in keys {
            self.unindex(combo, channel_id);
            if self.entries.contains_key(&(combo, channel_id)) {
                self.register(combo, channel_id);
            }
        }
    }

    /// Run moka's pending evictions and drop their index records
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
        self.reap_evicted();
    }

    /// Unconditional insert. Resolution results go through
    /// `PlanetPermissionsCache::commit_channel_permissions` instead.
    pub fn insert(&self, combo: RoleMembership, channel_id: ChannelId, bits: u64) {
        self.register(combo, channel_id);
        self.store(combo, channel_id, bits);
    }

    /// Insert a key that is already registered
    pub(super) fn store(&self, combo: RoleMembership, channel_id: ChannelId, bits: u64) {
        self.entries.insert((combo, channel_id), bits);
        // a capacity eviction of an older value may have unindexed the key
        self.register(combo, channel_id);
        self.reap_evicted();
    }

    /// Evict one entry. The indices keep their record of it.
    pub fn remove(&self, combo: &RoleMembership, channel_id: ChannelId) {
        self.entries.invalidate(&(*combo, channel_id));
    }

    /// Evict every channel entry for `combo`.
    ///
    /// The index is read, not drained: a computation that registered before
    /// the caller bumped the generation may still be about to commit.
    pub fn clear_for_combo(&self, combo: &RoleMembership) -> usize {
        let Some(channels) = self.by_combo.get(combo).map(|c| c.clone()) else {
            return 0;
        };
        let channels = channels.snapshot();
        for channel_id in &channels {
            self.entries.invalidate(&(*combo, *channel_id));
        }
        channels.len()
    }

    /// Evict every combo entry for `channel_id`
    pub fn clear_for_channel(&self, channel_id: ChannelId) -> usize {
        let Some(combos) = self.by_channel.get(&channel_id).map(|c| c.clone()) else {
            return 0;
        };
        let combos = combos.snapshot();
        for combo in &combos {
            self.entries.invalidate(&(*combo, channel_id));
        }
        combos.len()
    }

    /// Drop every index record of a deleted channel.
    ///
    /// Its entries must already be evicted under a bumped generation; no
    /// later commit can target a channel that is gone from the hosted table.
    pub fn forget_channel(&self, channel_id: ChannelId) {
        let Some((_, combos)) = self.by_channel.remove(&channel_id) else {
            return;
        };
        for combo in combos.snapshot() {
            if let Some(channels) = self.by_combo.get(&combo) {
                channels.remove(&channel_id);
            }
            self.by_combo.remove_if(&combo, |_, channels| channels.is_empty());
        }
    }

    pub(super) fn clear_indices(&self) {
        self.by_combo.clear();
        self.by_channel.clear();
    }

    pub(super) fn clear_entries(&self) {
        self.entries.invalidate_all();
    }

    pub fn clear(&self) {
        self.clear_indices();
        self.clear_entries();
    }

    /// Number of combos with indexed entries
    #[must_use]
    pub fn indexed_combos(&self) -> usize {
        self.by_combo.len()
    }

    /// Number of channels with indexed entries
    #[must_use]
    pub fn indexed_channels(&self) -> usize {
        self.by_channel.len()
    }

    /// Number of `(combo, channel)` records in the combo index
    #[must_use]
    pub fn indexed_pairs(&self) -> usize {
        self.by_combo.iter().map(|channels| channels.len()).sum()
    }
}

impl std::fmt::Debug for ChannelPermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPermissionCache")
            .field("channel_type", &self.channel_type)
            .field("indexed_combos", &self.by_combo.len())
            .field("indexed_channels", &self.by_channel.len())
            .finish()
    }
}

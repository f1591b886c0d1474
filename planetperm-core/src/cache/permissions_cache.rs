//! Per-planet permission cache
//!
//! Owns every cached surface for one hosted planet: the three channel-type
//! caches, the authority cache, the planet permission cache and the channel
//! access cache, plus the role → combo inverse index and the generation
//! counter.
//!
//! Write-backs and invalidations follow a fixed order so a stale result can
//! never stay cached:
//!
//! - commit: register in the inverse indices, check the generation, insert,
//!   check the generation again and evict if it moved;
//! - targeted invalidation: bump the generation, then read the indices and
//!   evict;
//! - full clear: drop the indices, bump the generation, then drop the
//!   entries.
//!
//! Targeted invalidation never shrinks the indices. An index entry that
//! outlives its cache entry only costs a redundant eviction later. Index
//! records do leave with capacity evictions and with deleted channels.

use dashmap::DashMap;
use moka::notification::RemovalCause;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::{ChannelAccessSnapshot, ChannelPermissionCache, ListPool, StripedHashSet};
use crate::config::PermissionCacheConfig;
use crate::metrics;
use crate::models::{ChannelId, ChannelType, RoleId, RoleMembership};

const AUTHORITY: &str = "authority";
const PLANET: &str = "planet";
const ACCESS: &str = "access";

pub struct PlanetPermissionsCache {
    generation: AtomicU64,
    channel_caches: [ChannelPermissionCache; 3],
    authority: moka::sync::Cache<RoleMembership, u32>,
    planet_permissions: moka::sync::Cache<RoleMembership, u64>,
    access: moka::sync::Cache<RoleMembership, ChannelAccessSnapshot>,
    role_to_combos: DashMap<RoleId, Arc<StripedHashSet<RoleMembership>>>,
    access_pool: ListPool<ChannelId>,
    stripes: usize,
}

fn combo_cache<V>(capacity: u64, surface: &'static str) -> moka::sync::Cache<RoleMembership, V>
where
    V: Clone + Send + Sync + 'static,
{
    moka::sync::Cache::builder()
        .max_capacity(capacity)
        .eviction_listener(move |_key, _value, cause| {
            if cause != RemovalCause::Replaced {
                metrics::cache::CACHE_EVICTIONS.with_label_values(&[surface]).inc();
            }
        })
        .build()
}

fn lookup<V>(cache: &moka::sync::Cache<RoleMembership, V>, surface: &str, combo: &RoleMembership) -> Option<V>
where
    V: Clone + Send + Sync + 'static,
{
    let value = cache.get(combo);
    if value.is_some() {
        metrics::cache::CACHE_HITS.with_label_values(&[surface]).inc();
    } else {
        metrics::cache::CACHE_MISSES.with_label_values(&[surface]).inc();
    }
    value
}

impl PlanetPermissionsCache {
    #[must_use]
    pub fn new(config: &PermissionCacheConfig) -> Self {
        let stripes = config.effective_stripe_count();
        let channel_caches = ChannelType::ALL
            .map(|t| ChannelPermissionCache::new(t, config.channel_cache_capacity, stripes));

        Self {
            generation: AtomicU64::new(0),
            channel_caches,
            authority: combo_cache(config.combo_cache_capacity, AUTHORITY),
            planet_permissions: combo_cache(config.combo_cache_capacity, PLANET),
            access: combo_cache(config.combo_cache_capacity, ACCESS),
            role_to_combos: DashMap::new(),
            access_pool: ListPool::new(config.access_list_pool_size),
            stripes,
        }
    }

    /// Current generation; snapshot this before starting a computation
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    fn discarded(&self, surface: &str, generation: u64) {
        metrics::cache::CACHE_DISCARDS.with_label_values(&[surface]).inc();
        debug!(
            surface,
            expected_generation = generation,
            current_generation = self.generation(),
            "Discarded stale permission write-back"
        );
    }

    #[must_use]
    pub fn channel_cache(&self, channel_type: ChannelType) -> &ChannelPermissionCache {
        &self.channel_caches[channel_type.index()]
    }

    /// Scratch lists for building channel access snapshots
    #[must_use]
    pub const fn access_list_pool(&self) -> &ListPool<ChannelId> {
        &self.access_pool
    }

    // ------------------------------------------------------------------
    // Lookups and write-backs
    // ------------------------------------------------------------------

    #[must_use]
    pub fn get_channel_permissions(
        &self,
        channel_type: ChannelType,
        combo: &RoleMembership,
        channel_id: ChannelId,
    ) -> Option<u64> {
        self.channel_cache(channel_type).get(combo, channel_id)
    }

    /// Write back a channel bitfield computed under `generation`.
    ///
    /// Returns `false` when the result was discarded; the entry is then absent.
    pub fn commit_channel_permissions(
        &self,
        channel_type: ChannelType,
        combo: RoleMembership,
        channel_id: ChannelId,
        bits: u64,
        generation: u64,
    ) -> bool {
        let cache = self.channel_cache(channel_type);
        cache.register(combo, channel_id);

        if !self.is_current(generation) {
            self.discarded(channel_type.as_str(), generation);
            return false;
        }

        cache.store(combo, channel_id, bits);

        if !self.is_current(generation) {
            cache.remove(&combo, channel_id);
            self.discarded(channel_type.as_str(), generation);
            return false;
        }
        true
    }

    fn commit_combo<V>(
        &self,
        cache: &moka::sync::Cache<RoleMembership, V>,
        surface: &str,
        combo: RoleMembership,
        value: V,
        generation: u64,
    ) -> bool
    where
        V: Clone + Send + Sync + 'static,
    {
        if !self.is_current(generation) {
            self.discarded(surface, generation);
            return false;
        }

        cache.insert(combo, value);

        if !self.is_current(generation) {
            cache.invalidate(&combo);
            self.discarded(surface, generation);
            return false;
        }
        true
    }

    #[must_use]
    pub fn get_authority(&self, combo: &RoleMembership) -> Option<u32> {
        lookup(&self.authority, AUTHORITY, combo)
    }

    pub fn commit_authority(&self, combo: RoleMembership, authority: u32, generation: u64) -> bool {
        self.commit_combo(&self.authority, AUTHORITY, combo, authority, generation)
    }

    #[must_use]
    pub fn get_planet_permissions(&self, combo: &RoleMembership) -> Option<u64> {
        lookup(&self.planet_permissions, PLANET, combo)
    }

    pub fn commit_planet_permissions(&self, combo: RoleMembership, bits: u64, generation: u64) -> bool {
        self.commit_combo(&self.planet_permissions, PLANET, combo, bits, generation)
    }

    #[must_use]
    pub fn get_channel_access(&self, combo: &RoleMembership) -> Option<ChannelAccessSnapshot> {
        lookup(&self.access, ACCESS, combo)
    }

    pub fn commit_channel_access(
        &self,
        combo: RoleMembership,
        snapshot: ChannelAccessSnapshot,
        generation: u64,
    ) -> bool {
        self.commit_combo(&self.access, ACCESS, combo, snapshot, generation)
    }

    // ------------------------------------------------------------------
    // Role → combo index
    // ------------------------------------------------------------------

    /// Remember that `combo` resolved through `role_id`.
    ///
    /// Call before committing anything computed for `combo`.
    pub fn register_combo(&self, role_id: RoleId, combo: RoleMembership) {
        let combos = self
            .role_to_combos
            .entry(role_id)
            .or_insert_with(|| Arc::new(StripedHashSet::with_stripes(self.stripes)))
            .clone();
        combos.insert(combo);
    }

    /// Every combo known to have resolved through `role_id`
    #[must_use]
    pub fn combos_for_role(&self, role_id: RoleId) -> Vec<RoleMembership> {
        self.role_to_combos
            .get(&role_id)
            .map(|combos| combos.snapshot())
            .unwrap_or_default()
    }

    /// Drop the index entry of a role that no longer exists
    pub fn forget_role(&self, role_id: RoleId) {
        self.role_to_combos.remove(&role_id);
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    fn evict_combo(&self, combo: &RoleMembership) -> usize {
        let mut evicted = 0;
        for cache in &self.channel_caches {
            evicted += cache.clear_for_combo(combo);
        }
        self.authority.invalidate(combo);
        self.planet_permissions.invalidate(combo);
        self.access.invalidate(combo);
        evicted
    }

    /// Evict everything cached for `combo` on every surface
    pub fn clear_cache_for_combo(&self, combo: &RoleMembership) {
        let generation = self.bump();
        let evicted = self.evict_combo(combo);

        metrics::invalidation::INVALIDATIONS.with_label_values(&["combo"]).inc();
        debug!(generation, channel_entries = evicted, "Cleared permission cache for combo");
    }

    /// Evict everything cached for every combo that resolved through `role_id`
    pub fn clear_cache_for_role(&self, role_id: RoleId) {
        let generation = self.bump();

        let combos = self.combos_for_role(role_id);
        let mut evicted = 0;
        for combo in &combos {
            evicted += self.evict_combo(combo);
        }

        metrics::invalidation::INVALIDATIONS.with_label_values(&["role"]).inc();
        debug!(
            generation,
            role_id = %role_id,
            combos = combos.len(),
            channel_entries = evicted,
            "Cleared permission cache for role"
        );
    }

    /// Evict the `channel_type` entries on `channel_id` of every combo that
    /// resolved through `role_id`, along with those combos' access snapshots
    pub fn clear_cache_for_role_in_channel(&self, role_id: RoleId, channel_id: ChannelId, channel_type: ChannelType) {
        let generation = self.bump();

        let combos = self.combos_for_role(role_id);
        let cache = self.channel_cache(channel_type);
        for combo in &combos {
            cache.remove(combo, channel_id);
            self.access.invalidate(combo);
        }

        metrics::invalidation::INVALIDATIONS
            .with_label_values(&["role_channel"])
            .inc();
        debug!(
            generation,
            role_id = %role_id,
            channel_id = %channel_id,
            combos = combos.len(),
            "Cleared role permissions in channel"
        );
    }

    /// Evict every channel entry for `channel_id`, across all combos and types
    pub fn clear_cache_for_channel(&self, channel_id: ChannelId) {
        let generation = self.bump();

        let mut evicted = 0;
        for cache in &self.channel_caches {
            evicted += cache.clear_for_channel(channel_id);
        }

        metrics::invalidation::INVALIDATIONS.with_label_values(&["channel"]).inc();
        debug!(
            generation,
            channel_id = %channel_id,
            channel_entries = evicted,
            "Cleared permission cache for channel"
        );
    }

    /// Drop the index records of a deleted channel on every channel type.
    ///
    /// Call after [`Self::clear_cache_for_channel`] for the same channel.
    pub fn forget_channel(&self, channel_id: ChannelId) {
        for cache in &self.channel_caches {
            cache.forget_channel(channel_id);
        }
    }

    /// Evict one `(combo, channel)` entry of one channel type
    pub fn clear_cache_for_combo_in_channel(
        &self,
        combo: &RoleMembership,
        channel_id: ChannelId,
        channel_type: ChannelType,
    ) {
        self.bump();
        self.channel_cache(channel_type).remove(combo, channel_id);
        metrics::invalidation::INVALIDATIONS
            .with_label_values(&["combo_channel"])
            .inc();
    }

    /// Evict the channel access snapshot of one combo
    pub fn clear_channel_access(&self, combo: &RoleMembership) {
        self.bump();
        self.access.invalidate(combo);
        metrics::invalidation::INVALIDATIONS.with_label_values(&["access"]).inc();
    }

    /// Evict every channel access snapshot
    pub fn clear_all_channel_access(&self) {
        let generation = self.bump();
        self.access.invalidate_all();
        metrics::invalidation::INVALIDATIONS.with_label_values(&["access"]).inc();
        debug!(generation, "Cleared all channel access snapshots");
    }

    /// Drop every surface and every index
    pub fn clear(&self) {
        // Indices go first: anything registered after this point either
        // snapshotted the old generation and will discard, or belongs to
        // the new generation and must stay indexed.
        self.role_to_combos.clear();
        for cache in &self.channel_caches {
            cache.clear_indices();
        }

        let generation = self.bump();

        for cache in &self.channel_caches {
            cache.clear_entries();
        }
        self.authority.invalidate_all();
        self.planet_permissions.invalidate_all();
        self.access.invalidate_all();

        metrics::invalidation::INVALIDATIONS.with_label_values(&["all"]).inc();
        debug!(generation, "Cleared planet permission cache");
    }
}

impl std::fmt::Debug for PlanetPermissionsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanetPermissionsCache")
            .field("generation", &self.generation())
            .field("channel_caches", &self.channel_caches)
            .field("indexed_roles", &self.role_to_combos.len())
            .finish_non_exhaustive()
    }
}

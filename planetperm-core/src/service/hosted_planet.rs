//! In-memory state of one planet
//!
//! Roles and channels are held as copy-on-write snapshots: readers clone an
//! `Arc` and work on an immutable table, writers build a new table and swap
//! it in. Every mutation must land here *before* the matching cache
//! invalidation bumps the generation, and every computation must snapshot
//! the generation *before* reading these tables.
//!
//! Memoized inheritance targets are stamped with the version of the channel
//! table they were computed from and ignored by readers holding any other
//! version, so they need no generation check.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::cache::PlanetPermissionsCache;
use crate::config::PermissionCacheConfig;
use crate::models::{
    Channel, ChannelId, Planet, PlanetId, PlanetRole, PlanetSnapshot, RoleId, RoleMembership, UserId, MAX_ROLES,
};

/// Roles of a planet, addressable by id and by membership bit
#[derive(Debug, Clone)]
pub struct RoleTable {
    by_index: Vec<Option<PlanetRole>>,
    by_id: HashMap<RoleId, u8>,
    default_role_id: Option<RoleId>,
}

impl RoleTable {
    /// Build a table; the default role is `default_role_id` when given,
    /// otherwise whichever role carries `is_default`
    #[must_use]
    pub fn new(roles: Vec<PlanetRole>, default_role_id: Option<RoleId>) -> Self {
        let default_role_id = default_role_id.or_else(|| roles.iter().find(|r| r.is_default).map(|r| r.id));
        let mut table = Self {
            by_index: vec![None; MAX_ROLES],
            by_id: HashMap::with_capacity(roles.len()),
            default_role_id,
        };
        for role in roles {
            table.insert(role);
        }
        table
    }

    fn insert(&mut self, mut role: PlanetRole) {
        role.is_default = Some(role.id) == self.default_role_id;
        let index = role.flag_bit_index;

        if let Some(previous) = self.by_id.insert(role.id, index) {
            if previous != index {
                self.by_index[usize::from(previous)] = None;
            }
        }
        if let Some(displaced) = &self.by_index[usize::from(index)] {
            if displaced.id != role.id {
                warn!(
                    role_id = %role.id,
                    displaced_role_id = %displaced.id,
                    flag_bit_index = index,
                    "Role flag bit index reused"
                );
                self.by_id.remove(&displaced.id);
            }
        }
        self.by_index[usize::from(index)] = Some(role);
    }

    fn remove(&mut self, role_id: RoleId) -> Option<PlanetRole> {
        let index = self.by_id.remove(&role_id)?;
        if self.default_role_id == Some(role_id) {
            self.default_role_id = None;
        }
        self.by_index[usize::from(index)].take()
    }

    fn set_default(&mut self, role_id: Option<RoleId>) {
        self.default_role_id = role_id;
        for role in self.by_index.iter_mut().flatten() {
            role.is_default = Some(role.id) == role_id;
        }
    }

    /// Re-rank roles; `order` lists ids from most to least authority.
    /// Roles not listed keep their relative order after the listed ones.
    fn reorder(&mut self, order: &[RoleId]) {
        let mut unlisted: Vec<(u32, RoleId)> = self
            .roles()
            .filter(|r| !order.contains(&r.id))
            .map(|r| (r.position, r.id))
            .collect();
        unlisted.sort_unstable();

        let ranked = order
            .iter()
            .copied()
            .filter(|id| self.by_id.contains_key(id))
            .chain(unlisted.into_iter().map(|(_, id)| id));
        let mut updates = Vec::with_capacity(self.by_id.len());
        for (position, role_id) in ranked.enumerate() {
            updates.push((role_id, u32::try_from(position).unwrap_or(u32::MAX)));
        }
        for (role_id, position) in updates {
            if let Some(index) = self.by_id.get(&role_id) {
                if let Some(role) = self.by_index[usize::from(*index)].as_mut() {
                    role.position = position;
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, role_id: RoleId) -> Option<&PlanetRole> {
        let index = self.by_id.get(&role_id)?;
        self.by_index[usize::from(*index)].as_ref()
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&PlanetRole> {
        self.by_index.get(index)?.as_ref()
    }

    #[must_use]
    pub fn default_role(&self) -> Option<&PlanetRole> {
        self.default_role_id.and_then(|id| self.get(id))
    }

    #[must_use]
    pub const fn default_role_id(&self) -> Option<RoleId> {
        self.default_role_id
    }

    pub fn roles(&self) -> impl Iterator<Item = &PlanetRole> {
        self.by_index.iter().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Roles whose bits are set in `combo`, most authority first.
    /// Bits without a role are skipped.
    #[must_use]
    pub fn held_roles(&self, combo: &RoleMembership) -> Vec<&PlanetRole> {
        let mut roles: Vec<&PlanetRole> = combo
            .iter_role_indices()
            .filter_map(|index| self.get_by_index(index))
            .collect();
        roles.sort_by_key(|r| (r.position, r.id));
        roles
    }

    /// [`Self::held_roles`] plus the default role, which every member holds
    #[must_use]
    pub fn resolution_roles(&self, combo: &RoleMembership) -> Vec<&PlanetRole> {
        let mut roles = self.held_roles(combo);
        if let Some(default_role) = self.default_role() {
            if !roles.iter().any(|r| r.id == default_role.id) {
                let at = roles.partition_point(|r| (r.position, r.id) < (default_role.position, default_role.id));
                roles.insert(at, default_role);
            }
        }
        roles
    }
}

/// Channels of a planet in display order
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    version: u64,
    ordered: Vec<Channel>,
    index: HashMap<ChannelId, usize>,
}

impl ChannelTable {
    #[must_use]
    pub fn new(channels: Vec<Channel>) -> Self {
        Self::with_version(channels, 0)
    }

    fn with_version(mut channels: Vec<Channel>, version: u64) -> Self {
        channels.sort_by_key(|c| (c.position, c.id));
        let index = channels.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
        Self {
            version,
            ordered: channels,
            index,
        }
    }

    fn reindex(&mut self) {
        *self = Self::with_version(std::mem::take(&mut self.ordered), self.version);
    }

    fn upsert(&mut self, channel: Channel) -> Option<Channel> {
        let previous = match self.index.get(&channel.id) {
            Some(i) => Some(std::mem::replace(&mut self.ordered[*i], channel)),
            None => {
                self.ordered.push(channel);
                None
            }
        };
        self.reindex();
        previous
    }

    fn remove(&mut self, channel_id: ChannelId) -> Option<Channel> {
        let i = *self.index.get(&channel_id)?;
        let removed = self.ordered.remove(i);
        self.reindex();
        Some(removed)
    }

    /// Bumped on every change to the table
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn get(&self, channel_id: ChannelId) -> Option<&Channel> {
        self.index.get(&channel_id).map(|i| &self.ordered[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.ordered.iter()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ChannelId> {
        self.ordered.iter().map(|c| c.id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Where a channel's permissions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritanceTarget {
    /// Resolve against this channel's nodes
    Channel(ChannelId),
    /// The parent chain is broken or cyclic; deny
    Broken,
}

/// One planet's roles, channels and permission cache
pub struct HostedPlanet {
    planet: RwLock<Arc<Planet>>,
    roles: RwLock<Arc<RoleTable>>,
    channels: RwLock<Arc<ChannelTable>>,
    /// channel -> (table version, target)
    inheritance_targets: DashMap<ChannelId, (u64, InheritanceTarget)>,
    cache: PlanetPermissionsCache,
    max_inheritance_depth: usize,
}

impl HostedPlanet {
    #[must_use]
    pub fn new(snapshot: PlanetSnapshot, config: &PermissionCacheConfig) -> Self {
        let roles = RoleTable::new(snapshot.roles, snapshot.planet.default_role_id);
        let channels = ChannelTable::new(snapshot.channels);
        Self {
            planet: RwLock::new(Arc::new(snapshot.planet)),
            roles: RwLock::new(Arc::new(roles)),
            channels: RwLock::new(Arc::new(channels)),
            inheritance_targets: DashMap::new(),
            cache: PlanetPermissionsCache::new(config),
            max_inheritance_depth: config.max_inheritance_depth,
        }
    }

    #[must_use]
    pub fn id(&self) -> PlanetId {
        self.planet.read().id
    }

    #[must_use]
    pub fn planet(&self) -> Arc<Planet> {
        self.planet.read().clone()
    }

    #[must_use]
    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.planet.read().owner_id == user_id
    }

    #[must_use]
    pub fn roles(&self) -> Arc<RoleTable> {
        self.roles.read().clone()
    }

    #[must_use]
    pub fn channels(&self) -> Arc<ChannelTable> {
        self.channels.read().clone()
    }

    #[must_use]
    pub const fn cache(&self) -> &PlanetPermissionsCache {
        &self.cache
    }

    fn update_roles(&self, f: impl FnOnce(&mut RoleTable)) {
        let mut guard = self.roles.write();
        let mut table = RoleTable::clone(&guard);
        f(&mut table);
        *guard = Arc::new(table);
    }

    fn update_channels<R>(&self, f: impl FnOnce(&mut ChannelTable) -> R) -> R {
        let mut guard = self.channels.write();
        let mut table = ChannelTable::clone(&guard);
        let out = f(&mut table);
        table.version = guard.version + 1;
        *guard = Arc::new(table);
        out
    }

    /// Insert or replace a role; returns the previous version
    pub fn upsert_role(&self, role: PlanetRole) -> Option<PlanetRole> {
        let previous = self.roles.read().get(role.id).cloned();
        self.update_roles(|t| t.insert(role));
        previous
    }

    pub fn remove_role(&self, role_id: RoleId) -> Option<PlanetRole> {
        let mut removed = None;
        self.update_roles(|t| removed = t.remove(role_id));
        removed
    }

    pub fn reorder_roles(&self, order: &[RoleId]) {
        self.update_roles(|t| t.reorder(order));
    }

    /// Replace the planet details; returns the previous copy.
    ///
    /// A changed default role is applied to the role table as well.
    pub fn update_planet(&self, planet: Planet) -> Arc<Planet> {
        let default_role_id = planet.default_role_id;
        let previous = std::mem::replace(&mut *self.planet.write(), Arc::new(planet));
        if previous.default_role_id != default_role_id {
            self.update_roles(|t| t.set_default(default_role_id));
        }
        previous
    }

    pub fn set_default_role(&self, role_id: Option<RoleId>) {
        {
            let mut guard = self.planet.write();
            let mut planet = Planet::clone(&guard);
            planet.default_role_id = role_id;
            *guard = Arc::new(planet);
        }
        self.update_roles(|t| t.set_default(role_id));
    }

    /// Insert or replace a channel; returns the previous version
    pub fn upsert_channel(&self, channel: Channel) -> Option<Channel> {
        self.update_channels(|t| t.upsert(channel))
    }

    pub fn remove_channel(&self, channel_id: ChannelId) -> Option<Channel> {
        self.update_channels(|t| t.remove(channel_id))
    }

    /// Channel whose nodes decide permissions for `channel` in `channels`.
    ///
    /// Follows parents while the current channel inherits. A top-level
    /// channel that inherits resolves to itself.
    pub fn inheritance_target(&self, channels: &ChannelTable, channel: &Channel) -> InheritanceTarget {
        if !channel.inherits_perms {
            return InheritanceTarget::Channel(channel.id);
        }
        if let Some(memo) = self.inheritance_targets.get(&channel.id) {
            if memo.0 == channels.version {
                return memo.1;
            }
        }

        let target = self.walk_parents(channels, channel);
        self.inheritance_targets
            .entry(channel.id)
            .and_modify(|memo| {
                if memo.0 < channels.version {
                    *memo = (channels.version, target);
                }
            })
            .or_insert((channels.version, target));
        target
    }

    fn walk_parents(&self, channels: &ChannelTable, channel: &Channel) -> InheritanceTarget {
        let mut current = channel;
        let mut hops = 0;
        while current.inherits_perms {
            let Some(parent_id) = current.parent_id else {
                break;
            };
            hops += 1;
            if hops > self.max_inheritance_depth {
                warn!(
                    planet_id = %channel.planet_id,
                    channel_id = %channel.id,
                    max_depth = self.max_inheritance_depth,
                    "Permission inheritance chain too deep or cyclic"
                );
                return InheritanceTarget::Broken;
            }
            match channels.get(parent_id) {
                Some(parent) => current = parent,
                None => return InheritanceTarget::Broken,
            }
        }
        InheritanceTarget::Channel(current.id)
    }

    /// Channels whose permissions are inherited, directly or transitively,
    /// from `channel_id`
    #[must_use]
    pub fn inheritors_of(&self, channel_id: ChannelId) -> Vec<ChannelId> {
        let channels = self.channels();
        channels
            .iter()
            .filter(|c| c.id != channel_id && self.inherits_from(&channels, c, channel_id))
            .map(|c| c.id)
            .collect()
    }

    fn inherits_from(&self, channels: &ChannelTable, channel: &Channel, ancestor: ChannelId) -> bool {
        let mut current = channel;
        for _ in 0..self.max_inheritance_depth {
            if !current.inherits_perms {
                return false;
            }
            let Some(parent_id) = current.parent_id else {
                return false;
            };
            if parent_id == ancestor {
                return true;
            }
            match channels.get(parent_id) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    /// Forget memoized targets for `channel_id` and everything inheriting
    /// from it. Stale memos are already ignored; this only frees them.
    pub fn clear_inheritance_cache(&self, channel_id: ChannelId) {
        self.inheritance_targets.remove(&channel_id);
        for inheritor in self.inheritors_of(channel_id) {
            self.inheritance_targets.remove(&inheritor);
        }
    }

    pub fn clear_all_inheritance_caches(&self) {
        self.inheritance_targets.clear();
    }
}

impl std::fmt::Debug for HostedPlanet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedPlanet")
            .field("planet_id", &self.id())
            .field("roles", &self.roles.read().len())
            .field("channels", &self.channels.read().len())
            .field("cache", &self.cache)
            .finish()
    }
}

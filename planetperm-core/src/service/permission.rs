//! Permission service
//!
//! Answers permission queries for planet members and keeps each hosted
//! planet's cache consistent with the mutation events it receives.
//!
//! Planets are hosted lazily: the first query for a planet loads its roles
//! and channels through the [`PermissionRepository`]. Nodes are never hosted;
//! they are fetched on every cold computation.
//!
//! Handlers always update hosted state before invalidating, and every
//! computation snapshots the cache generation before reading hosted state.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::hosted_planet::{ChannelTable, HostedPlanet, InheritanceTarget};
use super::resolver;
use crate::cache::{ChannelAccessSnapshot, InvalidationBus, InvalidationMessage, PermissionFlights};
use crate::config::PermissionCacheConfig;
use crate::models::{
    has_permission, Channel, ChannelId, ChannelPermissions, ChannelType, MemberId, PermissionBits,
    PermissionsNode, Planet, PlanetId, PlanetMember, PlanetRole, RoleId, RoleMembership,
};
use crate::repository::PermissionRepository;
use crate::{metrics, Result};

/// Permission checks and cache maintenance for every hosted planet
#[derive(Clone)]
pub struct PermissionService {
    repository: Arc<dyn PermissionRepository>,
    config: PermissionCacheConfig,
    planets: Arc<DashMap<PlanetId, Arc<HostedPlanet>>>,
    /// Bumped by every mutation handler; guards lazy loads against
    /// publishing a snapshot older than a mutation already handled
    epoch: Arc<AtomicU64>,
    flights: Option<Arc<PermissionFlights>>,
}

impl std::fmt::Debug for PermissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionService")
            .field("hosted_planets", &self.planets.len())
            .field("single_flight", &self.flights.is_some())
            .finish()
    }
}

impl PermissionService {
    #[must_use]
    pub fn new(repository: Arc<dyn PermissionRepository>, config: PermissionCacheConfig) -> Self {
        let flights = config.single_flight.then(|| Arc::new(PermissionFlights::new()));
        Self {
            repository,
            config,
            planets: Arc::new(DashMap::new()),
            epoch: Arc::new(AtomicU64::new(0)),
            flights,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PermissionCacheConfig {
        &self.config
    }

    /// Number of planets currently hosted
    #[must_use]
    pub fn hosted_count(&self) -> usize {
        self.planets.len()
    }

    /// Hosted state of `planet_id`, loading it on first use.
    ///
    /// `Ok(None)` when the planet does not exist. If a mutation is handled
    /// while the planet loads, the loaded copy serves this call only and is
    /// not registered.
    pub async fn hosted(&self, planet_id: PlanetId) -> Result<Option<Arc<HostedPlanet>>> {
        if let Some(hosted) = self.planets.get(&planet_id) {
            return Ok(Some(hosted.clone()));
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let Some(snapshot) = self.repository.load_planet(planet_id).await? else {
            return Ok(None);
        };
        let loaded = Arc::new(HostedPlanet::new(snapshot, &self.config));

        let hosted = match self.planets.entry(planet_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    entry.insert(loaded.clone());
                    info!(
                        planet_id = %planet_id,
                        roles = loaded.roles().len(),
                        channels = loaded.channels().len(),
                        "Hosted planet"
                    );
                } else {
                    debug!(planet_id = %planet_id, "Planet changed while loading, not hosting this copy");
                }
                loaded
            }
        };
        Ok(Some(hosted))
    }

    async fn member(&self, member_id: MemberId) -> Result<Option<PlanetMember>> {
        self.repository.get_member(member_id).await
    }

    // ------------------------------------------------------------------
    // Channel permissions
    // ------------------------------------------------------------------

    /// Every permission bit `member` holds in `channel_id` for `target_type`.
    ///
    /// A missing planet or channel, or a broken inheritance chain, yields 0.
    pub async fn get_channel_permissions(
        &self,
        member: &PlanetMember,
        channel_id: ChannelId,
        target_type: ChannelType,
    ) -> Result<u64> {
        let Some(hosted) = self.hosted(member.planet_id).await? else {
            return Ok(0);
        };
        if hosted.is_owner(member.user_id) {
            return Ok(PermissionBits::FULL_CONTROL);
        }

        let generation = hosted.cache().generation();
        let channels = hosted.channels();
        let Some(channel) = channels.get(channel_id) else {
            return Ok(0);
        };
        self.channel_permissions(&hosted, &channels, member.role_membership, channel, target_type, generation)
            .await
    }

    pub async fn has_channel_permission(
        &self,
        member: &PlanetMember,
        channel_id: ChannelId,
        target_type: ChannelType,
        permission: u64,
    ) -> Result<bool> {
        let bits = self.get_channel_permissions(member, channel_id, target_type).await?;
        Ok(has_permission(bits, permission))
    }

    /// [`Self::has_channel_permission`] for a member looked up by id;
    /// an unknown member is denied
    pub async fn has_channel_permission_for_member(
        &self,
        member_id: MemberId,
        channel_id: ChannelId,
        target_type: ChannelType,
        permission: u64,
    ) -> Result<bool> {
        match self.member(member_id).await? {
            Some(member) => {
                self.has_channel_permission(&member, channel_id, target_type, permission)
                    .await
            }
            None => Ok(false),
        }
    }

    async fn channel_permissions(
        &self,
        hosted: &HostedPlanet,
        channels: &ChannelTable,
        combo: RoleMembership,
        channel: &Channel,
        target_type: ChannelType,
        generation: u64,
    ) -> Result<u64> {
        let target_id = match hosted.inheritance_target(channels, channel) {
            InheritanceTarget::Channel(id) => id,
            InheritanceTarget::Broken => return Ok(0),
        };

        let cache = hosted.cache();
        if let Some(bits) = cache.get_channel_permissions(target_type, &combo, target_id) {
            return Ok(bits);
        }

        let compute = self.compute_channel_permissions(hosted, combo, target_id, target_type);
        let bits = match &self.flights {
            Some(flights) => {
                flights
                    .channel_permissions(hosted.id(), combo, target_id, target_type, generation, compute)
                    .await?
            }
            None => compute.await?,
        };

        cache.commit_channel_permissions(target_type, combo, target_id, bits, generation);
        Ok(bits)
    }

    /// Resolve `combo` against the nodes on `target_id`. Registers the combo
    /// under every role it resolves through before returning.
    async fn compute_channel_permissions(
        &self,
        hosted: &HostedPlanet,
        combo: RoleMembership,
        target_id: ChannelId,
        target_type: ChannelType,
    ) -> Result<u64> {
        let roles = hosted.roles();
        let resolution = roles.resolution_roles(&combo);
        register_combo(hosted, &resolution, combo);

        if resolution.iter().any(|r| r.is_admin) {
            return Ok(PermissionBits::FULL_CONTROL);
        }

        let role_ids: Vec<RoleId> = resolution.iter().map(|r| r.id).collect();
        let nodes: Vec<PermissionsNode> = self
            .repository
            .get_nodes(target_id, target_type, &role_ids)
            .await?;
        Ok(resolver::resolve_channel_permissions(&resolution, &nodes, target_type))
    }

    // ------------------------------------------------------------------
    // Planet permissions and authority
    // ------------------------------------------------------------------

    /// Planet-wide permission bits of `member`; 0 if the planet is gone
    pub async fn get_planet_permissions(&self, member: &PlanetMember) -> Result<u64> {
        let Some(hosted) = self.hosted(member.planet_id).await? else {
            return Ok(0);
        };
        if hosted.is_owner(member.user_id) {
            return Ok(PermissionBits::FULL_CONTROL);
        }

        let cache = hosted.cache();
        let combo = member.role_membership;
        if let Some(bits) = cache.get_planet_permissions(&combo) {
            return Ok(bits);
        }

        let generation = cache.generation();
        let roles = hosted.roles();
        let resolution = roles.resolution_roles(&combo);
        register_combo(&hosted, &resolution, combo);

        let bits = resolver::resolve_planet_permissions(&resolution);
        cache.commit_planet_permissions(combo, bits, generation);
        Ok(bits)
    }

    pub async fn has_planet_permission(&self, member: &PlanetMember, permission: u64) -> Result<bool> {
        let bits = self.get_planet_permissions(member).await?;
        Ok(has_permission(bits, permission))
    }

    /// Authority of `member`: `u32::MAX` for the owner, 0 without roles
    pub async fn get_authority(&self, member: &PlanetMember) -> Result<u32> {
        let Some(hosted) = self.hosted(member.planet_id).await? else {
            return Ok(0);
        };
        if hosted.is_owner(member.user_id) {
            return Ok(u32::MAX);
        }

        let cache = hosted.cache();
        let combo = member.role_membership;
        if let Some(authority) = cache.get_authority(&combo) {
            return Ok(authority);
        }

        let generation = cache.generation();
        let roles = hosted.roles();
        let held = roles.held_roles(&combo);
        register_combo(&hosted, &held, combo);

        let authority = resolver::resolve_authority(&held);
        cache.commit_authority(combo, authority, generation);
        Ok(authority)
    }

    pub async fn get_authority_for_member(&self, member_id: MemberId) -> Result<u32> {
        match self.member(member_id).await? {
            Some(member) => self.get_authority(&member).await,
            None => Ok(0),
        }
    }

    // ------------------------------------------------------------------
    // Channel access
    // ------------------------------------------------------------------

    /// Channels `member` can see, in display order
    pub async fn get_visible_channels(&self, member: &PlanetMember) -> Result<ChannelAccessSnapshot> {
        let Some(hosted) = self.hosted(member.planet_id).await? else {
            return Ok(ChannelAccessSnapshot::empty());
        };
        if hosted.is_owner(member.user_id) {
            return Ok(ChannelAccessSnapshot::from_ordered(&hosted.channels().ids()));
        }

        let cache = hosted.cache();
        let combo = member.role_membership;
        if let Some(snapshot) = cache.get_channel_access(&combo) {
            return Ok(snapshot);
        }

        for attempt in 1..=self.config.max_access_attempts {
            let generation = cache.generation();
            let snapshot = self.channel_access(&hosted, combo, generation).await?;
            if cache.commit_channel_access(combo, snapshot.clone(), generation) {
                return Ok(snapshot);
            }
            debug!(
                planet_id = %hosted.id(),
                attempt,
                "Channel access raced with an invalidation, recomputing"
            );
        }

        let generation = cache.generation();
        self.compute_channel_access(&hosted, combo, generation).await
    }

    pub async fn get_visible_channels_for_member(&self, member_id: MemberId) -> Result<ChannelAccessSnapshot> {
        match self.member(member_id).await? {
            Some(member) => self.get_visible_channels(&member).await,
            None => Ok(ChannelAccessSnapshot::empty()),
        }
    }

    pub async fn has_channel_access(&self, member: &PlanetMember, channel_id: ChannelId) -> Result<bool> {
        Ok(self.get_visible_channels(member).await?.contains(channel_id))
    }

    async fn channel_access(
        &self,
        hosted: &HostedPlanet,
        combo: RoleMembership,
        generation: u64,
    ) -> Result<ChannelAccessSnapshot> {
        let compute = self.compute_channel_access(hosted, combo, generation);
        match &self.flights {
            Some(flights) => {
                flights
                    .channel_access(hosted.id(), combo, generation, compute)
                    .await
            }
            None => compute.await,
        }
    }

    async fn compute_channel_access(
        &self,
        hosted: &HostedPlanet,
        combo: RoleMembership,
        generation: u64,
    ) -> Result<ChannelAccessSnapshot> {
        let channels = hosted.channels();
        let roles = hosted.roles();
        let resolution = roles.resolution_roles(&combo);
        register_combo(hosted, &resolution, combo);

        if resolution.iter().any(|r| r.is_admin) {
            return Ok(ChannelAccessSnapshot::from_ordered(&channels.ids()));
        }

        let mut visible = hosted.cache().access_list_pool().get();
        for channel in channels.iter() {
            if channel.is_default {
                visible.push(channel.id);
                continue;
            }
            let bits = self
                .channel_permissions(hosted, &channels, combo, channel, channel.channel_type, generation)
                .await?;
            if has_permission(bits, ChannelPermissions::VIEW) {
                visible.push(channel.id);
            }
        }
        Ok(ChannelAccessSnapshot::from_ordered(&visible))
    }

    // ------------------------------------------------------------------
    // Mutation handlers
    // ------------------------------------------------------------------

    /// Announce a mutation on `planet_id`; returns its hosted state if loaded
    fn touch(&self, planet_id: PlanetId) -> Option<Arc<HostedPlanet>> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.planets.get(&planet_id).map(|hosted| hosted.clone())
    }

    /// A role was created or edited
    pub fn handle_role_change(&self, role: &PlanetRole) {
        let Some(hosted) = self.touch(role.planet_id) else {
            return;
        };
        let previous = hosted.upsert_role(role.clone());
        match previous {
            Some(previous)
                if previous.flag_bit_index == role.flag_bit_index && previous.position == role.position =>
            {
                hosted.cache().clear_cache_for_role(role.id);
            }
            // new role, re-ranked role or moved membership bit
            _ => hosted.cache().clear(),
        }
    }

    pub fn handle_role_deleted(&self, planet_id: PlanetId, role_id: RoleId) {
        let Some(hosted) = self.touch(planet_id) else {
            return;
        };
        if hosted.remove_role(role_id).is_none() {
            debug!(planet_id = %planet_id, role_id = %role_id, "Deleted role was not hosted");
        }
        hosted.cache().clear_cache_for_role(role_id);
        hosted.cache().forget_role(role_id);
    }

    /// Roles were re-ranked; `order` runs from most to least authority
    pub fn handle_role_order_change(&self, planet_id: PlanetId, order: &[RoleId]) {
        let Some(hosted) = self.touch(planet_id) else {
            return;
        };
        hosted.reorder_roles(order);
        hosted.cache().clear();
    }

    /// A node was created, edited or deleted
    pub fn handle_node_change(&self, node: &PermissionsNode) {
        let Some(hosted) = self.touch(node.planet_id) else {
            return;
        };
        // inheriting channels are cached under the target they resolve to,
        // so evicting the node's own target covers them
        hosted
            .cache()
            .clear_cache_for_role_in_channel(node.role_id, node.target_id, node.target_type);
    }

    /// A channel was created, edited, moved or re-parented
    pub fn handle_channel_change(&self, channel: &Channel) {
        let Some(hosted) = self.touch(channel.planet_id) else {
            return;
        };
        let previous = hosted.upsert_channel(channel.clone());
        let topology_changed = previous
            .as_ref()
            .is_some_and(|p| p.inheritance_differs(channel) || p.channel_type != channel.channel_type);

        if topology_changed {
            hosted.clear_inheritance_cache(channel.id);
            hosted.cache().clear_cache_for_channel(channel.id);
            for inheritor in hosted.inheritors_of(channel.id) {
                hosted.cache().clear_cache_for_channel(inheritor);
            }
        }
        hosted.cache().clear_all_channel_access();
    }

    pub fn handle_channel_deleted(&self, planet_id: PlanetId, channel_id: ChannelId) {
        let Some(hosted) = self.touch(planet_id) else {
            return;
        };
        let inheritors = hosted.inheritors_of(channel_id);
        hosted.clear_inheritance_cache(channel_id);
        if hosted.remove_channel(channel_id).is_none() {
            debug!(planet_id = %planet_id, channel_id = %channel_id, "Deleted channel was not hosted");
        }

        hosted.cache().clear_cache_for_channel(channel_id);
        hosted.cache().forget_channel(channel_id);
        for inheritor in inheritors {
            hosted.cache().clear_cache_for_channel(inheritor);
        }
        hosted.cache().clear_all_channel_access();
    }

    pub fn handle_default_role_change(&self, planet_id: PlanetId, role_id: Option<RoleId>) {
        let Some(hosted) = self.touch(planet_id) else {
            return;
        };
        hosted.set_default_role(role_id);
        hosted.cache().clear();
    }

    /// Planet details were edited: ownership transfer, default role or name.
    ///
    /// Owner answers are never cached, so swapping the hosted copy is enough
    /// for a transfer. A new default role changes every combo's resolution.
    pub fn handle_planet_change(&self, planet: &Planet) {
        let Some(hosted) = self.touch(planet.id) else {
            return;
        };
        let previous = hosted.update_planet(planet.clone());
        if previous.owner_id != planet.owner_id {
            info!(
                planet_id = %planet.id,
                previous_owner = %previous.owner_id,
                owner = %planet.owner_id,
                "Planet ownership transferred"
            );
        }
        if previous.default_role_id != planet.default_role_id {
            hosted.cache().clear();
        }
    }

    /// Stop hosting a deleted planet
    pub fn handle_planet_deleted(&self, planet_id: PlanetId) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some((_, hosted)) = self.planets.remove(&planet_id) {
            hosted.cache().clear();
            info!(planet_id = %planet_id, "Stopped hosting deleted planet");
        }
    }

    /// Drop every hosted planet; they reload from the repository on demand
    pub fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let hosted: Vec<Arc<HostedPlanet>> = self.planets.iter().map(|entry| entry.value().clone()).collect();
        for planet in &hosted {
            planet.cache().clear();
        }
        self.planets.clear();
        info!(planets = hosted.len(), "Dropped all hosted planets");
    }

    /// Apply one invalidation event
    pub fn apply_invalidation(&self, message: &InvalidationMessage) {
        debug!(kind = message.kind(), planet_id = ?message.planet_id(), "Applying permission invalidation");
        metrics::messages::INVALIDATION_MESSAGES
            .with_label_values(&[message.kind()])
            .inc();
        match message {
            InvalidationMessage::RoleChanged { role } => self.handle_role_change(role),
            InvalidationMessage::RoleDeleted { planet_id, role_id } => {
                self.handle_role_deleted(*planet_id, *role_id);
            }
            InvalidationMessage::RoleOrderChanged { planet_id, order } => {
                self.handle_role_order_change(*planet_id, order);
            }
            InvalidationMessage::NodeChanged { node } => self.handle_node_change(node),
            InvalidationMessage::ChannelChanged { channel } => self.handle_channel_change(channel),
            InvalidationMessage::ChannelDeleted { planet_id, channel_id } => {
                self.handle_channel_deleted(*planet_id, *channel_id);
            }
            InvalidationMessage::DefaultRoleChanged { planet_id, role_id } => {
                self.handle_default_role_change(*planet_id, *role_id);
            }
            InvalidationMessage::PlanetChanged { planet } => self.handle_planet_change(planet),
            InvalidationMessage::PlanetDeleted { planet_id } => self.handle_planet_deleted(*planet_id),
            InvalidationMessage::All => self.invalidate_all(),
        }
    }

    /// Apply every message published on `bus` until the bus closes.
    ///
    /// A lagging listener has missed events it cannot replay, so it drops
    /// every hosted planet.
    pub fn start_invalidation_listener(&self, bus: &InvalidationBus) -> JoinHandle<()> {
        let service = self.clone();
        let mut receiver = bus.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => service.apply_invalidation(&message),
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Permission invalidation bus closed, stopping listener");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            lagged_messages = n,
                            "Permission invalidation listener lagged, dropping all hosted planets"
                        );
                        service.invalidate_all();
                    }
                }
            }
        })
    }
}

fn register_combo(hosted: &HostedPlanet, roles: &[&PlanetRole], combo: RoleMembership) {
    for role in roles {
        hosted.cache().register_combo(role.id, combo);
    }
}

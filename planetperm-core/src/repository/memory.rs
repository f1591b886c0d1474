use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::PermissionRepository;
use crate::models::{
    Channel, ChannelId, ChannelType, MemberId, PermissionsNode, Planet, PlanetId, PlanetMember, PlanetRole,
    PlanetSnapshot, RoleId, RoleMembership,
};
use crate::{Error, Result};

type NodeKey = (RoleId, ChannelId, ChannelType);

#[derive(Default)]
struct Store {
    planets: HashMap<PlanetId, PlanetSnapshot>,
    members: HashMap<MemberId, PlanetMember>,
    nodes: HashMap<NodeKey, PermissionsNode>,
}

/// In-memory [`PermissionRepository`]
///
/// Mutators only change stored data. Publishing the matching invalidation is
/// the caller's job, as it would be after a database write.
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<Store>,
}

impl MemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_planet(&self, snapshot: PlanetSnapshot) {
        self.store.write().planets.insert(snapshot.planet.id, snapshot);
    }

    /// Remove a planet with its members and nodes
    pub fn remove_planet(&self, planet_id: PlanetId) -> Option<PlanetSnapshot> {
        let mut store = self.store.write();
        store.members.retain(|_, m| m.planet_id != planet_id);
        store.nodes.retain(|_, n| n.planet_id != planet_id);
        store.planets.remove(&planet_id)
    }

    pub fn update_planet(&self, planet: Planet) -> Result<()> {
        let mut store = self.store.write();
        let snapshot = store
            .planets
            .get_mut(&planet.id)
            .ok_or_else(|| Error::NotFound(format!("planet {}", planet.id)))?;
        snapshot.planet = planet;
        Ok(())
    }

    /// Insert or replace a role, keyed by id.
    ///
    /// Two roles of one planet can not share a membership bit.
    pub fn upsert_role(&self, role: PlanetRole) -> Result<()> {
        let mut store = self.store.write();
        let snapshot = store
            .planets
            .get_mut(&role.planet_id)
            .ok_or_else(|| Error::NotFound(format!("planet {}", role.planet_id)))?;
        if let Some(holder) = snapshot
            .roles
            .iter()
            .find(|r| r.id != role.id && r.flag_bit_index == role.flag_bit_index)
        {
            return Err(Error::InvalidInput(format!(
                "membership bit {} already belongs to role {}",
                role.flag_bit_index, holder.id
            )));
        }
        if let Some(existing) = snapshot.roles.iter_mut().find(|r| r.id == role.id) {
            *existing = role;
        } else {
            snapshot.roles.push(role);
        }
        Ok(())
    }

    /// Remove a role, its nodes and its bit from every member
    pub fn remove_role(&self, planet_id: PlanetId, role_id: RoleId) -> Option<PlanetRole> {
        let mut store = self.store.write();
        let snapshot = store.planets.get_mut(&planet_id)?;
        let pos = snapshot.roles.iter().position(|r| r.id == role_id)?;
        let role = snapshot.roles.remove(pos);

        store.nodes.retain(|_, n| n.role_id != role_id);
        for member in store.members.values_mut() {
            if member.planet_id == planet_id {
                member.role_membership = member.role_membership.without_role(usize::from(role.flag_bit_index));
            }
        }
        Some(role)
    }

    pub fn upsert_channel(&self, channel: Channel) -> Result<()> {
        let mut store = self.store.write();
        let snapshot = store
            .planets
            .get_mut(&channel.planet_id)
            .ok_or_else(|| Error::NotFound(format!("planet {}", channel.planet_id)))?;
        if let Some(existing) = snapshot.channels.iter_mut().find(|c| c.id == channel.id) {
            *existing = channel;
        } else {
            snapshot.channels.push(channel);
        }
        Ok(())
    }

    /// Remove a channel and the nodes targeting it
    pub fn remove_channel(&self, planet_id: PlanetId, channel_id: ChannelId) -> Option<Channel> {
        let mut store = self.store.write();
        let snapshot = store.planets.get_mut(&planet_id)?;
        let pos = snapshot.channels.iter().position(|c| c.id == channel_id)?;
        let channel = snapshot.channels.remove(pos);
        store.nodes.retain(|_, n| n.target_id != channel_id);
        Some(channel)
    }

    /// Insert or replace the node for `(role, target, type)`
    pub fn upsert_node(&self, node: PermissionsNode) {
        let key = (node.role_id, node.target_id, node.target_type);
        self.store.write().nodes.insert(key, node);
    }

    pub fn remove_node(
        &self,
        role_id: RoleId,
        target_id: ChannelId,
        target_type: ChannelType,
    ) -> Option<PermissionsNode> {
        self.store.write().nodes.remove(&(role_id, target_id, target_type))
    }

    pub fn upsert_member(&self, member: PlanetMember) {
        self.store.write().members.insert(member.id, member);
    }

    pub fn set_member_roles(&self, member_id: MemberId, role_membership: RoleMembership) -> Result<()> {
        let mut store = self.store.write();
        let member = store
            .members
            .get_mut(&member_id)
            .ok_or_else(|| Error::NotFound(format!("member {member_id}")))?;
        member.role_membership = role_membership;
        Ok(())
    }

    pub fn remove_member(&self, member_id: MemberId) -> Option<PlanetMember> {
        self.store.write().members.remove(&member_id)
    }
}

#[async_trait]
impl PermissionRepository for MemoryRepository {
    async fn load_planet(&self, planet_id: PlanetId) -> Result<Option<PlanetSnapshot>> {
        Ok(self.store.read().planets.get(&planet_id).cloned())
    }

    async fn get_member(&self, member_id: MemberId) -> Result<Option<PlanetMember>> {
        Ok(self.store.read().members.get(&member_id).copied())
    }

    async fn get_nodes(
        &self,
        target_id: ChannelId,
        target_type: ChannelType,
        role_ids: &[RoleId],
    ) -> Result<Vec<PermissionsNode>> {
        let store = self.store.read();
        Ok(role_ids
            .iter()
            .filter_map(|role_id| store.nodes.get(&(*role_id, target_id, target_type)).cloned())
            .collect())
    }
}

impl std::fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read();
        f.debug_struct("MemoryRepository")
            .field("planets", &store.planets.len())
            .field("members", &store.members.len())
            .field("nodes", &store.nodes.len())
            .finish()
    }
}

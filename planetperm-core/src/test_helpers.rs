//! Test fixtures for planetperm-core unit tests
//!
//! [`PlanetFixture`] builds one small planet:
//!
//! - roles `admin` (position 0), `member` (position 1) and the default role
//!   `everyone` (last), which denies chat View by default;
//! - channels `general` (default chat channel), `c42` (chat), `category`
//!   and `synced_channel` (chat, inherits from `category`);
//! - one node: `member` is granted View on `c42`.

use std::sync::Arc;

use crate::config::PermissionCacheConfig;
use crate::models::{
    CategoryPermissions, Channel, ChannelId, ChannelType, ChatChannelPermissions, MemberId, NodeId,
    PermissionsNode, Planet, PlanetId, PlanetMember, PlanetPermissions, PlanetRole, PlanetSnapshot, RoleId,
    RoleMembership, UserId, VoiceChannelPermissions,
};
use crate::repository::{MemoryRepository, PermissionRepository};
use crate::service::HostedPlanet;

pub const OWNER: UserId = UserId(1);
pub const USER: UserId = UserId(2);

/// Create a test role with no permissions
pub fn test_role(planet_id: PlanetId, id: i64, flag_bit_index: u8, position: u32) -> PlanetRole {
    PlanetRole {
        id: RoleId(id),
        planet_id,
        name: format!("role-{id}"),
        position,
        is_admin: false,
        is_default: false,
        flag_bit_index,
        permissions: 0,
        chat_permissions: 0,
        category_permissions: 0,
        voice_permissions: 0,
    }
}

/// Create a test channel that does not inherit
pub fn test_channel(planet_id: PlanetId, id: i64, channel_type: ChannelType, position: u32) -> Channel {
    Channel {
        id: ChannelId(id),
        planet_id,
        name: format!("channel-{id}"),
        channel_type,
        parent_id: None,
        inherits_perms: false,
        is_default: false,
        position,
    }
}

pub struct PlanetFixture {
    pub planet: Planet,
    pub roles: Vec<PlanetRole>,
    pub channels: Vec<Channel>,
    pub nodes: Vec<PermissionsNode>,
    pub everyone: RoleId,
    pub member: RoleId,
    pub admin: RoleId,
    pub general: ChannelId,
    pub c42: ChannelId,
    pub category: ChannelId,
    pub synced_channel: ChannelId,
}

impl PlanetFixture {
    pub fn new() -> Self {
        let planet_id = PlanetId(1);
        let everyone = PlanetRole {
            name: "Everyone".to_string(),
            is_default: true,
            permissions: PlanetPermissions::DEFAULT,
            chat_permissions: ChatChannelPermissions::DEFAULT & !ChatChannelPermissions::VIEW,
            category_permissions: CategoryPermissions::DEFAULT,
            voice_permissions: VoiceChannelPermissions::DEFAULT,
            ..test_role(planet_id, 10, 0, u32::MAX)
        };
        let member = PlanetRole {
            name: "Member".to_string(),
            permissions: PlanetPermissions::INVITE,
            ..test_role(planet_id, 11, 1, 1)
        };
        let admin = PlanetRole {
            name: "Admin".to_string(),
            is_admin: true,
            ..test_role(planet_id, 12, 2, 0)
        };

        let general = Channel {
            is_default: true,
            ..test_channel(planet_id, 40, ChannelType::PlanetChat, 0)
        };
        let c42 = test_channel(planet_id, 42, ChannelType::PlanetChat, 1);
        let category = test_channel(planet_id, 50, ChannelType::PlanetCategory, 2);
        let synced = Channel {
            parent_id: Some(category.id),
            inherits_perms: true,
            ..test_channel(planet_id, 51, ChannelType::PlanetChat, 3)
        };

        let node = PermissionsNode {
            id: NodeId(1),
            planet_id,
            role_id: member.id,
            target_id: c42.id,
            target_type: ChannelType::PlanetChat,
            code: ChatChannelPermissions::VIEW,
            mask: ChatChannelPermissions::VIEW,
        };

        Self {
            planet: Planet {
                id: planet_id,
                name: "fixture".to_string(),
                owner_id: OWNER,
                default_role_id: Some(everyone.id),
            },
            everyone: everyone.id,
            member: member.id,
            admin: admin.id,
            general: general.id,
            c42: c42.id,
            category: category.id,
            synced_channel: synced.id,
            roles: vec![everyone, member, admin],
            channels: vec![general, c42, category, synced],
            nodes: vec![node],
        }
    }

    pub fn role(&self, id: RoleId) -> &PlanetRole {
        self.roles.iter().find(|r| r.id == id).expect("fixture role")
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        self.channels.iter().find(|c| c.id == id).expect("fixture channel")
    }

    pub fn snapshot(&self) -> PlanetSnapshot {
        PlanetSnapshot {
            planet: self.planet.clone(),
            roles: self.roles.clone(),
            channels: self.channels.clone(),
        }
    }

    pub fn hosted(&self) -> HostedPlanet {
        HostedPlanet::new(
            self.snapshot(),
            &PermissionCacheConfig {
                stripe_count: 4,
                ..PermissionCacheConfig::default()
            },
        )
    }

    /// Role membership holding exactly `roles`
    pub fn combo(&self, roles: &[RoleId]) -> RoleMembership {
        RoleMembership::from_role_indices(roles.iter().map(|id| usize::from(self.role(*id).flag_bit_index)))
    }

    /// A non-owner member holding `roles`
    pub fn member_with(&self, roles: &[RoleId]) -> PlanetMember {
        PlanetMember {
            id: MemberId(100),
            user_id: USER,
            planet_id: self.planet.id,
            role_membership: self.combo(roles),
        }
    }

    pub fn owner(&self) -> PlanetMember {
        PlanetMember {
            id: MemberId(1),
            user_id: OWNER,
            planet_id: self.planet.id,
            role_membership: RoleMembership::EMPTY,
        }
    }

    /// Memory repository seeded with the planet and its nodes
    pub fn memory_repository(&self) -> Arc<MemoryRepository> {
        let repo = MemoryRepository::new();
        repo.insert_planet(self.snapshot());
        for node in &self.nodes {
            repo.upsert_node(node.clone());
        }
        Arc::new(repo)
    }

    pub fn repository(&self) -> Arc<dyn PermissionRepository> {
        self.memory_repository()
    }
}

impl Default for PlanetFixture {
    fn default() -> Self {
        Self::new()
    }
}

use serde::{Deserialize, Serialize};

use super::{Channel, MemberId, PlanetId, PlanetRole, RoleId, RoleMembership, UserId};

/// A planet (community)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planet {
    pub id: PlanetId,
    pub name: String,
    pub owner_id: UserId,
    pub default_role_id: Option<RoleId>,
}

/// One user's membership in one planet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanetMember {
    pub id: MemberId,
    pub user_id: UserId,
    pub planet_id: PlanetId,
    pub role_membership: RoleMembership,
}

/// Everything needed to host a planet's permission state in memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanetSnapshot {
    pub planet: Planet,
    pub roles: Vec<PlanetRole>,
    pub channels: Vec<Channel>,
}

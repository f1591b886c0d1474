//! Permission resolution
//!
//! Pure functions over already-loaded roles and nodes. Callers supply the
//! roles a combination resolves through, ordered by position ascending (most
//! authority first) and including the planet's default role, plus the nodes
//! those roles have on the effective target.
//!
//! For each permission bit the first role, in authority order, whose node
//! defines the bit decides it. A role without a node is skipped unless it is
//! the default role, in which case its base permissions decide every bit
//! still undecided. Anything left undecided is denied. An admin role anywhere
//! in the list grants everything.

use crate::models::{
    has_permission, ChannelType, PermissionBits, PermissionState, PermissionsNode, PlanetPermissions,
    PlanetRole,
};

fn node_for<'a>(nodes: &'a [PermissionsNode], role: &PlanetRole) -> Option<&'a PermissionsNode> {
    nodes.iter().find(|n| n.role_id == role.id)
}

/// Resolve a single permission for one channel domain
#[must_use]
pub fn resolve_permission(
    roles: &[&PlanetRole],
    nodes: &[PermissionsNode],
    channel_type: ChannelType,
    permission: u64,
) -> bool {
    if roles.iter().any(|r| r.is_admin) {
        return true;
    }

    for role in roles {
        match node_for(nodes, role) {
            Some(node) => match node.get_state(permission) {
                PermissionState::True => return true,
                PermissionState::False => return false,
                PermissionState::Undefined => {}
            },
            None if role.is_default => {
                return has_permission(role.base_permissions(channel_type), permission);
            }
            None => {}
        }
    }

    false
}

/// Resolve every bit of one channel domain at once.
///
/// Agrees with [`resolve_permission`] bit by bit.
#[must_use]
pub fn resolve_channel_permissions(
    roles: &[&PlanetRole],
    nodes: &[PermissionsNode],
    channel_type: ChannelType,
) -> u64 {
    if roles.iter().any(|r| r.is_admin) {
        return PermissionBits::FULL_CONTROL;
    }

    let mut granted = 0u64;
    let mut decided = 0u64;

    for role in roles {
        match node_for(nodes, role) {
            Some(node) => {
                let code = node.node_code();
                if code.denies_view() {
                    // every undecided bit is now false
                    return granted;
                }
                let fresh = code.mask & !decided;
                granted |= code.code & fresh;
                decided |= fresh;
            }
            None if role.is_default => {
                return granted | (role.base_permissions(channel_type) & !decided);
            }
            None => {}
        }

        if decided == u64::MAX {
            break;
        }
    }

    granted
}

/// Planet-wide permissions: the union of every role's planet bits.
///
/// Every member can view the planet they belong to.
#[must_use]
pub fn resolve_planet_permissions(roles: &[&PlanetRole]) -> u64 {
    let mut permissions = PlanetPermissions::VIEW;
    for role in roles {
        if role.is_admin {
            return PermissionBits::FULL_CONTROL;
        }
        permissions |= role.permissions;
    }
    permissions
}

/// Authority of the most authoritative role; 0 without roles
#[must_use]
pub fn resolve_authority(roles: &[&PlanetRole]) -> u32 {
    roles
        .iter()
        .min_by_key(|r| r.position)
        .map_or(0, |r| r.authority())
}

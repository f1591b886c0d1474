use serde::{Deserialize, Serialize};

use super::{ChannelId, ChannelType, NodeId, PermissionNodeCode, PermissionState, PlanetId, RoleId};

/// Per-role override on one target.
///
/// At most one node exists per `(role_id, target_id, target_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsNode {
    pub id: NodeId,
    pub planet_id: PlanetId,
    pub role_id: RoleId,
    pub target_id: ChannelId,
    /// Permission domain the node applies to; a chat node on a category
    /// governs chat channels inheriting from that category
    pub target_type: ChannelType,
    pub code: u64,
    pub mask: u64,
}

impl PermissionsNode {
    #[must_use]
    pub const fn node_code(&self) -> PermissionNodeCode {
        PermissionNodeCode::new(self.code, self.mask)
    }

    #[must_use]
    pub const fn get_state(&self, permission: u64) -> PermissionState {
        self.node_code().get_state(permission)
    }

    pub const fn set_state(&mut self, permission: u64, state: PermissionState) {
        let mut code = self.node_code();
        code.set_state(permission, state);
        self.code = code.code;
        self.mask = code.mask;
    }
}

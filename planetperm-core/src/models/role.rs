use serde::{Deserialize, Serialize};

use super::{ChannelType, PermissionBits, PlanetId, RoleId};

/// A planet role
///
/// Lower `position` means more authority. Positions are unique within a
/// planet, so sorting by position is a total order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanetRole {
    pub id: RoleId,
    pub planet_id: PlanetId,
    pub name: String,
    pub position: u32,
    /// Bypasses every check, including explicit deny nodes
    pub is_admin: bool,
    /// The planet's implicit "everyone" role
    pub is_default: bool,
    /// Slot in [`super::RoleMembership`]; stable across reorders
    pub flag_bit_index: u8,
    /// Planet-wide permissions
    pub permissions: u64,
    pub chat_permissions: u64,
    pub category_permissions: u64,
    pub voice_permissions: u64,
}

impl PlanetRole {
    /// Authority used for "who out-ranks whom" comparisons.
    ///
    /// The planet owner is `u32::MAX`; a role sits just below it, one step
    /// lower per position.
    #[must_use]
    pub const fn authority(&self) -> u32 {
        u32::MAX - self.position.saturating_add(1)
    }

    /// Base permissions of this role for a channel domain
    #[must_use]
    pub const fn base_permissions(&self, channel_type: ChannelType) -> u64 {
        if self.is_admin {
            return PermissionBits::FULL_CONTROL;
        }
        match channel_type {
            ChannelType::PlanetChat => self.chat_permissions,
            ChannelType::PlanetCategory => self.category_permissions,
            ChannelType::PlanetVoice => self.voice_permissions,
        }
    }
}

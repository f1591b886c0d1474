//! Permission bitfields
//!
//! Every permission domain (planet, chat channel, category, voice channel)
//! is a 64-bit field. Bit values are stable: an update must never change the
//! value of an existing permission.
//!
//! Overrides are expressed as a `(code, mask)` pair: a mask bit of 0 leaves
//! the permission undefined, a mask bit of 1 defines it as the code bit.

use serde::{Deserialize, Serialize};

use super::ChannelType;

/// Values that mean the same thing in every permission domain
pub struct PermissionBits;

impl PermissionBits {
    /// Every bit set; grants everything in every domain
    pub const FULL_CONTROL: u64 = u64::MAX;

    pub const NONE: u64 = 0;
}

/// Whether `code` grants every bit of `permission`.
///
/// `FULL_CONTROL` grants everything, including multi-bit permissions.
#[must_use]
pub const fn has_permission(code: u64, permission: u64) -> bool {
    if code == PermissionBits::FULL_CONTROL {
        return true;
    }
    (code & permission) == permission
}

/// Bits shared by every channel-like domain
pub struct ChannelPermissions;

impl ChannelPermissions {
    /// See the channel/category in the channel list
    pub const VIEW: u64 = 0x01;
    // Gap from 0x01 to 0x08 is domain specific
    /// Manage the channel/category details
    pub const MANAGE: u64 = 0x08;
    /// Manage permission nodes on the channel/category
    pub const PERMISSIONS: u64 = 0x10;

    /// Default code for a channel type
    #[must_use]
    pub const fn default_for(channel_type: ChannelType) -> u64 {
        match channel_type {
            ChannelType::PlanetChat => ChatChannelPermissions::DEFAULT,
            ChannelType::PlanetCategory => CategoryPermissions::DEFAULT,
            ChannelType::PlanetVoice => VoiceChannelPermissions::DEFAULT,
        }
    }
}

/// Chat channel permissions
pub struct ChatChannelPermissions;

impl ChatChannelPermissions {
    pub const VIEW: u64 = ChannelPermissions::VIEW;
    pub const VIEW_MESSAGES: u64 = 0x02;
    pub const POST_MESSAGES: u64 = 0x04;
    pub const MANAGE_CHANNEL: u64 = ChannelPermissions::MANAGE;
    pub const MANAGE_PERMISSIONS: u64 = ChannelPermissions::PERMISSIONS;
    pub const EMBED: u64 = 0x20;
    pub const ATTACH_CONTENT: u64 = 0x40;
    pub const MANAGE_MESSAGES: u64 = 0x80;
    pub const USE_ECONOMY: u64 = 0x100;

    pub const DEFAULT: u64 = Self::VIEW | Self::VIEW_MESSAGES | Self::POST_MESSAGES;
}

/// Category permissions
pub struct CategoryPermissions;

impl CategoryPermissions {
    pub const VIEW: u64 = ChannelPermissions::VIEW;
    pub const MANAGE_CATEGORY: u64 = ChannelPermissions::MANAGE;
    pub const MANAGE_PERMISSIONS: u64 = ChannelPermissions::PERMISSIONS;

    pub const DEFAULT: u64 = Self::VIEW;
}

/// Voice channel permissions
pub struct VoiceChannelPermissions;

impl VoiceChannelPermissions {
    pub const VIEW: u64 = ChannelPermissions::VIEW;
    pub const JOIN: u64 = 0x02;
    pub const SPEAK: u64 = 0x04;
    pub const MANAGE_CHANNEL: u64 = ChannelPermissions::MANAGE;
    pub const MANAGE_PERMISSIONS: u64 = ChannelPermissions::PERMISSIONS;

    pub const DEFAULT: u64 = Self::VIEW | Self::JOIN | Self::SPEAK;
}

/// Planet-wide permissions, not tied to a channel
pub struct PlanetPermissions;

impl PlanetPermissions {
    /// Implicitly granted to every member
    pub const VIEW: u64 = 0x01;
    pub const INVITE: u64 = 0x02;
    pub const DISPLAY_ROLE: u64 = 0x04;
    pub const MANAGE: u64 = 0x08;
    pub const KICK: u64 = 0x10;
    pub const BAN: u64 = 0x20;
    pub const CREATE_CHANNELS: u64 = 0x40;
    pub const MANAGE_ROLES: u64 = 0x80;

    // ===== Economy =====
    pub const USE_ECONOMY: u64 = 0x100;
    pub const MANAGE_CURRENCY: u64 = 0x200;
    pub const MANAGE_ECO_ACCOUNTS: u64 = 0x400;
    pub const FORCE_TRANSACTIONS: u64 = 0x800;

    pub const MENTION_ALL: u64 = 0x1000;

    pub const DEFAULT: u64 = Self::VIEW | Self::USE_ECONOMY;
}

/// Tri-state result of consulting one override for one permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Undefined,
    True,
    False,
}

/// `(code, mask)` override pair.
///
/// Mask bit 0: undefined. Mask bit 1: the code bit decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PermissionNodeCode {
    pub code: u64,
    pub mask: u64,
}

impl PermissionNodeCode {
    #[must_use]
    pub const fn new(code: u64, mask: u64) -> Self {
        Self { code, mask }
    }

    /// Whether this override explicitly denies View
    #[must_use]
    pub const fn denies_view(&self) -> bool {
        (self.mask & ChannelPermissions::VIEW) != 0 && (self.code & ChannelPermissions::VIEW) == 0
    }

    /// State of `permission` under this override.
    ///
    /// An explicit View deny makes every permission false. A multi-bit
    /// permission is only defined when all of its bits are masked in, and
    /// only true when all of its bits are set.
    #[must_use]
    pub const fn get_state(&self, permission: u64) -> PermissionState {
        if self.denies_view() {
            return PermissionState::False;
        }

        if (self.mask & permission) != permission {
            return PermissionState::Undefined;
        }

        if (self.code & permission) != permission {
            return PermissionState::False;
        }

        PermissionState::True
    }

    /// Set `permission` to `state`
    pub const fn set_state(&mut self, permission: u64, state: PermissionState) {
        match state {
            PermissionState::Undefined => {
                self.code &= !permission;
                self.mask &= !permission;
            }
            PermissionState::True => {
                self.mask |= permission;
                self.code |= permission;
            }
            PermissionState::False => {
                self.mask |= permission;
                self.code &= !permission;
            }
        }
    }
}

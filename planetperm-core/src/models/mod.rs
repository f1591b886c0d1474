pub mod channel;
pub mod id;
pub mod node;
pub mod permission;
pub mod planet;
pub mod role;
pub mod role_membership;

pub use channel::{Channel, ChannelType};
pub use id::{ChannelId, MemberId, NodeId, PlanetId, RoleId, UserId};
pub use node::PermissionsNode;
pub use permission::{
    has_permission, CategoryPermissions, ChannelPermissions, ChatChannelPermissions,
    PermissionBits, PermissionNodeCode, PermissionState, PlanetPermissions,
    VoiceChannelPermissions,
};
pub use planet::{Planet, PlanetMember, PlanetSnapshot};
pub use role::PlanetRole;
pub use role_membership::{RoleIndices, RoleMembership, MAX_ROLES};

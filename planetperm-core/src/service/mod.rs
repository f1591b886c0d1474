pub mod hosted_planet;
pub mod permission;
pub mod resolver;

pub use hosted_planet::{ChannelTable, HostedPlanet, InheritanceTarget, RoleTable};
pub use permission::PermissionService;
pub use resolver::{resolve_authority, resolve_channel_permissions, resolve_permission, resolve_planet_permissions};

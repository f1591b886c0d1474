//! Data access seam
//!
//! The engine never talks to storage directly. Everything it needs comes
//! through [`PermissionRepository`]; the relational implementation lives in
//! the embedding service. [`MemoryRepository`] backs tests, benchmarks and
//! single-process deployments.

pub mod memory;

use async_trait::async_trait;

use crate::models::{ChannelId, ChannelType, MemberId, PermissionsNode, PlanetId, PlanetMember, PlanetSnapshot, RoleId};
use crate::Result;

pub use memory::MemoryRepository;

/// Lookups the permission engine needs from storage.
///
/// `Ok(None)` / an empty list means "does not exist" and resolves to deny;
/// `Err` means storage failed and is propagated to the caller uncached.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Planet row plus all its roles and channels
    async fn load_planet(&self, planet_id: PlanetId) -> Result<Option<PlanetSnapshot>>;

    async fn get_member(&self, member_id: MemberId) -> Result<Option<PlanetMember>>;

    /// Nodes on `(target_id, target_type)` belonging to any of `role_ids`
    async fn get_nodes(
        &self,
        target_id: ChannelId,
        target_type: ChannelType,
        role_ids: &[RoleId],
    ) -> Result<Vec<PermissionsNode>>;
}

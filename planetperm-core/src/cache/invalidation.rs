//! Permission invalidation events
//!
//! Mutations elsewhere in the platform publish an [`InvalidationMessage`] on
//! the local bus; `PermissionService::start_invalidation_listener` applies
//! each one to the hosted planet it names. Delivery across processes is left
//! to the embedding service: it forwards serialized messages and publishes
//! them on every node's bus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{Channel, ChannelId, PermissionsNode, Planet, PlanetId, PlanetRole, RoleId};

/// Default bus capacity before slow listeners start lagging
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Events that change permission outcomes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvalidationMessage {
    /// Role created or edited
    RoleChanged { role: PlanetRole },
    RoleDeleted {
        planet_id: PlanetId,
        role_id: RoleId,
    },
    /// Roles re-ranked; `order` lists role ids from most to least authority
    RoleOrderChanged {
        planet_id: PlanetId,
        order: Vec<RoleId>,
    },
    /// Permission node created, edited or deleted. A deleted node is sent
    /// with `code` and `mask` zeroed.
    NodeChanged { node: PermissionsNode },
    /// Channel created, edited, moved or re-parented
    ChannelChanged { channel: Channel },
    ChannelDeleted {
        planet_id: PlanetId,
        channel_id: ChannelId,
    },
    DefaultRoleChanged {
        planet_id: PlanetId,
        role_id: Option<RoleId>,
    },
    /// Planet details edited: owner, default role or name
    PlanetChanged { planet: Planet },
    PlanetDeleted { planet_id: PlanetId },
    /// Drop every hosted planet's cache
    All,
}

impl InvalidationMessage {
    /// Planet the event applies to; `None` for [`Self::All`]
    #[must_use]
    pub const fn planet_id(&self) -> Option<PlanetId> {
        match self {
            Self::RoleChanged { role } => Some(role.planet_id),
            Self::NodeChanged { node } => Some(node.planet_id),
            Self::ChannelChanged { channel } => Some(channel.planet_id),
            Self::PlanetChanged { planet } => Some(planet.id),
            Self::RoleDeleted { planet_id, .. }
            | Self::RoleOrderChanged { planet_id, .. }
            | Self::ChannelDeleted { planet_id, .. }
            | Self::DefaultRoleChanged { planet_id, .. }
            | Self::PlanetDeleted { planet_id } => Some(*planet_id),
            Self::All => None,
        }
    }

    /// Short label used for the applied-message counter and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RoleChanged { .. } => "role_changed",
            Self::RoleDeleted { .. } => "role_deleted",
            Self::RoleOrderChanged { .. } => "role_order_changed",
            Self::NodeChanged { .. } => "node_changed",
            Self::ChannelChanged { .. } => "channel_changed",
            Self::ChannelDeleted { .. } => "channel_deleted",
            Self::DefaultRoleChanged { .. } => "default_role_changed",
            Self::PlanetChanged { .. } => "planet_changed",
            Self::PlanetDeleted { .. } => "planet_deleted",
            Self::All => "all",
        }
    }
}

/// In-process fan-out of invalidation events
#[derive(Clone)]
pub struct InvalidationBus {
    sender: broadcast::Sender<InvalidationMessage>,
}

impl InvalidationBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every subscriber; returns how many received it
    pub fn publish(&self, message: InvalidationMessage) -> usize {
        match self.sender.send(message) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(message)) => {
                debug!(kind = message.kind(), "No invalidation listeners, message dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationMessage> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

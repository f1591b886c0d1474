pub mod channel_cache;
pub mod invalidation;
pub mod permissions_cache;
pub mod pool;
pub mod singleflight;
pub mod snapshot;
pub mod striped_set;

pub use channel_cache::ChannelPermissionCache;
pub use invalidation::{InvalidationBus, InvalidationMessage};
pub use permissions_cache::PlanetPermissionsCache;
pub use pool::{ListPool, PooledList};
pub use singleflight::PermissionFlights;
pub use snapshot::ChannelAccessSnapshot;
pub use striped_set::StripedHashSet;

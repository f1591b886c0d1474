use serde::{Deserialize, Serialize};

/// Declares a transparent `i64` id newtype.
///
/// Ids are assigned by the storage layer; this crate never mints them.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Planet (community) id
    PlanetId
);
define_id!(
    /// Role id, unique across planets
    RoleId
);
define_id!(
    /// Channel, category or voice channel id
    ChannelId
);
define_id!(
    /// Planet member id (one user in one planet)
    MemberId
);
define_id!(
    /// User account id
    UserId
);
define_id!(
    /// Permissions node id
    NodeId
);

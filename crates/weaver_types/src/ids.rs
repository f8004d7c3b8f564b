//! Strongly typed identifiers.
//!
//! Every entity gets its own newtype so a `ServerId` can never be handed to
//! an API expecting a `HostId`. Work ids are the exception: they are plain
//! monotonically increasing integers handed out by the queue.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a host machine running the agent
    HostId
);
uuid_id!(
    /// Owning account of hosts and servers
    AccountId
);
uuid_id!(
    /// Unique identifier for a game server instance
    ServerId
);
uuid_id!(
    /// Unique identifier for a game definition
    GameId
);
uuid_id!(
    /// Unique identifier for a game profile
    ProfileId
);
uuid_id!(
    /// Unique identifier for a local resource inside a profile
    ResourceId
);
uuid_id!(
    /// Unique identifier for a configuration item
    ItemId
);

/// Queue-assigned work identifier, strictly increasing in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub u64);

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! # Weaver Types - Shared Model for the Fleet Control Plane
//!
//! Everything that crosses the wire between the control plane and a host
//! agent lives here, together with the profile model the control plane
//! resolves into concrete dispatch snapshots.
//!
//! ## Layout
//!
//! * [`ids`] - strongly typed identifiers
//! * [`host`] - hosts, registrations and connectivity states
//! * [`catalog`] - games, servers, profiles, local resources and items
//! * [`profile`] - layered profile resolution (default -> parent -> own)
//! * [`work`] - queued work items and the tagged-union payload
//! * [`wire`] - request/response bodies of the HTTP protocol
//!
//! The queue stores payloads as opaque bytes; [`WorkPayload`] is the only
//! place that knows how a [`TargetType`] maps to a body shape.

pub mod catalog;
pub mod error;
pub mod host;
pub mod ids;
pub mod profile;
pub mod wire;
pub mod work;

pub use catalog::{
    ConfigurationItem, ContentType, Game, GameProfile, GameServer, GameSource, LocalResource,
    OsPaths, ResourceType,
};
pub use error::PayloadError;
pub use host::{ConnectivityState, Host, HostCredential, HostRegistration};
pub use ids::{AccountId, GameId, HostId, ItemId, ProfileId, ResourceId, ServerId, WorkId};
pub use profile::{resolve_layers, ItemIdentity, ProfileItem, ProfileLayer, ResolvedResource};
pub use work::{
    InstallJob, ResourceSpec, ServerSpec, TargetType, WeaverWork, WorkItem, WorkPayload,
    WorkStatus,
};

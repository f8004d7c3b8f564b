//! Profile resolution and the mutations an operator performs on a server's
//! effective configuration.
//!
//! Edits always land on the server's own profile. Editing an item that is
//! only inherited first materializes its resource there.

use crate::error::ProfileError;
use crate::repository::CatalogRepository;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use weaver_types::{
    resolve_layers, ConfigurationItem, GameProfile, GameServer, ItemId, ItemIdentity, ProfileId,
    ProfileLayer, ResolvedResource, ResourceId, ServerId,
};

pub struct ProfileService {
    catalog: Arc<dyn CatalogRepository>,
}

impl ProfileService {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    async fn server(&self, server_id: ServerId) -> Result<GameServer, ProfileError> {
        self.catalog
            .get_server(server_id)
            .await?
            .filter(|s| !s.deleted)
            .ok_or(ProfileError::ServerNotFound(server_id))
    }

    async fn profile(&self, profile_id: ProfileId) -> Result<GameProfile, ProfileError> {
        self.catalog
            .get_profile(profile_id)
            .await?
            .ok_or(ProfileError::ProfileNotFound(profile_id))
    }

    /// The server's profile chain, lowest layer first
    async fn layers(
        &self,
        server: &GameServer,
    ) -> Result<Vec<(ProfileLayer, GameProfile)>, ProfileError> {
        let game = self
            .catalog
            .get_game(server.game_id)
            .await?
            .ok_or(ProfileError::GameNotFound(server.game_id))?;

        let mut layers = vec![(
            ProfileLayer::Default,
            self.profile(game.default_profile_id).await?,
        )];
        if let Some(parent_id) = server.parent_game_profile_id {
            layers.push((ProfileLayer::Parent, self.profile(parent_id).await?));
        }
        layers.push((ProfileLayer::Own, self.profile(server.game_profile_id).await?));
        Ok(layers)
    }

    /// Effective resources of a server: default, then parent, then own
    #[instrument(skip(self))]
    pub async fn resolve_server(
        &self,
        server_id: ServerId,
    ) -> Result<Vec<ResolvedResource>, ProfileError> {
        let server = self.server(server_id).await?;
        let layers = self.layers(&server).await?;
        let borrowed: Vec<(ProfileLayer, &GameProfile)> =
            layers.iter().map(|(layer, profile)| (*layer, profile)).collect();
        Ok(resolve_layers(&borrowed))
    }

    /// Ensures the named resource exists on the server's own profile,
    /// copying its metadata from the nearest ancestor when needed
    #[instrument(skip(self))]
    pub async fn materialize_resource(
        &self,
        server_id: ServerId,
        resource_name: &str,
    ) -> Result<ResourceId, ProfileError> {
        let server = self.server(server_id).await?;
        let mut own = self.profile(server.game_profile_id).await?;
        if let Some(existing) = own.resource(resource_name) {
            return Ok(existing.id);
        }

        let resolved = self.resolve_server(server_id).await?;
        let inherited = resolved
            .iter()
            .find(|r| r.resource.name == resource_name)
            .ok_or_else(|| ProfileError::ResourceNotFound(resource_name.to_string()))?;

        let copy = inherited.resource.materialized_copy();
        let id = copy.id;
        own.resources.push(copy);
        self.catalog.upsert_profile(own).await?;

        info!(
            "Materialized resource '{}' onto profile of server {}",
            resource_name, server_id
        );
        Ok(id)
    }

    /// Adds or overrides an item on the server's own profile. An item with
    /// `ignore` set suppresses the inherited value with the same identity.
    #[instrument(skip(self, item), fields(key = %item.key))]
    pub async fn upsert_item(
        &self,
        server_id: ServerId,
        resource_name: &str,
        item: ConfigurationItem,
    ) -> Result<ItemId, ProfileError> {
        self.materialize_resource(server_id, resource_name).await?;

        let server = self.server(server_id).await?;
        let mut own = self.profile(server.game_profile_id).await?;
        let resource = own
            .resource_mut(resource_name)
            .ok_or_else(|| ProfileError::ResourceNotFound(resource_name.to_string()))?;

        let identity = ItemIdentity::from(&item);
        let id = match resource
            .items
            .iter_mut()
            .find(|existing| ItemIdentity::from(&**existing) == identity)
        {
            Some(existing) => {
                let id = existing.id;
                *existing = ConfigurationItem { id, ..item };
                id
            }
            None => {
                let id = item.id;
                resource.items.push(item);
                id
            }
        };

        self.catalog.upsert_profile(own).await?;
        debug!("Stored item {} on server {}", id, server_id);
        Ok(id)
    }

    /// Suppresses an inherited item without touching the ancestor profile
    pub async fn ignore_item(
        &self,
        server_id: ServerId,
        resource_name: &str,
        identity: ItemIdentity,
    ) -> Result<ItemId, ProfileError> {
        let item = ConfigurationItem::new(identity.key, "")
            .with_category(identity.category)
            .with_path(identity.path)
            .ignored();
        self.upsert_item(server_id, resource_name, item).await
    }

    /// Drops the own-layer override so the inherited value applies again.
    ///
    /// Returns whether an override existed.
    pub async fn remove_override(
        &self,
        server_id: ServerId,
        resource_name: &str,
        identity: &ItemIdentity,
    ) -> Result<bool, ProfileError> {
        let server = self.server(server_id).await?;
        let mut own = self.profile(server.game_profile_id).await?;
        let Some(resource) = own.resource_mut(resource_name) else {
            return Ok(false);
        };

        let before = resource.items.len();
        resource
            .items
            .retain(|existing| ItemIdentity::from(existing) != *identity);
        let removed = resource.items.len() != before;
        if removed {
            self.catalog.upsert_profile(own).await?;
        }
        Ok(removed)
    }
}

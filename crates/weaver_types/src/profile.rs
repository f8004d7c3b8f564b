//! Layered profile resolution.
//!
//! A server's effective configuration is composed from up to three
//! profiles: the game's default profile, an optional parent template and
//! the server's own profile. Resources are matched across layers by name,
//! items by `(category, key, path)`.

use crate::catalog::{ConfigurationItem, GameProfile, LocalResource};
use crate::ids::ResourceId;
use serde::{Deserialize, Serialize};

/// Position of a profile in the inheritance chain, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProfileLayer {
    Default,
    Parent,
    Own,
}

/// The key items are matched on between layers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemIdentity {
    pub category: String,
    pub key: String,
    pub path: String,
}

impl From<&ConfigurationItem> for ItemIdentity {
    fn from(item: &ConfigurationItem) -> Self {
        Self {
            category: item.category.clone(),
            key: item.key.clone(),
            path: item.path.clone(),
        }
    }
}

/// An item as seen from the server's own profile.
///
/// `Inherited` items exist only on an ancestor layer; editing one requires
/// materializing its resource on the own profile first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "camelCase")]
pub enum ProfileItem {
    Inherited {
        from_layer: ProfileLayer,
        item: ConfigurationItem,
    },
    Owned {
        resource_id: ResourceId,
        item: ConfigurationItem,
    },
}

impl ProfileItem {
    pub fn item(&self) -> &ConfigurationItem {
        match self {
            Self::Inherited { item, .. } | Self::Owned { item, .. } => item,
        }
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self, Self::Inherited { .. })
    }
}

/// One resource after all layers have been applied
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    /// Metadata from the topmost layer declaring the resource. `items` is
    /// left empty; the composed set lives in [`ResolvedResource::items`].
    pub resource: LocalResource,
    /// Layer the metadata was taken from
    pub declared_in: ProfileLayer,
    pub items: Vec<ProfileItem>,
}

impl ResolvedResource {
    /// Composed items with ignored entries removed
    pub fn effective_items(&self) -> Vec<ConfigurationItem> {
        self.items
            .iter()
            .map(ProfileItem::item)
            .filter(|item| !item.ignore)
            .cloned()
            .collect()
    }

    /// Whether the server's own profile already carries this resource
    pub fn is_materialized(&self) -> bool {
        self.declared_in == ProfileLayer::Own
    }
}

/// Compose the given layers, lowest first, into resolved resources.
///
/// Resource order is the order of first declaration. Within a resource a
/// later layer replaces an item in place, so first-appearance order is kept.
pub fn resolve_layers(layers: &[(ProfileLayer, &GameProfile)]) -> Vec<ResolvedResource> {
    let mut resolved: Vec<ResolvedResource> = Vec::new();

    for (layer, profile) in layers {
        for resource in &profile.resources {
            let index = match resolved
                .iter()
                .position(|r| r.resource.name == resource.name)
            {
                Some(index) => {
                    let entry = &mut resolved[index];
                    entry.resource = LocalResource {
                        items: Vec::new(),
                        ..resource.clone()
                    };
                    entry.declared_in = *layer;
                    index
                }
                None => {
                    resolved.push(ResolvedResource {
                        resource: LocalResource {
                            items: Vec::new(),
                            ..resource.clone()
                        },
                        declared_in: *layer,
                        items: Vec::new(),
                    });
                    resolved.len() - 1
                }
            };

            let entry = &mut resolved[index];
            for item in &resource.items {
                let wrapped = match layer {
                    ProfileLayer::Own => ProfileItem::Owned {
                        resource_id: resource.id,
                        item: item.clone(),
                    },
                    _ => ProfileItem::Inherited {
                        from_layer: *layer,
                        item: item.clone(),
                    },
                };

                let identity = ItemIdentity::from(item);
                match entry
                    .items
                    .iter()
                    .position(|existing| ItemIdentity::from(existing.item()) == identity)
                {
                    Some(slot) => entry.items[slot] = wrapped,
                    None => entry.items.push(wrapped),
                }
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{OsPaths, ResourceType};
    use crate::ids::GameId;

    fn config_resource(name: &str, items: Vec<ConfigurationItem>) -> LocalResource {
        let mut resource =
            LocalResource::new(name, ResourceType::Config, OsPaths::same("cfg/server.ini"));
        resource.items = items;
        resource
    }

    fn profile(game_id: GameId, resources: Vec<LocalResource>) -> GameProfile {
        let mut profile = GameProfile::new(game_id, "layer");
        profile.resources = resources;
        profile
    }

    #[test]
    fn test_own_overrides_parent_overrides_default() {
        let game = GameId::new();
        let default = profile(
            game,
            vec![config_resource(
                "server.ini",
                vec![
                    ConfigurationItem::new("MaxPlayers", "10").with_category("Server"),
                    ConfigurationItem::new("Name", "default").with_category("Server"),
                    ConfigurationItem::new("Pvp", "false").with_category("Rules"),
                ],
            )],
        );
        let parent = profile(
            game,
            vec![config_resource(
                "server.ini",
                vec![ConfigurationItem::new("MaxPlayers", "20").with_category("Server")],
            )],
        );
        let own = profile(
            game,
            vec![config_resource(
                "server.ini",
                vec![ConfigurationItem::new("Name", "mine").with_category("Server")],
            )],
        );

        let resolved = resolve_layers(&[
            (ProfileLayer::Default, &default),
            (ProfileLayer::Parent, &parent),
            (ProfileLayer::Own, &own),
        ]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].declared_in, ProfileLayer::Own);

        let items = resolved[0].effective_items();
        let values: Vec<(&str, &str)> = items
            .iter()
            .map(|i| (i.key.as_str(), i.value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![("MaxPlayers", "20"), ("Name", "mine"), ("Pvp", "false")]
        );

        assert!(matches!(
            resolved[0].items[0],
            ProfileItem::Inherited {
                from_layer: ProfileLayer::Parent,
                ..
            }
        ));
        assert!(matches!(resolved[0].items[1], ProfileItem::Owned { .. }));
    }

    #[test]
    fn test_ignore_removes_inherited_value() {
        let game = GameId::new();
        let default = profile(
            game,
            vec![config_resource(
                "server.ini",
                vec![
                    ConfigurationItem::new("Motd", "hello").with_category("Server"),
                    ConfigurationItem::new("Port", "2456").with_category("Server"),
                ],
            )],
        );
        let own = profile(
            game,
            vec![config_resource(
                "server.ini",
                vec![ConfigurationItem::new("Motd", "").with_category("Server").ignored()],
            )],
        );

        let resolved = resolve_layers(&[(ProfileLayer::Default, &default), (ProfileLayer::Own, &own)]);
        let items = resolved[0].effective_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "Port");

        // The ancestor still carries the value
        assert_eq!(default.resources[0].items.len(), 2);
    }

    #[test]
    fn test_identity_includes_category_and_path() {
        let game = GameId::new();
        let default = profile(
            game,
            vec![config_resource(
                "server.ini",
                vec![
                    ConfigurationItem::new("Port", "1").with_category("A"),
                    ConfigurationItem::new("Port", "2").with_category("B"),
                    ConfigurationItem::new("Port", "3").with_category("B").with_path("x"),
                ],
            )],
        );

        let resolved = resolve_layers(&[(ProfileLayer::Default, &default)]);
        assert_eq!(resolved[0].effective_items().len(), 3);
        assert!(!resolved[0].is_materialized());
    }

    #[test]
    fn test_resources_only_on_ancestor_stay_inherited() {
        let game = GameId::new();
        let default = profile(
            game,
            vec![
                config_resource("a.cfg", vec![ConfigurationItem::new("0", "x")]),
                config_resource("b.cfg", vec![]),
            ],
        );
        let own = profile(game, vec![config_resource("b.cfg", vec![])]);

        let resolved = resolve_layers(&[(ProfileLayer::Default, &default), (ProfileLayer::Own, &own)]);
        let names: Vec<&str> = resolved.iter().map(|r| r.resource.name.as_str()).collect();
        assert_eq!(names, vec!["a.cfg", "b.cfg"]);
        assert!(!resolved[0].is_materialized());
        assert!(resolved[1].is_materialized());
        assert!(resolved[0].items.iter().all(ProfileItem::is_inherited));
    }
}

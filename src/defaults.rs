//! Default collection layout for the Secret Santa cluster
//!
//! Collection names, shard strategies and secondary indexes for entities
//! that do not configure their own. The tables are kept as the cluster was
//! first laid out; several of their field names predate the current entity
//! schemas and are reported by [`crate::lint`] rather than corrected here.

use std::collections::BTreeMap;
use std::num::NonZeroU32;

use serde_json::{json, Map, Value};

use crate::collection::{CollectionConfig, IndexSpec, KeyPattern, ShardStrategy, SplitPoint};
use crate::registry::SchemaRegistry;
use crate::schema::EntitySchema;

use crate::collection::KeyDirection::{Ascending, Descending, Hashed};

/// Provisioning order. Collections not listed here follow in lexical order.
pub const PROVISION_ORDER: &[&str] = &[
    "users",
    "games",
    "players",
    "wishlists",
    "pairs",
    "messages",
    "directmessages",
    "notifications",
    "tickets",
    "logs",
];

const PLURALS: &[(&str, &str)] = &[
    ("user", "users"),
    ("game", "games"),
    ("player", "players"),
    ("message", "messages"),
    ("directmessage", "directmessages"),
    ("notification", "notifications"),
    ("ticket", "tickets"),
    ("log", "logs"),
    ("wishlist", "wishlists"),
    ("pair", "pairs"),
];

/// Collection name for an entity key, falling back to a naive `s` suffix
pub fn collection_name(entity_key: &str) -> String {
    let key = entity_key.to_lowercase();
    PLURALS
        .iter()
        .find(|(singular, _)| *singular == key)
        .map(|(_, plural)| plural.to_string())
        .unwrap_or_else(|| format!("{}s", key))
}

fn split_point(field: &str, value: Value) -> SplitPoint {
    let mut point = Map::new();
    point.insert(field.to_string(), value);
    point
}

fn chunks(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Tuned shard strategy for a collection, if there is one
pub fn default_strategy(collection: &str) -> Option<ShardStrategy> {
    let strategy = match collection {
        "users" => ShardStrategy::single("email", Ascending).with_split_points(vec![
            split_point("email", json!("f")),
            split_point("email", json!("m")),
            split_point("email", json!("s")),
        ]),
        "games" => ShardStrategy::hashed_id().with_initial_chunks(chunks(4)),
        "players" => ShardStrategy::single("game", Hashed).with_initial_chunks(chunks(6)),
        "messages" => ShardStrategy::single("game", Hashed).with_initial_chunks(chunks(8)),
        // Time-ordered; chunks are left to the balancer
        "logs" => ShardStrategy::single("timestamp", Ascending),
        _ => return None,
    };
    Some(strategy)
}

/// Common secondary indexes keyed by entity key
pub fn default_indexes(entity_key: &str) -> Vec<IndexSpec> {
    let keys = match entity_key {
        "user" => vec![
            KeyPattern::single("login", Ascending),
            KeyPattern::single("email", Ascending),
            KeyPattern::new().with("isActive", Ascending).with("isOnline", Ascending),
        ],
        "game" => vec![
            KeyPattern::new().with("creatorId", Ascending).with("status", Ascending),
            KeyPattern::new().with("status", Ascending).with("createdAt", Descending),
        ],
        "player" => vec![
            KeyPattern::new().with("user", Ascending).with("game", Ascending),
            KeyPattern::single("game", Ascending),
        ],
        "message" => vec![
            KeyPattern::new().with("game", Ascending).with("timestamp", Descending),
            KeyPattern::new().with("sender", Ascending).with("timestamp", Descending),
        ],
        "log" => vec![
            KeyPattern::new().with("level", Ascending).with("timestamp", Descending),
            KeyPattern::new().with("action", Ascending).with("timestamp", Descending),
        ],
        _ => Vec::new(),
    };
    keys.into_iter().map(IndexSpec::new).collect()
}

/// Unique indexes keyed by entity key
pub fn default_unique_indexes(entity_key: &str) -> Vec<IndexSpec> {
    match entity_key {
        "user" => vec![
            IndexSpec::unique(KeyPattern::single("login", Ascending)),
            IndexSpec::unique(KeyPattern::single("email", Ascending)),
        ],
        _ => Vec::new(),
    }
}

/// Derives a [`CollectionConfig`] for every registry entity
#[derive(Debug, Clone)]
pub struct CollectionPlanner {
    strategies: BTreeMap<String, ShardStrategy>,
    order: Vec<String>,
}

impl Default for CollectionPlanner {
    fn default() -> Self {
        Self {
            strategies: BTreeMap::new(),
            order: PROVISION_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CollectionPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the built-in strategy for `collection`
    pub fn with_strategy(mut self, collection: impl Into<String>, strategy: ShardStrategy) -> Self {
        self.strategies.insert(collection.into(), strategy);
        self
    }

    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = (String, ShardStrategy)>) -> Self {
        self.strategies.extend(strategies);
        self
    }

    /// Replace the provisioning order
    pub fn with_order(mut self, order: Vec<String>) -> Self {
        self.order = order;
        self
    }

    pub fn derive(&self, entity: &EntitySchema) -> CollectionConfig {
        let key = entity.key();
        let name = collection_name(&key);
        let shard = self
            .strategies
            .get(&name)
            .cloned()
            .or_else(|| default_strategy(&name))
            .unwrap_or_else(ShardStrategy::hashed_id);

        CollectionConfig::new(name, entity.clone(), shard)
            .with_indexes(default_indexes(&key))
            .with_unique_indexes(default_unique_indexes(&key))
    }

    /// Configs for the whole registry in provisioning order
    pub fn plan(&self, registry: &SchemaRegistry) -> Vec<CollectionConfig> {
        let mut configs: Vec<CollectionConfig> = registry.entities().map(|e| self.derive(e)).collect();
        configs.sort_by(|a, b| {
            let rank = |name: &str| self.order.iter().position(|o| o == name).unwrap_or(usize::MAX);
            rank(&a.name).cmp(&rank(&b.name)).then_with(|| a.name.cmp(&b.name))
        });
        configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};

    #[test]
    fn test_collection_name() {
        assert_eq!(collection_name("User"), "users");
        assert_eq!(collection_name("directmessage"), "directmessages");
        assert_eq!(collection_name("widget"), "widgets");
    }

    #[test]
    fn test_default_strategies() {
        let users = default_strategy("users").unwrap();
        assert_eq!(users.split_points().len(), 3);
        assert_eq!(users.initial_chunks(), None);

        let games = default_strategy("games").unwrap();
        assert!(games.key().is_hashed());
        assert_eq!(games.initial_chunks().map(NonZeroU32::get), Some(4));

        assert!(default_strategy("pairs").is_none());
    }

    #[test]
    fn test_derive_fallbacks() {
        let widget = EntitySchema::new("Widget", vec![FieldSpec::new("name", FieldKind::String)]);
        let config = CollectionPlanner::new().derive(&widget);
        assert_eq!(config.name, "widgets");
        assert_eq!(config.shard, ShardStrategy::hashed_id());
        assert!(config.indexes.is_empty());
        assert!(config.unique_indexes.is_empty());
    }

    #[test]
    fn test_strategy_override() {
        let planner = CollectionPlanner::new().with_strategy(
            "players",
            ShardStrategy::new(KeyPattern::single("gameId", Hashed)).unwrap(),
        );
        let player = EntitySchema::new("Player", vec![]);
        let config = planner.derive(&player);
        assert_eq!(config.shard.key().fields().collect::<Vec<_>>(), vec!["gameId"]);
        assert_eq!(config.indexes.len(), 2);
    }

    #[test]
    fn test_plan_order() {
        let registry = SchemaRegistry::from_entities(vec![
            EntitySchema::new("Zebra", vec![]),
            EntitySchema::new("Log", vec![]),
            EntitySchema::new("Apple", vec![]),
            EntitySchema::new("User", vec![]),
            EntitySchema::new("Game", vec![]),
        ]);
        let names: Vec<String> = CollectionPlanner::new()
            .plan(&registry)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["users", "games", "logs", "apples", "zebras"]);
    }
}

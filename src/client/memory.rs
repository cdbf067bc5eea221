//! In-memory cluster model

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroU32;

use serde_json::Value;

use super::{ClusterClient, DropOutcome, IndexOptions};
use crate::collection::{KeyPattern, SplitPoint};
use crate::compiler::NativeValidator;
use crate::error::ClientError;

/// A call made against the cluster, recorded before it is executed
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    EnableSharding { database: String },
    DropCollection { collection: String },
    CreateCollection { collection: String },
    CreateIndex { collection: String, name: String, key: KeyPattern, unique: bool },
    ShardCollection { namespace: String, key: KeyPattern, initial_chunks: Option<NonZeroU32> },
    SplitAt { namespace: String, point: SplitPoint },
}

/// An index as stored by the model
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryIndex {
    pub name: String,
    pub key: KeyPattern,
    pub unique: bool,
}

/// Collection state held by the model
#[derive(Debug, Clone, Default)]
pub struct MemoryCollection {
    pub validator: Option<Value>,
    pub indexes: Vec<MemoryIndex>,
    pub shard_key: Option<KeyPattern>,
    pub initial_chunks: Option<NonZeroU32>,
    /// Split points applied so far, in order
    pub boundaries: Vec<SplitPoint>,
}

impl MemoryCollection {
    pub fn index(&self, name: &str) -> Option<&MemoryIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn is_sharded(&self) -> bool {
        self.shard_key.is_some()
    }
}

type FailRule = Box<dyn Fn(&Call) -> bool>;

/// A cluster held entirely in memory.
///
/// Enforces the rules the provisioner depends on: a collection must exist
/// before it is indexed or sharded, sharding requires an index prefixed by
/// the shard key, index names and key patterns are unique per collection,
/// unique indexes on a sharded collection must be supported by its shard key
/// (see [`KeyPattern::supports_unique`]), and a split point cannot be applied
/// twice. Failures can be injected per call.
#[derive(Default)]
pub struct MemoryCluster {
    sharded_databases: BTreeSet<String>,
    collections: BTreeMap<String, MemoryCollection>,
    calls: Vec<Call>,
    fail_rules: Vec<(FailRule, String)>,
}

impl fmt::Debug for MemoryCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCluster")
            .field("sharded_databases", &self.sharded_databases)
            .field("collections", &self.collections)
            .field("calls", &self.calls.len())
            .field("fail_rules", &self.fail_rules.len())
            .finish()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a collection, as if left over from an earlier run
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collections.insert(name.into(), MemoryCollection::default());
        self
    }

    /// Make every call matching `predicate` fail with `message`
    pub fn fail_when(mut self, predicate: impl Fn(&Call) -> bool + 'static, message: impl Into<String>) -> Self {
        self.fail_rules.push((Box::new(predicate), message.into()));
        self
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn collection(&self, name: &str) -> Option<&MemoryCollection> {
        self.collections.get(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn is_sharding_enabled(&self, database: &str) -> bool {
        self.sharded_databases.contains(database)
    }

    fn record(&mut self, call: Call) -> Result<(), ClientError> {
        let failure = self
            .fail_rules
            .iter()
            .find(|(rule, _)| rule(&call))
            .map(|(_, message)| message.clone());
        let operation = operation_name(&call);
        self.calls.push(call);

        match failure {
            Some(message) => Err(ClientError::Command {
                operation: operation.to_string(),
                message,
            }),
            None => Ok(()),
        }
    }

    fn sharded_collection(&mut self, namespace: &str) -> Result<&mut MemoryCollection, ClientError> {
        let collection = namespace
            .split_once('.')
            .map(|(_, c)| c)
            .ok_or_else(|| ClientError::NamespaceNotFound(namespace.to_string()))?;
        self.collections
            .get_mut(collection)
            .ok_or_else(|| ClientError::NamespaceNotFound(namespace.to_string()))
    }
}

fn operation_name(call: &Call) -> &'static str {
    match call {
        Call::EnableSharding { .. } => "enableSharding",
        Call::DropCollection { .. } => "drop",
        Call::CreateCollection { .. } => "createCollection",
        Call::CreateIndex { .. } => "createIndex",
        Call::ShardCollection { .. } => "shardCollection",
        Call::SplitAt { .. } => "splitAt",
    }
}

impl ClusterClient for MemoryCluster {
    fn enable_sharding(&mut self, database: &str) -> Result<(), ClientError> {
        self.record(Call::EnableSharding {
            database: database.to_string(),
        })?;
        self.sharded_databases.insert(database.to_string());
        Ok(())
    }

    fn drop_collection_if_exists(&mut self, collection: &str) -> Result<DropOutcome, ClientError> {
        if !self.collections.contains_key(collection) {
            return Ok(DropOutcome::Absent);
        }
        self.record(Call::DropCollection {
            collection: collection.to_string(),
        })?;
        self.collections.remove(collection);
        Ok(DropOutcome::Dropped)
    }

    fn create_collection(&mut self, collection: &str, validator: &NativeValidator) -> Result<(), ClientError> {
        self.record(Call::CreateCollection {
            collection: collection.to_string(),
        })?;
        if self.collections.contains_key(collection) {
            return Err(ClientError::CollectionExists(collection.to_string()));
        }
        self.collections.insert(
            collection.to_string(),
            MemoryCollection {
                validator: Some(validator.as_json().clone()),
                ..Default::default()
            },
        );
        Ok(())
    }

    fn create_index(
        &mut self,
        collection: &str,
        key: &KeyPattern,
        options: &IndexOptions,
    ) -> Result<String, ClientError> {
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| key.default_index_name());
        self.record(Call::CreateIndex {
            collection: collection.to_string(),
            name: name.clone(),
            key: key.clone(),
            unique: options.unique,
        })?;

        let target = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| ClientError::NamespaceNotFound(collection.to_string()))?;

        match target.index(&name) {
            // Re-creating an identical index is a no-op
            Some(existing) if existing.key == *key && existing.unique == options.unique => return Ok(name),
            Some(_) => {
                return Err(ClientError::IndexExists {
                    collection: collection.to_string(),
                    name,
                })
            }
            None => {}
        }

        if let Some(existing) = target.indexes.iter().find(|i| i.key == *key) {
            return Err(ClientError::IndexOptionsConflict {
                collection: collection.to_string(),
                name,
                existing: existing.name.clone(),
            });
        }

        if let Some(shard_key) = &target.shard_key {
            if options.unique && !shard_key.supports_unique(key) {
                return Err(ClientError::UniqueIndexNotShardPrefixed {
                    collection: collection.to_string(),
                    key: key.to_string(),
                    shard_key: shard_key.to_string(),
                });
            }
        }

        target.indexes.push(MemoryIndex {
            name: name.clone(),
            key: key.clone(),
            unique: options.unique,
        });
        Ok(name)
    }

    fn shard_collection(
        &mut self,
        namespace: &str,
        key: &KeyPattern,
        initial_chunks: Option<NonZeroU32>,
    ) -> Result<(), ClientError> {
        self.record(Call::ShardCollection {
            namespace: namespace.to_string(),
            key: key.clone(),
            initial_chunks,
        })?;

        let target = self.sharded_collection(namespace)?;
        if target.is_sharded() {
            return Err(ClientError::AlreadySharded {
                namespace: namespace.to_string(),
            });
        }

        let supported = target.indexes.iter().any(|index| {
            index.key.len() >= key.len()
                && index.key.iter().zip(key.iter()).all(|(a, b)| a == b)
        });
        if !supported {
            return Err(ClientError::Command {
                operation: "shardCollection".to_string(),
                message: format!("no index found that starts with shard key {}", key),
            });
        }

        target.shard_key = Some(key.clone());
        target.initial_chunks = initial_chunks;
        Ok(())
    }

    fn split_at(&mut self, namespace: &str, point: &SplitPoint) -> Result<(), ClientError> {
        self.record(Call::SplitAt {
            namespace: namespace.to_string(),
            point: point.clone(),
        })?;

        let rendered = Value::Object(point.clone()).to_string();
        let target = self.sharded_collection(namespace)?;
        let key = target.shard_key.as_ref().ok_or_else(|| ClientError::InvalidSplitPoint {
            point: rendered.clone(),
            reason: format!("{} is not sharded", namespace),
        })?;

        if point.len() != key.len() || !point.keys().all(|f| key.contains(f)) {
            return Err(ClientError::InvalidSplitPoint {
                point: rendered,
                reason: format!("fields must match shard key {}", key),
            });
        }
        if target.boundaries.contains(point) {
            return Err(ClientError::ChunkBoundary {
                namespace: namespace.to_string(),
                point: rendered,
            });
        }

        target.boundaries.push(point.clone());
        Ok(())
    }
}

//! Collection configuration: shard strategies and indexes

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};
use crate::schema::EntitySchema;

/// Direction of one key in an index or shard key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyDirection {
    Ascending,
    Descending,
    Hashed,
}

impl KeyDirection {
    /// Key-document form understood by the store: `1`, `-1` or `"hashed"`
    pub fn to_json(self) -> Value {
        match self {
            KeyDirection::Ascending => Value::from(1),
            KeyDirection::Descending => Value::from(-1),
            KeyDirection::Hashed => Value::from("hashed"),
        }
    }
}

impl TryFrom<&Value> for KeyDirection {
    type Error = SchemaError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) if n.as_i64() == Some(1) => Ok(KeyDirection::Ascending),
            Value::Number(n) if n.as_i64() == Some(-1) => Ok(KeyDirection::Descending),
            Value::String(s) if s == "hashed" => Ok(KeyDirection::Hashed),
            other => Err(SchemaError::InvalidDirection(other.to_string())),
        }
    }
}

impl fmt::Display for KeyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Ordered key document, e.g. `{ game: 1, status: 1 }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct KeyPattern(Vec<(String, KeyDirection)>);

impl KeyPattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-field pattern
    pub fn single(field: impl Into<String>, direction: KeyDirection) -> Self {
        Self::new().with(field, direction)
    }

    pub fn with(mut self, field: impl Into<String>, direction: KeyDirection) -> Self {
        self.0.push((field.into(), direction));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, KeyDirection)> {
        self.0.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(f, _)| f.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|(f, _)| f == field)
    }

    pub fn is_hashed(&self) -> bool {
        self.0.iter().any(|(_, d)| *d == KeyDirection::Hashed)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.clone().into())
    }

    /// Whether a collection sharded on `self` can hold a unique index on `index`.
    ///
    /// A key on `_id` alone accepts any unique index. Otherwise the key must
    /// not be hashed and the index must start with every shard key field.
    pub fn supports_unique(&self, index: &KeyPattern) -> bool {
        if self.0.len() == 1 && self.0[0].0 == "_id" {
            return true;
        }
        !self.is_hashed()
            && self.len() <= index.len()
            && self.fields().zip(index.fields()).all(|(a, b)| a == b)
    }

    /// Name the store assigns an index without an explicit name, e.g. `isActive_1_isOnline_1`
    pub fn default_index_name(&self) -> String {
        self.0
            .iter()
            .map(|(field, dir)| match dir {
                KeyDirection::Hashed => format!("{}_hashed", field),
                other => format!("{}_{}", field, other),
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl TryFrom<Map<String, Value>> for KeyPattern {
    type Error = SchemaError;

    fn try_from(map: Map<String, Value>) -> Result<Self> {
        map.iter()
            .map(|(field, dir)| Ok((field.clone(), KeyDirection::try_from(dir)?)))
            .collect::<Result<Vec<_>>>()
            .map(KeyPattern)
    }
}

impl From<KeyPattern> for Map<String, Value> {
    fn from(pattern: KeyPattern) -> Self {
        pattern
            .0
            .into_iter()
            .map(|(field, dir)| (field, dir.to_json()))
            .collect()
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// A pre-split boundary document, e.g. `{ email: "m" }`
pub type SplitPoint = Map<String, Value>;

/// How a freshly sharded collection is pre-split
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presplit {
    #[default]
    None,
    /// One split-at call per boundary, in order
    SplitPoints(Vec<SplitPoint>),
    /// Ask the store to create this many chunks when sharding
    InitialChunks(NonZeroU32),
}

/// Shard key plus pre-split strategy. The key is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrategySource")]
pub struct ShardStrategy {
    key: KeyPattern,
    #[serde(default)]
    pub presplit: Presplit,
}

#[derive(Deserialize)]
struct StrategySource {
    key: KeyPattern,
    #[serde(default)]
    presplit: Presplit,
}

impl TryFrom<StrategySource> for ShardStrategy {
    type Error = SchemaError;

    fn try_from(source: StrategySource) -> Result<Self> {
        let mut strategy = Self::new(source.key)?;
        strategy.presplit = source.presplit;
        Ok(strategy)
    }
}

impl ShardStrategy {
    pub fn new(key: KeyPattern) -> Result<Self> {
        if key.is_empty() {
            return Err(SchemaError::EmptyShardKey);
        }
        Ok(Self {
            key,
            presplit: Presplit::None,
        })
    }

    /// Single-field key
    pub fn single(field: impl Into<String>, direction: KeyDirection) -> Self {
        Self {
            key: KeyPattern::single(field, direction),
            presplit: Presplit::None,
        }
    }

    /// `{ _id: "hashed" }`, the fallback for collections without a tuned strategy
    pub fn hashed_id() -> Self {
        Self::single("_id", KeyDirection::Hashed)
    }

    pub fn key(&self) -> &KeyPattern {
        &self.key
    }

    pub fn with_split_points(mut self, points: Vec<SplitPoint>) -> Self {
        self.presplit = Presplit::SplitPoints(points);
        self
    }

    pub fn with_initial_chunks(mut self, chunks: NonZeroU32) -> Self {
        self.presplit = Presplit::InitialChunks(chunks);
        self
    }

    pub fn initial_chunks(&self) -> Option<NonZeroU32> {
        match self.presplit {
            Presplit::InitialChunks(n) => Some(n),
            _ => None,
        }
    }

    pub fn split_points(&self) -> &[SplitPoint] {
        match &self.presplit {
            Presplit::SplitPoints(points) => points,
            _ => &[],
        }
    }
}

/// A secondary index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub key: KeyPattern,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn new(key: KeyPattern) -> Self {
        Self {
            key,
            unique: false,
            name: None,
        }
    }

    pub fn unique(key: KeyPattern) -> Self {
        Self {
            unique: true,
            ..Self::new(key)
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Everything the provisioner needs for one collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionConfig {
    /// Collection name in the database, e.g. "users"
    pub name: String,
    pub entity: EntitySchema,
    pub shard: ShardStrategy,
    pub indexes: Vec<IndexSpec>,
    pub unique_indexes: Vec<IndexSpec>,
    pub description: String,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, entity: EntitySchema, shard: ShardStrategy) -> Self {
        let name = name.into();
        let description = format!("Stores {} documents.", entity.key());
        Self {
            name,
            entity,
            shard,
            indexes: Vec::new(),
            unique_indexes: Vec::new(),
            description,
        }
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn with_unique_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.unique_indexes = indexes;
        self
    }

    /// Deterministic name for the `ordinal`-th unique index
    pub fn unique_index_name(&self, ordinal: usize) -> String {
        format!("{}_unique_{}", self.name, ordinal)
    }
}

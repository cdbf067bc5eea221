//! Collection Provisioner
//!
//! (Re)creates one collection with its validator, shard key, pre-split
//! points and indexes. Every step is best-effort: its outcome is recorded
//! and provisioning moves on. There is no rollback, so a failure part way
//! through leaves the collection partially configured.
//!
//! The first step drops any existing collection of the same name. This is
//! only suitable for bootstrapping an empty cluster.

use std::fmt;

use serde::Serialize;

use crate::client::{namespace, ClusterClient, DropOutcome, IndexOptions};
use crate::collection::{CollectionConfig, IndexSpec, ShardStrategy};
use crate::compiler::{NativeValidator, ValidatorCompiler};

/// Provisioning steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CompileValidator,
    DropExisting,
    CreateCollection,
    ShardKeyIndex,
    ShardCollection,
    SplitAt,
    CreateIndex,
    CreateUniqueIndex,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CompileValidator => "compile validator",
            Step::DropExisting => "drop existing",
            Step::CreateCollection => "create collection",
            Step::ShardKeyIndex => "shard key index",
            Step::ShardCollection => "shard collection",
            Step::SplitAt => "split at",
            Step::CreateIndex => "create index",
            Step::CreateUniqueIndex => "create unique index",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepResult {
    Ok,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: Step,
    pub detail: String,
    pub result: StepResult,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.result == StepResult::Ok
    }
}

/// Everything that happened while provisioning one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub collection: String,
    pub namespace: String,
    pub steps: Vec<StepOutcome>,
}

impl ProvisionReport {
    fn new(database: &str, collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            namespace: namespace(database, collection),
            steps: Vec::new(),
        }
    }

    fn push(&mut self, step: Step, detail: impl Into<String>, result: StepResult) {
        let detail = detail.into();
        match &result {
            StepResult::Ok => tracing::debug!(collection = %self.collection, %step, %detail, "ok"),
            StepResult::Failed(reason) => {
                tracing::warn!(collection = %self.collection, %step, %detail, %reason, "step failed, continuing")
            }
            StepResult::Skipped(reason) => {
                tracing::warn!(collection = %self.collection, %step, %detail, %reason, "step skipped")
            }
        }
        self.steps.push(StepOutcome { step, detail, result });
    }

    fn step_ok(&self, step: Step) -> bool {
        self.steps.iter().any(|s| s.step == step && s.is_ok())
    }

    /// The collection exists with its validator and is sharded.
    /// Index and split failures do not count against this.
    pub fn succeeded(&self) -> bool {
        self.step_ok(Step::CreateCollection) && self.step_ok(Step::ShardCollection)
    }

    pub fn steps_of(&self, step: Step) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(move |s| s.step == step)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| matches!(s.result, StepResult::Failed(_)))
    }
}

fn outcome<T, E: fmt::Display>(result: Result<T, E>) -> StepResult {
    match result {
        Ok(_) => StepResult::Ok,
        Err(e) => StepResult::Failed(e.to_string()),
    }
}

/// Drives a [`ClusterClient`] through the provisioning steps
pub struct Provisioner<'a, C: ClusterClient> {
    client: &'a mut C,
    database: String,
    compiler: ValidatorCompiler,
}

impl<'a, C: ClusterClient> Provisioner<'a, C> {
    pub fn new(client: &'a mut C, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
            compiler: ValidatorCompiler::default(),
        }
    }

    pub fn with_compiler(mut self, compiler: ValidatorCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Compile the entity's validator, then provision the collection
    pub fn provision_config(&mut self, config: &CollectionConfig) -> ProvisionReport {
        match self.compiler.compile(&config.entity) {
            Ok(validator) => {
                tracing::info!(collection = %config.name, "✨ {}", config.description);
                let unique = self.named_unique_indexes(config);
                self.provision(&config.name, &validator, &config.shard, &config.indexes, &unique)
            }
            Err(e) => {
                let mut report = ProvisionReport::new(&self.database, &config.name);
                report.push(Step::CompileValidator, config.entity.name.clone(), StepResult::Failed(e.to_string()));
                report
            }
        }
    }

    /// Unique indexes carry generated names so re-runs never collide
    fn named_unique_indexes(&self, config: &CollectionConfig) -> Vec<IndexSpec> {
        config
            .unique_indexes
            .iter()
            .enumerate()
            .map(|(ordinal, index)| IndexSpec {
                key: index.key.clone(),
                unique: true,
                name: Some(config.unique_index_name(ordinal)),
            })
            .collect()
    }

    pub fn provision(
        &mut self,
        collection: &str,
        validator: &NativeValidator,
        shard: &ShardStrategy,
        indexes: &[IndexSpec],
        unique_indexes: &[IndexSpec],
    ) -> ProvisionReport {
        let mut report = ProvisionReport::new(&self.database, collection);
        let ns = report.namespace.clone();

        // 1. Drop
        match self.client.drop_collection_if_exists(collection) {
            Ok(DropOutcome::Dropped) => {
                tracing::info!(collection, "collection already exists, dropped it");
                report.push(Step::DropExisting, collection, StepResult::Ok);
            }
            Ok(DropOutcome::Absent) => {
                report.push(Step::DropExisting, collection, StepResult::Skipped("not present".to_string()));
            }
            Ok(DropOutcome::Scheduled) => report.push(Step::DropExisting, collection, StepResult::Ok),
            Err(e) => report.push(Step::DropExisting, collection, StepResult::Failed(e.to_string())),
        }

        // 2. Create with validator
        let created = self.client.create_collection(collection, validator);
        let created_ok = created.is_ok();
        report.push(Step::CreateCollection, collection, outcome(created));
        if !created_ok {
            let reason = "collection was not created".to_string();
            report.push(Step::ShardKeyIndex, shard.key().to_string(), StepResult::Skipped(reason.clone()));
            report.push(Step::ShardCollection, ns, StepResult::Skipped(reason));
            return report;
        }

        // 3. Index covering the shard key
        tracing::info!(collection, key = %shard.key(), "🔑 creating index and sharding");
        let key_index = self.client.create_index(collection, &shard.key(), &IndexOptions::default());
        report.push(Step::ShardKeyIndex, shard.key().to_string(), outcome(key_index));

        // 4. Shard, with initial chunks when requested
        let sharded = self
            .client
            .shard_collection(&ns, &shard.key(), shard.initial_chunks());
        let sharded_ok = sharded.is_ok();
        let detail = match shard.initial_chunks() {
            Some(n) => format!("{} {} ({} initial chunks)", ns, shard.key(), n),
            None => format!("{} {}", ns, shard.key()),
        };
        report.push(Step::ShardCollection, detail, outcome(sharded));

        // 5. Pre-split, each point on its own
        for point in shard.split_points() {
            let detail = serde_json::Value::Object(point.clone()).to_string();
            if !sharded_ok {
                report.push(Step::SplitAt, detail, StepResult::Skipped("collection is not sharded".to_string()));
                continue;
            }
            let split = self.client.split_at(&ns, point);
            report.push(Step::SplitAt, detail, outcome(split));
        }

        // 6. Secondary and unique indexes
        for index in indexes {
            let options = IndexOptions {
                unique: index.unique,
                name: index.name.clone(),
            };
            let created = self.client.create_index(collection, &index.key, &options);
            report.push(Step::CreateIndex, index.key.to_string(), outcome(created));
        }
        for index in unique_indexes {
            let options = IndexOptions {
                unique: true,
                name: index.name.clone(),
            };
            let detail = format!(
                "{} {}",
                index.name.as_deref().unwrap_or_default(),
                index.key
            );
            let created = self.client.create_index(collection, &index.key, &options);
            report.push(Step::CreateUniqueIndex, detail.trim().to_string(), outcome(created));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Call, MemoryCluster};
    use crate::collection::{KeyDirection, KeyPattern};
    use crate::schema::{EntitySchema, FieldKind, FieldSpec};
    use serde_json::{json, Map};

    fn users() -> CollectionConfig {
        let entity = EntitySchema::new(
            "User",
            vec![
                FieldSpec::new("email", FieldKind::String).required(),
                FieldSpec::new("login", FieldKind::String),
            ],
        );
        let points = ["f", "m", "s"]
            .iter()
            .map(|v| {
                let mut point = Map::new();
                point.insert("email".to_string(), json!(v));
                point
            })
            .collect();
        let shard = ShardStrategy::new(KeyPattern::single("email", KeyDirection::Ascending))
            .unwrap()
            .with_split_points(points);
        CollectionConfig::new("users", entity, shard)
            .with_indexes(vec![IndexSpec::new(KeyPattern::single("login", KeyDirection::Ascending))])
            .with_unique_indexes(vec![IndexSpec::unique(
                KeyPattern::new()
                    .with("email", KeyDirection::Ascending)
                    .with("login", KeyDirection::Ascending),
            )])
    }

    #[test]
    fn test_steps_run_in_order() {
        let mut cluster = MemoryCluster::new();
        let report = Provisioner::new(&mut cluster, "secret_santa").provision_config(&users());

        let steps: Vec<Step> = report.steps.iter().map(|s| s.step).collect();
        assert_eq!(
            steps,
            vec![
                Step::DropExisting,
                Step::CreateCollection,
                Step::ShardKeyIndex,
                Step::ShardCollection,
                Step::SplitAt,
                Step::SplitAt,
                Step::SplitAt,
                Step::CreateIndex,
                Step::CreateUniqueIndex,
            ]
        );
        assert!(report.succeeded());
        assert_eq!(report.failures().count(), 0);

        let users = cluster.collection("users").unwrap();
        assert_eq!(users.boundaries.len(), 3);
        assert!(users.index("users_unique_0").unwrap().unique);
    }

    #[test]
    fn test_failed_split_does_not_stop_the_rest() {
        let mut cluster = MemoryCluster::new().fail_when(
            |call| matches!(call, Call::SplitAt { point, .. } if point.get("email") == Some(&json!("m"))),
            "split point is already a chunk boundary",
        );
        let report = Provisioner::new(&mut cluster, "secret_santa").provision_config(&users());

        let splits: Vec<&StepOutcome> = report.steps_of(Step::SplitAt).collect();
        assert_eq!(splits.len(), 3);
        assert!(splits[0].is_ok());
        assert!(matches!(splits[1].result, StepResult::Failed(_)));
        assert!(splits[2].is_ok());

        let split_calls = cluster
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::SplitAt { .. }))
            .count();
        assert_eq!(split_calls, 3);
        assert_eq!(cluster.collection("users").unwrap().boundaries.len(), 2);
        assert!(report.succeeded());
        assert!(report.steps_of(Step::CreateUniqueIndex).all(StepOutcome::is_ok));
    }

    #[test]
    fn test_existing_collection_is_dropped() {
        let mut cluster = MemoryCluster::new().with_collection("users");
        let report = Provisioner::new(&mut cluster, "secret_santa").provision_config(&users());
        assert_eq!(report.steps[0].result, StepResult::Ok);
        assert!(matches!(cluster.calls()[0], Call::DropCollection { .. }));
        assert!(cluster.collection("users").unwrap().validator.is_some());
    }

    #[test]
    fn test_create_failure_skips_dependent_steps() {
        let mut cluster = MemoryCluster::new()
            .fail_when(|call| matches!(call, Call::CreateCollection { .. }), "validator rejected");
        let report = Provisioner::new(&mut cluster, "secret_santa").provision_config(&users());
        assert!(!report.succeeded());
        assert!(matches!(
            report.steps_of(Step::ShardCollection).next().unwrap().result,
            StepResult::Skipped(_)
        ));
        assert_eq!(report.steps_of(Step::SplitAt).count(), 0);
    }

    #[test]
    fn test_initial_chunks_skip_split_points() {
        let entity = EntitySchema::new("Game", vec![FieldSpec::new("name", FieldKind::String)]);
        let config = CollectionConfig::new(
            "games",
            entity,
            ShardStrategy::hashed_id().with_initial_chunks(std::num::NonZeroU32::new(4).unwrap()),
        );
        let mut cluster = MemoryCluster::new();
        let report = Provisioner::new(&mut cluster, "secret_santa").provision_config(&config);

        assert!(report.succeeded());
        assert_eq!(report.steps_of(Step::SplitAt).count(), 0);
        assert_eq!(
            cluster.collection("games").unwrap().initial_chunks.map(|n| n.get()),
            Some(4)
        );
    }
}

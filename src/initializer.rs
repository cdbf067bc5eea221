//! Cluster Initializer
//!
//! Provisions every collection in a fixed order and summarises the result.
//! A failing collection never stops the ones after it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::ClusterClient;
use crate::collection::{CollectionConfig, Presplit};
use crate::compiler::ValidatorCompiler;
use crate::defaults::CollectionPlanner;
use crate::lint::{LintResult, SchemaLinter};
use crate::provision::{ProvisionReport, Provisioner, Step};
use crate::registry::SchemaRegistry;

/// One line of the final summary
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub collection: String,
    pub shard_key: String,
    pub presplit: String,
    pub indexes: usize,
    pub failed_operations: usize,
    pub lint_errors: usize,
    pub lint_warnings: usize,
    pub succeeded: bool,
}

/// Result of a whole initialization run
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub database: String,
    pub generated_at: DateTime<Utc>,
    pub sharding_enabled: bool,
    pub rows: Vec<SummaryRow>,
    pub reports: Vec<ProvisionReport>,
    pub lint: Vec<LintResult>,
}

impl Summary {
    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|r| r.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.rows.len() - self.succeeded()
    }

    pub fn row(&self, collection: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.collection == collection)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════════════════════════════")?;
        writeln!(f, "  CLUSTER INITIALIZATION SUMMARY: {}", self.database)?;
        writeln!(f, "═══════════════════════════════════════════════════════════════════════════════")?;
        writeln!(
            f,
            "{:<16} {:<28} {:<14} {:>7} {:>6} {:>6}  {}",
            "COLLECTION", "SHARD KEY", "PRESPLIT", "INDEXES", "FAILED", "LINT", "STATUS"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<16} {:<28} {:<14} {:>7} {:>6} {:>6}  {}",
                row.collection,
                row.shard_key,
                row.presplit,
                row.indexes,
                row.failed_operations,
                format!("{}/{}", row.lint_errors, row.lint_warnings),
                if row.succeeded { "✅" } else { "❌" }
            )?;
        }
        writeln!(f)?;
        write!(
            f,
            "{} collections: {} succeeded, {} failed",
            self.rows.len(),
            self.succeeded(),
            self.failed()
        )
    }
}

fn presplit_label(config: &CollectionConfig) -> String {
    match &config.shard.presplit {
        Presplit::None => "-".to_string(),
        Presplit::SplitPoints(points) => format!("{} points", points.len()),
        Presplit::InitialChunks(n) => format!("{} chunks", n),
    }
}

/// Runs the provisioner over a set of collections
pub struct ClusterInitializer {
    database: String,
    strict: bool,
    compiler: ValidatorCompiler,
    linter: SchemaLinter,
}

impl ClusterInitializer {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            strict: false,
            compiler: ValidatorCompiler::default(),
            linter: SchemaLinter::new(),
        }
    }

    /// Refuse to provision collections with lint errors
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_compiler(mut self, compiler: ValidatorCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Plan every registry entity and provision it
    pub fn initialize_registry<C: ClusterClient>(
        &self,
        client: &mut C,
        registry: &SchemaRegistry,
        planner: &CollectionPlanner,
    ) -> Summary {
        self.initialize(client, &planner.plan(registry))
    }

    /// Provision `configs` in the order given
    pub fn initialize<C: ClusterClient>(&self, client: &mut C, configs: &[CollectionConfig]) -> Summary {
        tracing::info!(database = %self.database, "🚀 enabling sharding");
        let sharding_enabled = match client.enable_sharding(&self.database) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(database = %self.database, error = %e, "enableSharding failed, continuing");
                false
            }
        };

        let mut rows = Vec::with_capacity(configs.len());
        let mut reports = Vec::with_capacity(configs.len());
        let mut lint = Vec::with_capacity(configs.len());

        for config in configs {
            let findings = self.linter.lint_collection(config);
            for error in &findings.errors {
                tracing::warn!(collection = %config.name, code = error.code, path = %error.path, "{}", error.message);
            }
            for warning in &findings.warnings {
                tracing::debug!(collection = %config.name, code = warning.code, path = %warning.path, "{}", warning.message);
            }

            let mut row = SummaryRow {
                collection: config.name.clone(),
                shard_key: config.shard.key().to_string(),
                presplit: presplit_label(config),
                indexes: 0,
                failed_operations: 0,
                lint_errors: findings.errors.len(),
                lint_warnings: findings.warnings.len(),
                succeeded: false,
            };

            if self.strict && !findings.is_clean() {
                tracing::warn!(
                    collection = %config.name,
                    errors = findings.errors.len(),
                    "skipping collection with lint errors (strict mode)"
                );
            } else {
                let report = Provisioner::new(client, self.database.clone())
                    .with_compiler(self.compiler)
                    .provision_config(config);

                row.indexes = report
                    .steps
                    .iter()
                    .filter(|s| {
                        matches!(s.step, Step::ShardKeyIndex | Step::CreateIndex | Step::CreateUniqueIndex)
                            && s.is_ok()
                    })
                    .count();
                row.failed_operations = report.failures().count();
                row.succeeded = report.succeeded();

                if row.succeeded {
                    tracing::info!(collection = %config.name, "✅ provisioned");
                } else {
                    tracing::warn!(collection = %config.name, "❌ provisioning incomplete");
                }
                reports.push(report);
            }

            rows.push(row);
            lint.push(findings);
        }

        Summary {
            database: self.database.clone(),
            generated_at: Utc::now(),
            sharding_enabled,
            rows,
            reports,
            lint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Call, MemoryCluster};

    #[test]
    fn test_builtin_registry_provisions_every_collection() {
        let mut cluster = MemoryCluster::new();
        let summary = ClusterInitializer::new("secret_santa").initialize_registry(
            &mut cluster,
            &SchemaRegistry::builtin(),
            &CollectionPlanner::new(),
        );

        let order: Vec<&str> = summary.rows.iter().map(|r| r.collection.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "users", "games", "players", "wishlists", "pairs", "messages",
                "directmessages", "notifications", "tickets", "logs",
            ]
        );
        assert!(summary.sharding_enabled);
        assert!(cluster.is_sharding_enabled("secret_santa"));
        assert_eq!(summary.failed(), 0);

        // Both unique user indexes are rejected by the cluster: {login:1} and
        // {email:1} already exist as secondary indexes, and {login:1} is not
        // prefixed by the {email:1} shard key. The failures are tolerated.
        let users = summary.row("users").unwrap();
        assert!(users.succeeded);
        assert_eq!(users.failed_operations, 2);
        let report = summary.reports.iter().find(|r| r.collection == "users").unwrap();
        let rejected: Vec<&str> = report.failures().map(|s| s.detail.as_str()).collect();
        assert!(rejected.iter().all(|d| d.starts_with("users_unique_")), "{:?}", rejected);
        assert_eq!(summary.row("pairs").unwrap().failed_operations, 0);

        // Stale field names in the default tables are surfaced, not fixed
        assert!(summary.row("players").unwrap().lint_errors > 0);
        assert_eq!(summary.row("pairs").unwrap().lint_errors, 0);
    }

    #[test]
    fn test_strict_mode_skips_invalid_collections() {
        let mut cluster = MemoryCluster::new();
        let summary = ClusterInitializer::new("secret_santa").strict(true).initialize_registry(
            &mut cluster,
            &SchemaRegistry::builtin(),
            &CollectionPlanner::new(),
        );

        let players = summary.row("players").unwrap();
        assert!(!players.succeeded);
        assert!(cluster.collection("players").is_none());
        assert!(cluster.collection("pairs").is_some());
    }

    #[test]
    fn test_one_failure_does_not_stop_the_rest() {
        let mut cluster = MemoryCluster::new().fail_when(
            |call| matches!(call, Call::CreateCollection { collection } if collection == "games"),
            "boom",
        );
        let summary = ClusterInitializer::new("secret_santa").initialize_registry(
            &mut cluster,
            &SchemaRegistry::builtin(),
            &CollectionPlanner::new(),
        );
        assert!(!summary.row("games").unwrap().succeeded);
        assert_eq!(summary.failed(), 1);
        assert!(cluster.collection("logs").unwrap().is_sharded());
    }

    #[test]
    fn test_summary_table() {
        let mut cluster = MemoryCluster::new();
        let summary = ClusterInitializer::new("secret_santa").initialize_registry(
            &mut cluster,
            &SchemaRegistry::builtin(),
            &CollectionPlanner::new(),
        );
        let table = summary.to_string();
        assert!(table.contains("CLUSTER INITIALIZATION SUMMARY: secret_santa"));
        assert!(table.contains("3 points"));
        assert!(table.contains("4 chunks"));
        assert!(table.ends_with("10 collections: 10 succeeded, 0 failed"));
    }
}

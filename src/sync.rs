//! Schema Synchronizer
//!
//! Keeps the native validator files in line with the entity schemas:
//!
//! - `check`: which entities exist on only one side, and which validators
//!   differ from what the schema compiles to
//! - `generate`: derive collection configs and render the cluster
//!   initialization script
//! - `validate`: lint every entity and its collection config
//! - `export`: write the compiled validators, making the native side a pure
//!   export of the schemas

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::client::ScriptCluster;
use crate::collection::CollectionConfig;
use crate::compiler::ValidatorCompiler;
use crate::defaults::CollectionPlanner;
use crate::error::Result;
use crate::initializer::{ClusterInitializer, Summary};
use crate::lint::{LintResult, SchemaLinter};
use crate::registry::{SchemaRegistry, ValidatorCatalog};

/// Where an entity is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// No entity schema source
    Schema,
    /// No native validator
    Validator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftFinding {
    pub entity: String,
    pub missing_from: Side,
    pub message: String,
}

/// Entities present on exactly one side
pub fn name_drift<'a>(
    schema_names: impl IntoIterator<Item = &'a str>,
    validator_names: impl IntoIterator<Item = &'a str>,
) -> Vec<DriftFinding> {
    let schemas: BTreeSet<&str> = schema_names.into_iter().collect();
    let validators: BTreeSet<&str> = validator_names.into_iter().collect();

    let missing_validator = schemas.difference(&validators).map(|name| DriftFinding {
        entity: name.to_string(),
        missing_from: Side::Validator,
        message: format!("Validator missing for {}", name),
    });
    let missing_schema = validators.difference(&schemas).map(|name| DriftFinding {
        entity: name.to_string(),
        missing_from: Side::Schema,
        message: format!("Validator exists but no schema for {}", name),
    });

    missing_validator.chain(missing_schema).collect()
}

/// A validator whose content differs from the compiled schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentChange {
    pub entity: String,
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DriftReport {
    pub findings: Vec<DriftFinding>,
    pub changed: Vec<ContentChange>,
    pub unchanged: usize,
}

impl DriftReport {
    pub fn in_sync(&self) -> bool {
        self.findings.is_empty() && self.changed.is_empty()
    }
}

/// Compare two validator documents property by property
pub fn detect_changes(stored: &Value, compiled: &Value) -> Vec<String> {
    let mut changes = Vec::new();

    if let (Some(old_props), Some(new_props)) = (
        stored.get("properties").and_then(Value::as_object),
        compiled.get("properties").and_then(Value::as_object),
    ) {
        for key in old_props.keys() {
            if !new_props.contains_key(key) {
                changes.push(format!("Property '{}' only in validator", key));
            }
        }
        for key in new_props.keys() {
            if !old_props.contains_key(key) {
                changes.push(format!("Property '{}' missing from validator", key));
            }
        }

        for (key, old_prop) in old_props {
            let Some(new_prop) = new_props.get(key) else {
                continue;
            };
            let old_type = old_prop.get("bsonType");
            let new_type = new_prop.get("bsonType");
            if old_type != new_type {
                changes.push(format!(
                    "Property '{}' type differs: {} vs {}",
                    key,
                    old_type.unwrap_or(&Value::Null),
                    new_type.unwrap_or(&Value::Null)
                ));
            } else if old_prop.get("enum") != new_prop.get("enum") {
                changes.push(format!("Property '{}' enum values differ", key));
            } else if old_prop != new_prop {
                changes.push(format!("Property '{}' nested structure differs", key));
            }
        }
    }

    let required = |v: &Value| -> BTreeSet<String> {
        v.get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };
    let (old_req, new_req) = (required(stored), required(compiled));
    for name in new_req.difference(&old_req) {
        changes.push(format!("Property '{}' is required by the schema only", name));
    }
    for name in old_req.difference(&new_req) {
        changes.push(format!("Property '{}' is required by the validator only", name));
    }

    if changes.is_empty() && stored != compiled {
        changes.push("Content differs (details unavailable)".to_string());
    }
    changes
}

/// Result of `generate`
#[derive(Debug, Clone)]
pub struct Generated {
    pub configs: Vec<CollectionConfig>,
    pub script: String,
    pub summary: Summary,
}

/// Lint outcome for one entity
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub entity: String,
    pub collection: String,
    pub valid: bool,
    pub lint: LintResult,
}

/// The synchronizer commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Check,
    Generate,
    Validate,
    Export,
}

/// Loads both sides fresh and answers one command
pub struct SchemaSynchronizer {
    registry: SchemaRegistry,
    catalog: ValidatorCatalog,
    planner: CollectionPlanner,
    compiler: ValidatorCompiler,
    database: String,
}

impl SchemaSynchronizer {
    pub fn new(registry: SchemaRegistry, catalog: ValidatorCatalog, database: impl Into<String>) -> Self {
        Self {
            registry,
            catalog,
            planner: CollectionPlanner::new(),
            compiler: ValidatorCompiler::default(),
            database: database.into(),
        }
    }

    pub fn with_planner(mut self, planner: CollectionPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_compiler(mut self, compiler: ValidatorCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &ValidatorCatalog {
        &self.catalog
    }

    pub fn check(&self) -> DriftReport {
        tracing::info!("🔍 checking for schema differences");
        let mut report = DriftReport {
            findings: name_drift(self.registry.keys(), self.catalog.keys()),
            ..Default::default()
        };

        for entity in self.registry.entities() {
            let key = entity.key();
            let Some(stored) = self.catalog.get(&key) else {
                continue;
            };
            let compiled = match self.compiler.compile(entity) {
                Ok(v) => v.into_json(),
                Err(e) => {
                    report.changed.push(ContentChange {
                        entity: key,
                        changes: vec![format!("Schema does not compile: {}", e)],
                    });
                    continue;
                }
            };

            if *stored == compiled {
                report.unchanged += 1;
            } else {
                report.changed.push(ContentChange {
                    entity: key,
                    changes: detect_changes(stored, &compiled),
                });
            }
        }
        report
    }

    pub fn generate(&self) -> Generated {
        self.generate_at(Utc::now())
    }

    /// `generate` with a fixed timestamp in the script header
    pub fn generate_at(&self, generated_at: DateTime<Utc>) -> Generated {
        tracing::info!("🔧 generating cluster initialization script");
        let configs = self.planner.plan(&self.registry);
        let mut script = ScriptCluster::at(self.database.clone(), generated_at);
        let summary = ClusterInitializer::new(self.database.clone())
            .with_compiler(self.compiler)
            .initialize(&mut script, &configs);
        Generated {
            configs,
            script: script.finish(),
            summary,
        }
    }

    pub fn validate(&self) -> Vec<Validation> {
        tracing::info!("🔍 validating schemas");
        let linter = SchemaLinter::new();
        self.planner
            .plan(&self.registry)
            .iter()
            .map(|config| {
                let lint = linter.lint_collection(config);
                Validation {
                    entity: config.entity.key(),
                    collection: config.name.clone(),
                    valid: lint.is_clean(),
                    lint,
                }
            })
            .collect()
    }

    /// Write each compiled validator to `dir/<source stem>.json`
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for entity in self.registry.entities() {
            let validator = self.compiler.compile(entity)?;
            let path = dir.join(format!("{}.json", entity.source()));
            let mut content = serde_json::to_string_pretty(validator.as_json())?;
            content.push('\n');
            fs::write(&path, content)?;
            tracing::debug!(path = %path.display(), "exported validator");
            written.push(path);
        }
        Ok(written)
    }
}

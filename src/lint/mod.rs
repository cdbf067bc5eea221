//! Schema and Collection Linting
//!
//! Structural checks for entity schemas and the collection configs built on
//! them.
//!
//! ## Lints
//! 1. **Field shape**: names, duplicates, enum/array/object structure, defaults
//! 2. **Key references**: every shard-key, index and split-point field must
//!    resolve to a declared field (dotted paths step into nested objects)
//! 3. **Sharding rules**: one hashed field per key, presplit fits the key,
//!    unique indexes are prefixed by the shard key

use std::collections::HashSet;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::collection::{CollectionConfig, KeyDirection, KeyPattern, Presplit};
use crate::schema::{EntitySchema, FieldKind, FieldSpec, TypeSpec};

/// Result of linting one entity or collection
#[derive(Debug, Default, Clone, Serialize)]
pub struct LintResult {
    /// Entity key or collection name
    pub subject: String,
    pub errors: Vec<LintFinding>,
    pub warnings: Vec<LintFinding>,
}

impl LintResult {
    fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn error(&mut self, code: &'static str, path: impl Into<String>, message: String) {
        self.errors.push(LintFinding {
            code,
            message,
            path: path.into(),
        });
    }

    fn warn(&mut self, code: &'static str, path: impl Into<String>, message: String) {
        self.warnings.push(LintFinding {
            code,
            message,
            path: path.into(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    pub code: &'static str,
    pub message: String,
    pub path: String,
}

/// The schema linter
pub struct SchemaLinter {
    field_name: Regex,
    matcher: SkimMatcherV2,
}

impl Default for SchemaLinter {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaLinter {
    pub fn new() -> Self {
        Self {
            // No `$` prefix, no dots: both are reserved by the store
            field_name: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap(),
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Lint an entity schema on its own
    pub fn lint_entity(&self, entity: &EntitySchema) -> LintResult {
        let mut result = LintResult::new(entity.key());
        if entity.fields.is_empty() {
            result.warn("EMPTY_ENTITY", "", format!("{} declares no fields", entity.name));
        }
        self.lint_fields(&entity.fields, "", &mut result);
        result
    }

    /// Lint a collection config, including its entity
    pub fn lint_collection(&self, config: &CollectionConfig) -> LintResult {
        let entity = &config.entity;
        let mut result = self.lint_entity(entity);
        result.subject = config.name.clone();

        let key = config.shard.key();
        self.check_key_fields(entity, key, "shard.key", "UNKNOWN_SHARD_FIELD", &mut result);

        let hashed = key.iter().filter(|(_, d)| *d == KeyDirection::Hashed).count();
        if hashed > 1 {
            result.error(
                "MULTIPLE_HASHED_FIELDS",
                "shard.key",
                format!("shard key {} has {} hashed fields, at most one is allowed", key, hashed),
            );
        }

        match &config.shard.presplit {
            Presplit::None => {}
            Presplit::InitialChunks(n) => {
                if !key.is_hashed() {
                    result.warn(
                        "INITIAL_CHUNKS_WITHOUT_HASHED_KEY",
                        "shard.presplit",
                        format!("{} initial chunks requested for non-hashed key {}", n, key),
                    );
                }
            }
            Presplit::SplitPoints(points) => {
                for (i, point) in points.iter().enumerate() {
                    let path = format!("shard.presplit.split_points[{}]", i);
                    for field in point.keys() {
                        if !key.contains(field) {
                            result.error(
                                "SPLIT_FIELD_NOT_IN_KEY",
                                path.clone(),
                                format!("split point field '{}' is not part of shard key {}", field, key),
                            );
                        }
                    }
                }
            }
        }

        for (i, index) in config.indexes.iter().enumerate() {
            let path = format!("indexes[{}]", i);
            self.check_key_fields(entity, &index.key, &path, "UNKNOWN_INDEX_FIELD", &mut result);
        }

        for (i, index) in config.unique_indexes.iter().enumerate() {
            let path = format!("unique_indexes[{}]", i);
            self.check_key_fields(entity, &index.key, &path, "UNKNOWN_INDEX_FIELD", &mut result);

            if !key.supports_unique(&index.key) {
                result.warn(
                    "UNIQUE_INDEX_NOT_SHARD_PREFIXED",
                    path,
                    format!(
                        "unique index {} is not prefixed by shard key {}; a sharded cluster will reject it",
                        index.key, key
                    ),
                );
            }
        }

        result
    }

    fn check_key_fields(
        &self,
        entity: &EntitySchema,
        key: &KeyPattern,
        path: &str,
        code: &'static str,
        result: &mut LintResult,
    ) {
        for field in key.fields() {
            if entity.resolve_path(field).is_some() {
                continue;
            }
            let message = match self.suggest(entity, field) {
                Some(candidate) => format!(
                    "'{}' is not a field of {} (did you mean '{}'?)",
                    field, entity.name, candidate
                ),
                None => format!("'{}' is not a field of {}", field, entity.name),
            };
            result.error(code, path, message);
        }
    }

    /// Closest declared field path to `field`
    pub fn suggest(&self, entity: &EntitySchema, field: &str) -> Option<String> {
        entity
            .field_paths()
            .into_iter()
            .filter_map(|candidate| {
                self.matcher
                    .fuzzy_match(&candidate, field)
                    .map(|score| (score, candidate))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, candidate)| candidate)
    }

    fn lint_fields(&self, fields: &[FieldSpec], prefix: &str, result: &mut LintResult) {
        let mut seen = HashSet::new();
        for field in fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{}.{}", prefix, field.name)
            };

            if !self.field_name.is_match(&field.name) && field.name != "_id" {
                result.error(
                    "INVALID_FIELD_NAME",
                    path.clone(),
                    format!("'{}' is not a valid document field name", field.name),
                );
            }
            if !seen.insert(field.name.as_str()) {
                result.error("DUPLICATE_FIELD", path.clone(), format!("field '{}' is declared twice", field.name));
            }

            self.lint_type(&field.ty, &path, result);

            if let Some(default) = &field.default {
                self.lint_default(&field.ty, default, &path, result);
            }
        }
    }

    fn lint_type(&self, ty: &TypeSpec, path: &str, result: &mut LintResult) {
        if let FieldKind::Unknown(kind) = &ty.kind {
            result.warn(
                "UNKNOWN_KIND",
                path,
                format!("unknown kind '{}' will be validated as a string", kind),
            );
        }

        if let Some(values) = &ty.enum_values {
            if ty.kind != FieldKind::String {
                result.error("ENUM_ON_NON_STRING", path, format!("enum declared on a {} field", ty.kind));
            }
            if values.is_empty() {
                result.error("EMPTY_ENUM", path, "enum lists no values".to_string());
            }
            let mut seen = HashSet::new();
            for value in values {
                if !seen.insert(value) {
                    result.warn("DUPLICATE_ENUM_VALUE", path, format!("enum value '{}' is repeated", value));
                }
            }
        }

        match ty.kind {
            FieldKind::Array => match &ty.items {
                Some(element) => self.lint_type(element, path, result),
                None => result.error("ARRAY_WITHOUT_ITEMS", path, "array declares no element type".to_string()),
            },
            FieldKind::Object => {
                if let Some(nested) = &ty.fields {
                    self.lint_fields(nested, path, result);
                }
                if ty.items.is_some() {
                    result.warn("NESTED_ON_PRIMITIVE", path, "items on an object field is ignored".to_string());
                }
            }
            _ => {
                if ty.fields.is_some() || ty.items.is_some() {
                    result.warn(
                        "NESTED_ON_PRIMITIVE",
                        path,
                        format!("nested structure on a {} field is ignored", ty.kind),
                    );
                }
            }
        }
    }

    fn lint_default(&self, ty: &TypeSpec, default: &Value, path: &str, result: &mut LintResult) {
        let matches = match ty.kind {
            FieldKind::String | FieldKind::Identifier => default.is_string(),
            // Dates default to an ISO-8601 string or a sentinel such as "now"
            FieldKind::Date => default.is_string(),
            FieldKind::Number => default.is_number(),
            FieldKind::Boolean => default.is_boolean(),
            FieldKind::Object => default.is_object(),
            FieldKind::Array => default.is_array(),
            FieldKind::Unknown(_) => true,
        };
        if !matches {
            result.error(
                "DEFAULT_TYPE_MISMATCH",
                path,
                format!("default {} does not match kind {}", default, ty.kind),
            );
            return;
        }

        if let (Some(values), Some(s)) = (&ty.enum_values, default.as_str()) {
            if !values.iter().any(|v| v == s) {
                result.error(
                    "DEFAULT_NOT_IN_ENUM",
                    path,
                    format!("default '{}' is not one of {:?}", s, values),
                );
            }
        }
    }
}

//! Schema Registry
//!
//! Discovers entity schema sources on disk (or the built-in set embedded at
//! compile time) and the native validator files they are exported to.
//! A source that cannot be read or parsed is logged and skipped; the load
//! only fails if the directory itself cannot be listed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use include_dir::{include_dir, Dir};
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{Result, SchemaError};
use crate::schema::EntitySchema;

static BUILTIN_SCHEMAS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

/// Default file suffix for schema and validator sources
pub const DEFAULT_EXTENSION: &str = ".json";

/// A source that was discovered but could not be loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadIssue {
    pub file: String,
    pub reason: String,
}

/// Map a source filename to its registry key: strip the suffix, lower-case.
///
/// `DirectMessage.json` -> `directmessage`
pub fn entity_key(file_name: &str, extension: &str) -> String {
    file_name
        .strip_suffix(extension)
        .unwrap_or(file_name)
        .to_lowercase()
}

fn file_stem<'a>(file_name: &'a str, extension: &str) -> &'a str {
    file_name.strip_suffix(extension).unwrap_or(file_name)
}

/// List files directly under `dir` whose name ends with `extension`, sorted by name
pub fn discover(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SchemaError::NotFound(format!(
            "schema directory {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| SchemaError::Load {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.ends_with(extension) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Entity schemas keyed by lower-cased source file stem
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntitySchema>,
    discovered: usize,
    issues: Vec<LoadIssue>,
}

impl SchemaRegistry {
    /// Build a registry from already-constructed schemas
    pub fn from_entities(entities: impl IntoIterator<Item = EntitySchema>) -> Self {
        let mut registry = Self::default();
        for entity in entities {
            registry.discovered += 1;
            registry.insert(entity);
        }
        registry
    }

    /// The Secret Santa schemas embedded in the binary
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        let mut files: Vec<_> = BUILTIN_SCHEMAS.files().collect();
        files.sort_by_key(|f| f.path());

        for file in files {
            let name = file.path().to_string_lossy().to_string();
            if !name.ends_with(DEFAULT_EXTENSION) {
                continue;
            }
            registry.discovered += 1;
            match file.contents_utf8() {
                Some(content) => registry.load_source(&name, content, DEFAULT_EXTENSION),
                None => registry.skip(&name, "not valid UTF-8".to_string()),
            }
        }
        registry
    }

    /// Load every `*<extension>` file under `dir`
    pub fn load_dir(dir: &Path, extension: &str) -> Result<Self> {
        let mut registry = Self::default();
        let files = discover(dir, extension)?;
        tracing::info!(count = files.len(), dir = %dir.display(), "found schema files");

        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            registry.discovered += 1;
            match fs::read_to_string(&path) {
                Ok(content) => registry.load_source(&name, &content, extension),
                Err(e) => registry.skip(&name, e.to_string()),
            }
        }
        Ok(registry)
    }

    fn load_source(&mut self, file_name: &str, content: &str, extension: &str) {
        match EntitySchema::from_json(content, file_stem(file_name, extension)) {
            Ok(entity) => {
                let key = entity_key(file_name, extension);
                tracing::debug!(entity = %key, file = file_name, "processing schema");
                self.entities.insert(key, entity);
            }
            Err(e) => self.skip(file_name, e.to_string()),
        }
    }

    fn skip(&mut self, file_name: &str, reason: String) {
        tracing::warn!(file = file_name, %reason, "error loading schema, skipping");
        self.issues.push(LoadIssue {
            file: file_name.to_string(),
            reason,
        });
    }

    pub fn insert(&mut self, entity: EntitySchema) {
        self.entities.insert(entity.key(), entity);
    }

    pub fn get(&self, key: &str) -> Option<&EntitySchema> {
        self.entities.get(&key.to_lowercase())
    }

    /// Loaded entities ordered by key
    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of source files found, including ones that failed to load
    pub fn discovered(&self) -> usize {
        self.discovered
    }

    pub fn issues(&self) -> &[LoadIssue] {
        &self.issues
    }
}

/// Native validator documents keyed by lower-cased file stem
#[derive(Debug, Clone, Default)]
pub struct ValidatorCatalog {
    validators: BTreeMap<String, Value>,
    issues: Vec<LoadIssue>,
}

impl ValidatorCatalog {
    pub fn from_validators(validators: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            validators: validators
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
            issues: Vec::new(),
        }
    }

    /// Load every `*<extension>` validator under `dir`. A missing directory is
    /// an empty catalog: nothing has been exported yet.
    pub fn load_dir(dir: &Path, extension: &str) -> Result<Self> {
        let mut catalog = Self::default();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "validator directory not found");
            return Ok(catalog);
        }

        for path in discover(dir, extension)? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let parsed = fs::read_to_string(&path)
                .map_err(SchemaError::from)
                .and_then(|content| serde_json::from_str::<Value>(&content).map_err(SchemaError::from));

            match parsed {
                Ok(value) => {
                    // Accept both a bare schema and a `{ "$jsonSchema": ... }` wrapper
                    let schema = match value.get("$jsonSchema") {
                        Some(inner) => inner.clone(),
                        None => value,
                    };
                    catalog.validators.insert(entity_key(&name, extension), schema);
                }
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "error loading validator, skipping");
                    catalog.issues.push(LoadIssue {
                        file: name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(catalog)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.validators.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn issues(&self) -> &[LoadIssue] {
        &self.issues
    }
}

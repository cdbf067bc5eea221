//! mongosh script backend
//!
//! Every call becomes a statement in a script meant to be run against the
//! cluster router (`mongosh --file`). Every statement is wrapped so a
//! failure is printed and the script carries on. Index, shard and split
//! statements only run once their collection was created (and sharded).

use std::fmt::Write as _;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{ClusterClient, DropOutcome, IndexOptions};
use crate::collection::{KeyPattern, SplitPoint};
use crate::compiler::NativeValidator;
use crate::error::ClientError;

/// Renders cluster calls as a mongosh script
#[derive(Debug, Clone)]
pub struct ScriptCluster {
    database: String,
    body: String,
    generated_at: DateTime<Utc>,
}

fn js(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn try_block(statement: &str, label: &str) -> String {
    format!(
        "try {{\n{}\n}} catch (e) {{\n  print(`⚠️  {} failed: ${{e.message}}`);\n}}",
        indent(statement, "  "),
        label.replace('`', "'")
    )
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ScriptCluster {
    pub fn new(database: impl Into<String>) -> Self {
        Self::at(database, Utc::now())
    }

    /// Fixed generation time, for reproducible output
    pub fn at(database: impl Into<String>, generated_at: DateTime<Utc>) -> Self {
        Self {
            database: database.into(),
            body: String::new(),
            generated_at,
        }
    }

    /// Append a statement that prints `label` on failure instead of aborting
    fn guarded(&mut self, statement: &str, label: &str) {
        let block = try_block(statement, label);
        let _ = writeln!(self.body, "{}", block);
    }

    /// Like [`Self::guarded`], but only run when `condition` holds at runtime
    fn guarded_if(&mut self, condition: &str, statement: &str, label: &str) {
        let _ = writeln!(self.body, "if ({}) {{", condition);
        let _ = writeln!(self.body, "{}", indent(&try_block(statement, label), "  "));
        let _ = writeln!(self.body, "}} else {{");
        let _ = writeln!(self.body, "  print({});", js(&format!("⏭️  {} skipped", label)));
        let _ = writeln!(self.body, "}}");
    }

    /// Collection part of `<database>.<collection>`
    fn collection_of<'a>(&self, namespace: &'a str) -> &'a str {
        namespace
            .strip_prefix(self.database.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(namespace)
    }

    fn print(&mut self, message: &str) {
        let _ = writeln!(self.body, "print({});", js(&message));
    }

    /// The statements emitted so far, without header
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Complete script: header, statements, closing message
    pub fn finish(&self) -> String {
        let mut script = String::new();
        let _ = writeln!(script, "// Cluster initialization for the {} database.", self.database);
        let _ = writeln!(script, "// Generated by santa-schemas at {}. Do not edit by hand;", self.generated_at.to_rfc3339());
        let _ = writeln!(script, "// regenerate with `santa-sync --generate --output <file>`.");
        let _ = writeln!(script);
        let _ = writeln!(script, "db = db.getSiblingDB({});", js(&self.database));
        let _ = writeln!(script, "const created = new Set();");
        let _ = writeln!(script, "const sharded = new Set();");
        let _ = writeln!(script);
        script.push_str(&self.body);
        let _ = writeln!(script);
        let _ = writeln!(script, "print({});", js(&"✅ Cluster initialization script finished."));
        script
    }
}

impl ClusterClient for ScriptCluster {
    fn enable_sharding(&mut self, database: &str) -> Result<(), ClientError> {
        self.print(&format!("🚀 Enabling sharding for database: {}", database));
        self.guarded(&format!("sh.enableSharding({});", js(&database)), "enableSharding");
        self.body.push('\n');
        Ok(())
    }

    fn drop_collection_if_exists(&mut self, collection: &str) -> Result<DropOutcome, ClientError> {
        let name = js(&collection);
        let statement = format!(
            "if (db.getCollectionNames().includes({name})) {{\n  print({});\n  db.getCollection({name}).drop();\n}}",
            js(&format!("Collection {} already exists. Dropping it.", collection)),
        );
        self.guarded(&statement, &format!("drop {}", collection));
        Ok(DropOutcome::Scheduled)
    }

    fn create_collection(&mut self, collection: &str, validator: &NativeValidator) -> Result<(), ClientError> {
        self.print(&format!("✨ Creating collection: {}", collection));
        let options = serde_json::to_string_pretty(&validator.to_collection_options())
            .unwrap_or_else(|_| "{}".to_string());
        let name = js(&collection);
        let statement = format!("db.createCollection({}, {});\ncreated.add({});", name, options, name);
        self.guarded(&statement, &format!("createCollection {}", collection));
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

        let mut opts = serde_json::Map::new();
        if let Some(explicit) = &options.name {
            opts.insert("name".to_string(), json!(explicit));
        }
        if options.unique {
            opts.insert("unique".to_string(), json!(true));
        }

        let statement = if opts.is_empty() {
            format!("db.getCollection({}).createIndex({});", js(&collection), key)
        } else {
            format!(
                "db.getCollection({}).createIndex({}, {});",
                js(&collection),
                key,
                Value::Object(opts)
            )
        };
        self.guarded_if(
            &format!("created.has({})", js(&collection)),
            &statement,
            &format!("createIndex {} on {}", name, collection),
        );
        Ok(name)
    }

    fn shard_collection(
        &mut self,
        namespace: &str,
        key: &KeyPattern,
        initial_chunks: Option<NonZeroU32>,
    ) -> Result<(), ClientError> {
        self.print(&format!("🔑 Sharding {} on {}", namespace, key));
        let statement = match initial_chunks {
            Some(n) => format!(
                "sh.shardCollection({}, {}, false, {});",
                js(&namespace),
                key,
                json!({ "numInitialChunks": n.get() })
            ),
            None => format!("sh.shardCollection({}, {});", js(&namespace), key),
        };
        let statement = format!("{}\nsharded.add({});", statement, js(&namespace));
        let collection = self.collection_of(namespace);
        self.guarded_if(
            &format!("created.has({})", js(&collection)),
            &statement,
            &format!("shardCollection {}", namespace),
        );
        Ok(())
    }

    fn split_at(&mut self, namespace: &str, point: &SplitPoint) -> Result<(), ClientError> {
        let point = Value::Object(point.clone());
        self.guarded_if(
            &format!("sharded.has({})", js(&namespace)),
            &format!("sh.splitAt({}, {});", js(&namespace), point),
            &format!("splitAt {} on {}", point, namespace),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::KeyDirection;
    use chrono::TimeZone;
    use serde_json::Map;

    fn cluster() -> ScriptCluster {
        ScriptCluster::at("secret_santa", Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_header_and_footer() {
        let script = cluster().finish();
        assert!(script.contains("Generated by santa-schemas at 2024-12-01T00:00:00+00:00"));
        assert!(script.contains(r#"db = db.getSiblingDB("secret_santa");"#));
        assert!(script.trim_end().ends_with(r#"print("✅ Cluster initialization script finished.");"#));
    }

    #[test]
    fn test_drop_is_guarded() {
        let mut script = cluster();
        assert_eq!(script.drop_collection_if_exists("users").unwrap(), DropOutcome::Scheduled);
        assert!(script.body().contains(r#"if (db.getCollectionNames().includes("users")) {"#));
        assert!(script.body().contains(r#"db.getCollection("users").drop();"#));
    }

    #[test]
    fn test_shard_with_initial_chunks() {
        let mut script = cluster();
        let key = KeyPattern::single("_id", KeyDirection::Hashed);
        script
            .shard_collection("secret_santa.games", &key, NonZeroU32::new(4))
            .unwrap();
        assert!(script.body().contains(
            r#"sh.shardCollection("secret_santa.games", {"_id":"hashed"}, false, {"numInitialChunks":4});"#
        ));
    }

    #[test]
    fn test_split_and_index_statements_are_wrapped() {
        let mut script = cluster();
        let mut point = Map::new();
        point.insert("email".to_string(), json!("f"));
        script.split_at("secret_santa.users", &point).unwrap();

        let options = IndexOptions {
            unique: true,
            name: Some("users_unique_0".to_string()),
        };
        let name = script
            .create_index("users", &KeyPattern::single("login", KeyDirection::Ascending), &options)
            .unwrap();
        assert_eq!(name, "users_unique_0");

        let body = script.body();
        assert!(body.contains(r#"  sh.splitAt("secret_santa.users", {"email":"f"});"#));
        assert!(body.contains(
            r#"  db.getCollection("users").createIndex({"login":1}, {"name":"users_unique_0","unique":true});"#
        ));
        assert_eq!(body.matches("try {").count(), 2);
        assert_eq!(body.matches("} catch (e) {").count(), 2);
    }

    #[test]
    fn test_create_collection_embeds_validator() {
        let mut script = cluster();
        let validator = NativeValidator::from(json!({ "bsonType": "object", "required": ["name"] }));
        script.create_collection("widgets", &validator).unwrap();
        assert!(script.body().contains(r#"db.createCollection("widgets", {"#));
        assert!(script.body().contains(r#""$jsonSchema": {"#));
    }

    #[test]
    fn test_drop_and_create_cannot_abort_the_script() {
        let mut script = cluster();
        script.drop_collection_if_exists("users").unwrap();
        let validator = NativeValidator::from(json!({ "bsonType": "object", "required": [] }));
        script.create_collection("users", &validator).unwrap();

        let body = script.body();
        assert_eq!(body.matches("try {").count(), 2);
        let create = body.find(r#"db.createCollection("users""#).unwrap();
        let opening = body[..create].rfind("try {").unwrap();
        assert!(!body[opening..create].contains('}'));
        assert!(body.contains(r#"  created.add("users");"#));
        assert!(body.contains(r#"print(`⚠️  createCollection users failed: ${e.message}`);"#));
    }

    #[test]
    fn test_dependent_statements_wait_for_creation() {
        let mut script = cluster();
        let key = KeyPattern::single("email", KeyDirection::Ascending);
        script.create_index("users", &key, &IndexOptions::default()).unwrap();
        script.shard_collection("secret_santa.users", &key, None).unwrap();
        let mut point = Map::new();
        point.insert("email".to_string(), json!("m"));
        script.split_at("secret_santa.users", &point).unwrap();

        let body = script.body();
        assert_eq!(body.matches(r#"if (created.has("users")) {"#).count(), 2);
        assert!(body.contains(r#"if (sharded.has("secret_santa.users")) {"#));
        assert!(body.contains(r#"    sharded.add("secret_santa.users");"#));
        assert!(body.contains(r#"print("⏭️  splitAt {\"email\":\"m\"} on secret_santa.users skipped");"#));

        let script = script.finish();
        assert!(script.contains("const created = new Set();"));
        assert!(script.contains("const sharded = new Set();"));
    }
}

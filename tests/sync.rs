//! Synchronizer commands over a validator directory on disk

use std::fs;

use santa_schemas::sync::Side;
use santa_schemas::{SchemaRegistry, SchemaSynchronizer, ValidatorCatalog};
use serde_json::{json, Value};
use tempfile::tempdir;

fn synchronizer(dir: &std::path::Path) -> SchemaSynchronizer {
    let catalog = ValidatorCatalog::load_dir(dir, ".json").unwrap();
    SchemaSynchronizer::new(SchemaRegistry::builtin(), catalog, "secret_santa")
}

#[test]
fn test_missing_validator_dir_reports_every_entity() {
    let dir = tempdir().unwrap();
    let report = synchronizer(&dir.path().join("validators")).check();

    assert_eq!(report.findings.len(), 10);
    assert!(report.findings.iter().all(|f| f.missing_from == Side::Validator));
}

#[test]
fn test_removed_validator_is_one_finding() {
    let dir = tempdir().unwrap();
    synchronizer(dir.path()).export(dir.path()).unwrap();
    fs::remove_file(dir.path().join("Ticket.json")).unwrap();

    let report = synchronizer(dir.path()).check();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].entity, "ticket");
    assert_eq!(report.findings[0].missing_from, Side::Validator);
    assert!(report.changed.is_empty());
}

#[test]
fn test_orphan_validator_is_reported() {
    let dir = tempdir().unwrap();
    synchronizer(dir.path()).export(dir.path()).unwrap();
    fs::write(
        dir.path().join("Gift.json"),
        r#"{ "$jsonSchema": { "bsonType": "object", "required": [], "properties": {} } }"#,
    )
    .unwrap();

    let report = synchronizer(dir.path()).check();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].entity, "gift");
    assert_eq!(report.findings[0].missing_from, Side::Schema);
}

#[test]
fn test_edited_validator_is_changed() {
    let dir = tempdir().unwrap();
    synchronizer(dir.path()).export(dir.path()).unwrap();

    let path = dir.path().join("Wishlist.json");
    let mut validator: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    validator["properties"]
        .as_object_mut()
        .unwrap()
        .insert("legacyNotes".to_string(), json!({ "bsonType": "string" }));
    // Store it wrapped the way the store reports it
    fs::write(&path, json!({ "$jsonSchema": validator }).to_string()).unwrap();

    let report = synchronizer(dir.path()).check();
    assert!(report.findings.is_empty());
    assert_eq!(report.unchanged, 9);
    assert_eq!(report.changed.len(), 1);
    assert_eq!(report.changed[0].entity, "wishlist");
    assert_eq!(report.changed[0].changes, vec!["Property 'legacyNotes' only in validator".to_string()]);
}

#[test]
fn test_validate_flags_stale_defaults() {
    let dir = tempdir().unwrap();
    let results = synchronizer(dir.path()).validate();

    let players = results.iter().find(|r| r.entity == "player").unwrap();
    assert!(!players.valid);
    assert!(players
        .lint
        .errors
        .iter()
        .any(|e| e.code == "UNKNOWN_SHARD_FIELD" && e.message.contains("did you mean 'gameId'")));
}

#[test]
fn test_entity_keyed_by_file_stem_stays_in_sync_after_export() {
    let schemas = tempdir().unwrap();
    fs::write(
        schemas.path().join("Person.json"),
        r#"{ "entity": "Human", "fields": [ { "name": "name", "kind": "string", "required": true } ] }"#,
    )
    .unwrap();
    let validators = tempdir().unwrap();

    let load = || {
        let registry = SchemaRegistry::load_dir(schemas.path(), ".json").unwrap();
        let catalog = ValidatorCatalog::load_dir(validators.path(), ".json").unwrap();
        SchemaSynchronizer::new(registry, catalog, "secret_santa")
    };

    let written = load().export(validators.path()).unwrap();
    assert_eq!(written, vec![validators.path().join("Person.json")]);

    let sync = load();
    let report = sync.check();
    assert!(report.in_sync(), "{:?}", report);
    assert_eq!(report.unchanged, 1);
    assert_eq!(sync.validate()[0].collection, "persons");
}

//! Validator Compiler
//!
//! Translates an [`EntitySchema`] into the store's native `$jsonSchema`
//! validator. The translation is pure: the same schema always yields the
//! same document.
//!
//! | kind         | bsonType    |
//! |--------------|-------------|
//! | `string`     | `string`    |
//! | `number`     | `number`    |
//! | `boolean`    | `bool`      |
//! | `date`       | `date`      |
//! | `identifier` | `objectId`  |
//! | `object`     | `object` + nested `properties` |
//! | `array`      | `array` + `items` |
//! | unknown      | `string` (permissive) or error (strict) |

use std::convert::Infallible;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, SchemaError};
use crate::schema::{required_names, EntitySchema, FieldKind, TypeSpec};

/// What to do with a field kind the compiler does not recognise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownKindPolicy {
    /// Compile to the loosest type (`string`) and keep going
    #[default]
    Permissive,
    /// Refuse to compile
    Strict,
}

/// A compiled `$jsonSchema` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeValidator(Value);

impl NativeValidator {
    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }

    /// Top-level `required` list
    pub fn required(&self) -> Vec<&str> {
        self.0
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.0.get("properties").and_then(|p| p.get(name))
    }

    /// The `{ validator: { $jsonSchema: ... } }` options document for collection creation
    pub fn to_collection_options(&self) -> Value {
        json!({ "validator": { "$jsonSchema": self.0 } })
    }
}

impl From<Value> for NativeValidator {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Compiles entity schemas to native validators
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorCompiler {
    policy: UnknownKindPolicy,
}

impl ValidatorCompiler {
    pub fn new(policy: UnknownKindPolicy) -> Self {
        Self { policy }
    }

    pub fn compile(&self, schema: &EntitySchema) -> Result<NativeValidator> {
        match self.policy {
            UnknownKindPolicy::Permissive => permissive(schema).map_err(|never| match never {}),
            UnknownKindPolicy::Strict => build(schema, &|path: &str, kind: &str| -> Result<()> {
                Err(SchemaError::UnknownKind {
                    field: path.to_string(),
                    kind: kind.to_string(),
                })
            }),
        }
    }
}

/// Called for each field of unknown kind; `Ok` compiles it as `string`
type UnknownKind<'a, E> = &'a dyn Fn(&str, &str) -> std::result::Result<(), E>;

fn permissive(schema: &EntitySchema) -> std::result::Result<NativeValidator, Infallible> {
    build(schema, &|path: &str, kind: &str| -> std::result::Result<(), Infallible> {
        tracing::warn!(field = path, kind = %kind, "unknown field kind, compiling as string");
        Ok(())
    })
}

fn build<E>(schema: &EntitySchema, on_unknown: UnknownKind<'_, E>) -> std::result::Result<NativeValidator, E> {
    let mut properties = Map::new();
    if schema.field("_id").is_none() {
        properties.insert("_id".to_string(), json!({ "bsonType": "objectId" }));
    }
    for field in &schema.fields {
        properties.insert(field.name.clone(), compile_type(&field.name, &field.ty, on_unknown)?);
    }

    let required: Vec<&str> = schema
        .required_field_names()
        .into_iter()
        .filter(|name| *name != "_id")
        .collect();

    Ok(NativeValidator(json!({
        "bsonType": "object",
        "required": required,
        "properties": properties,
    })))
}

fn compile_type<E>(path: &str, ty: &TypeSpec, on_unknown: UnknownKind<'_, E>) -> std::result::Result<Value, E> {
    let mut out = Map::new();

    match &ty.kind {
        FieldKind::String => {
            out.insert("bsonType".into(), "string".into());
            if let Some(values) = &ty.enum_values {
                out.insert("enum".into(), json!(values));
            }
        }
        FieldKind::Number => {
            out.insert("bsonType".into(), "number".into());
        }
        FieldKind::Boolean => {
            out.insert("bsonType".into(), "bool".into());
        }
        FieldKind::Date => {
            out.insert("bsonType".into(), "date".into());
        }
        FieldKind::Identifier => {
            out.insert("bsonType".into(), "objectId".into());
        }
        FieldKind::Object => {
            out.insert("bsonType".into(), "object".into());
            if let Some(fields) = ty.fields.as_deref().filter(|f| !f.is_empty()) {
                let required = required_names(fields);
                if !required.is_empty() {
                    out.insert("required".into(), json!(required));
                }
                let mut properties = Map::new();
                for nested in fields {
                    let nested_path = format!("{}.{}", path, nested.name);
                    properties.insert(nested.name.clone(), compile_type(&nested_path, &nested.ty, on_unknown)?);
                }
                out.insert("properties".into(), Value::Object(properties));
            }
        }
        FieldKind::Array => {
            out.insert("bsonType".into(), "array".into());
            if let Some(element) = &ty.items {
                out.insert("items".into(), compile_type(path, element, on_unknown)?);
            }
        }
        FieldKind::Unknown(kind) => {
            on_unknown(path, kind)?;
            out.insert("bsonType".into(), "string".into());
        }
    }

    Ok(Value::Object(out))
}

/// Compile with the default (permissive) policy
pub fn compile(schema: &EntitySchema) -> NativeValidator {
    match permissive(schema) {
        Ok(validator) => validator,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn game() -> EntitySchema {
        EntitySchema::new(
            "Game",
            vec![
                FieldSpec::new("name", FieldKind::String).required(),
                FieldSpec::new("status", FieldKind::String).with_enum(["draft", "active", "ended"]),
                FieldSpec::new("creatorId", FieldKind::Identifier).required(),
                FieldSpec::typed(
                    "settings",
                    TypeSpec::object(vec![
                        FieldSpec::new("anonymous", FieldKind::Boolean),
                        FieldSpec::new("maxParticipants", FieldKind::Number).required(),
                    ]),
                ),
                FieldSpec::typed("participants", TypeSpec::array_of(TypeSpec::new(FieldKind::Identifier))),
                FieldSpec::new("createdAt", FieldKind::Date),
            ],
        )
    }

    #[test]
    fn test_compile_game() {
        let validator = compile(&game());
        assert_eq!(
            validator.as_json(),
            &json!({
                "bsonType": "object",
                "required": ["name", "creatorId"],
                "properties": {
                    "_id": { "bsonType": "objectId" },
                    "name": { "bsonType": "string" },
                    "status": { "bsonType": "string", "enum": ["draft", "active", "ended"] },
                    "creatorId": { "bsonType": "objectId" },
                    "settings": {
                        "bsonType": "object",
                        "required": ["maxParticipants"],
                        "properties": {
                            "anonymous": { "bsonType": "bool" },
                            "maxParticipants": { "bsonType": "number" }
                        }
                    },
                    "participants": { "bsonType": "array", "items": { "bsonType": "objectId" } },
                    "createdAt": { "bsonType": "date" }
                }
            })
        );
    }

    #[test]
    fn test_enum_order_is_preserved() {
        let values = ["system_alert", "game_invite", "new_message", "game_start"];
        let schema = EntitySchema::new(
            "Notification",
            vec![FieldSpec::new("type", FieldKind::String).with_enum(values)],
        );
        let validator = compile(&schema);
        let compiled: Vec<&str> = validator.property("type").unwrap()["enum"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(compiled, values);
    }

    #[test]
    fn test_required_matches_declared() {
        let schema = EntitySchema::new(
            "Ticket",
            vec![
                FieldSpec::new("subject", FieldKind::String).required(),
                FieldSpec::new("message", FieldKind::String).required(),
                FieldSpec::new("subject", FieldKind::String).required(),
                FieldSpec::new("userId", FieldKind::Identifier),
            ],
        );
        assert_eq!(compile(&schema).required(), vec!["subject", "message"]);
    }

    #[test]
    fn test_required_is_present_when_empty() {
        let schema = EntitySchema::new("Log", vec![FieldSpec::new("timestamp", FieldKind::Date)]);
        assert_eq!(compile(&schema).as_json()["required"], json!([]));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let schema = game();
        assert_eq!(compile(&schema), compile(&schema));
    }

    #[test]
    fn test_array_of_objects() {
        let schema = EntitySchema::new(
            "Wishlist",
            vec![FieldSpec::typed(
                "items",
                TypeSpec::array_of(TypeSpec::object(vec![
                    FieldSpec::new("name", FieldKind::String).required(),
                    FieldSpec::new("url", FieldKind::String),
                ])),
            )],
        );
        assert_eq!(
            compile(&schema).property("items").unwrap(),
            &json!({
                "bsonType": "array",
                "items": {
                    "bsonType": "object",
                    "required": ["name"],
                    "properties": {
                        "name": { "bsonType": "string" },
                        "url": { "bsonType": "string" }
                    }
                }
            })
        );
    }

    #[test]
    fn test_opaque_object() {
        let schema = EntitySchema::new(
            "Log",
            vec![FieldSpec::typed("details", TypeSpec::object(vec![]))],
        );
        assert_eq!(compile(&schema).property("details").unwrap(), &json!({ "bsonType": "object" }));
    }

    #[test]
    fn test_unknown_kind_policies() {
        let schema = EntitySchema::new(
            "Odd",
            vec![FieldSpec::new("price", FieldKind::Unknown("Decimal128".into()))],
        );
        assert_eq!(compile(&schema).property("price").unwrap(), &json!({ "bsonType": "string" }));

        let permissive = ValidatorCompiler::new(UnknownKindPolicy::Permissive).compile(&schema);
        assert_eq!(permissive.unwrap(), compile(&schema));

        let strict = ValidatorCompiler::new(UnknownKindPolicy::Strict).compile(&schema);
        assert!(matches!(strict, Err(SchemaError::UnknownKind { field, .. }) if field == "price"));
    }

    #[test]
    fn test_declared_id_is_not_duplicated_or_required() {
        let schema = EntitySchema::new(
            "Custom",
            vec![FieldSpec::new("_id", FieldKind::String).required()],
        );
        let validator = compile(&schema);
        assert_eq!(validator.property("_id").unwrap(), &json!({ "bsonType": "string" }));
        assert!(validator.required().is_empty());
    }
}

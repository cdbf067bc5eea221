//! Entity schema types and the JSON source format
//!
//! An entity schema file looks like:
//!
//! ```json
//! {
//!   "entity": "Wishlist",
//!   "fields": [
//!     { "name": "userId", "kind": "identifier", "required": true },
//!     { "name": "items", "kind": "array",
//!       "items": { "kind": "object", "fields": [
//!         { "name": "name", "kind": "string", "required": true }
//!       ] } }
//!   ]
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// Kind of a field as declared in the entity source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Identifier,
    Object,
    Array,
    /// Anything the loader did not recognise. Kept verbatim so the compiler
    /// and the linter can report it.
    Unknown(String),
}

impl FieldKind {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Identifier => "identifier",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Unknown(raw) => raw,
        }
    }

    /// Primitive kinds carry no nested structure
    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldKind::Object | FieldKind::Array)
    }
}

impl From<String> for FieldKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "string" | "String" => FieldKind::String,
            "number" | "Number" => FieldKind::Number,
            "boolean" | "bool" | "Boolean" => FieldKind::Boolean,
            "date" | "Date" => FieldKind::Date,
            "identifier" | "objectId" | "ObjectId" | "ObjectID" => FieldKind::Identifier,
            "object" | "Object" | "Embedded" => FieldKind::Object,
            "array" | "Array" => FieldKind::Array,
            _ => FieldKind::Unknown(raw),
        }
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type descriptor shared by fields and array elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    pub kind: FieldKind,

    /// Allowed literal values (string kinds only)
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    /// Nested fields of an object. `None` means an opaque object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldSpec>>,

    /// Element type of an array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeSpec>>,
}

impl TypeSpec {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            enum_values: None,
            fields: None,
            items: None,
        }
    }

    /// An object with the given nested fields
    pub fn object(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields: Some(fields),
            ..Self::new(FieldKind::Object)
        }
    }

    /// An array whose elements are described by `element`
    pub fn array_of(element: TypeSpec) -> Self {
        Self {
            items: Some(Box::new(element)),
            ..Self::new(FieldKind::Array)
        }
    }
}

/// A single field of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,

    #[serde(flatten)]
    pub ty: TypeSpec,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self::typed(name, TypeSpec::new(kind))
    }

    pub fn typed(name: impl Into<String>, ty: TypeSpec) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ty.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.ty.kind
    }
}

/// On-disk shape of an entity source file
#[derive(Debug, Deserialize)]
struct EntitySource {
    #[serde(default)]
    entity: Option<String>,
    fields: Vec<FieldSpec>,
}

/// Schema of one persisted entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySchema {
    /// Display name, e.g. "DirectMessage"
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldSpec>,
    /// Stem of the source file, e.g. "DirectMessage" for `DirectMessage.json`
    #[serde(skip)]
    source: String,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            name,
            fields,
        }
    }

    /// Set the source stem the entity is keyed and exported by
    pub fn with_source(mut self, stem: impl Into<String>) -> Self {
        self.source = stem.into();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parse an entity source document. `stem` is the source file stem: it
    /// keys the entity, and names it when the document carries no `entity`.
    pub fn from_json(content: &str, stem: &str) -> Result<Self> {
        let source: EntitySource = serde_json::from_str(content)?;
        let name = source
            .entity
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| stem.to_string());

        if name.trim().is_empty() {
            return Err(SchemaError::InvalidFormat(
                "entity source has no name".to_string(),
            ));
        }

        let stem = if stem.trim().is_empty() { name.clone() } else { stem.to_string() };
        Ok(Self::new(name, source.fields).with_source(stem))
    }

    /// Registry key: the lower-cased source stem, which may differ from
    /// the display name
    pub fn key(&self) -> String {
        self.source.to_lowercase()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of required top-level fields, in declaration order, without duplicates
    pub fn required_field_names(&self) -> Vec<&str> {
        required_names(&self.fields)
    }

    /// Every addressable dotted path, e.g. `settings.anonymous` or
    /// `items.name` for an array of objects
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths = vec!["_id".to_string()];
        collect_paths(&self.fields, "", &mut paths);
        paths.dedup();
        paths
    }

    /// Resolve a dotted path to its type. `_id` always resolves.
    pub fn resolve_path(&self, path: &str) -> Option<PathTarget<'_>> {
        if path == "_id" {
            return Some(PathTarget::ImplicitId);
        }

        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut ty = &self.fields.iter().find(|f| f.name == first)?.ty;

        for segment in segments {
            // Dotted paths step through arrays into their elements
            while ty.kind == FieldKind::Array {
                ty = ty.items.as_deref()?;
            }
            let nested = ty.fields.as_ref()?;
            ty = &nested.iter().find(|f| f.name == segment)?.ty;
        }

        Some(PathTarget::Declared(ty))
    }
}

/// Result of resolving a field path against an entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathTarget<'a> {
    /// The store-assigned `_id`, present on every document
    ImplicitId,
    Declared(&'a TypeSpec),
}

pub(crate) fn required_names(fields: &[FieldSpec]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for field in fields.iter().filter(|f| f.required) {
        if !names.contains(&field.name.as_str()) {
            names.push(&field.name);
        }
    }
    names
}

fn collect_paths(fields: &[FieldSpec], prefix: &str, out: &mut Vec<String>) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{}.{}", prefix, field.name)
        };

        let mut ty = &field.ty;
        while let (FieldKind::Array, Some(element)) = (&ty.kind, ty.items.as_deref()) {
            ty = element;
        }
        if !out.contains(&path) {
            out.push(path.clone());
        }
        if let Some(nested) = &ty.fields {
            collect_paths(nested, &path, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wishlist() -> EntitySchema {
        EntitySchema::from_json(
            r#"{
                "entity": "Wishlist",
                "fields": [
                    { "name": "userId", "kind": "objectId", "required": true },
                    { "name": "items", "kind": "array", "items": {
                        "kind": "object",
                        "fields": [
                            { "name": "name", "kind": "string", "required": true },
                            { "name": "url", "kind": "string" }
                        ]
                    } }
                ]
            }"#,
            "wishlist",
        )
        .unwrap()
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!(FieldKind::from("ObjectID".to_string()), FieldKind::Identifier);
        assert_eq!(FieldKind::from("bool".to_string()), FieldKind::Boolean);
        assert_eq!(FieldKind::from("Embedded".to_string()), FieldKind::Object);
        assert_eq!(
            FieldKind::from("Decimal128".to_string()),
            FieldKind::Unknown("Decimal128".to_string())
        );
    }

    #[test]
    fn test_parse_entity_source() {
        let schema = wishlist();
        assert_eq!(schema.name, "Wishlist");
        assert_eq!(schema.key(), "wishlist");
        assert_eq!(schema.required_field_names(), vec!["userId"]);

        let items = schema.field("items").unwrap();
        let element = items.ty.items.as_deref().unwrap();
        assert_eq!(element.kind, FieldKind::Object);
        assert_eq!(element.fields.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_fallback_name() {
        let schema = EntitySchema::from_json(r#"{ "fields": [] }"#, "Pair").unwrap();
        assert_eq!(schema.name, "Pair");
    }

    #[test]
    fn test_key_follows_source_stem() {
        let schema = EntitySchema::from_json(r#"{ "entity": "Human", "fields": [] }"#, "Person").unwrap();
        assert_eq!(schema.name, "Human");
        assert_eq!(schema.source(), "Person");
        assert_eq!(schema.key(), "person");
    }

    #[test]
    fn test_required_names_are_deduplicated() {
        let schema = EntitySchema::new(
            "Dup",
            vec![
                FieldSpec::new("a", FieldKind::String).required(),
                FieldSpec::new("a", FieldKind::String).required(),
                FieldSpec::new("b", FieldKind::Number),
            ],
        );
        assert_eq!(schema.required_field_names(), vec!["a"]);
    }

    #[test]
    fn test_field_paths_and_resolution() {
        let schema = wishlist();
        assert_eq!(
            schema.field_paths(),
            vec!["_id", "userId", "items", "items.name", "items.url"]
        );
        assert_eq!(schema.resolve_path("_id"), Some(PathTarget::ImplicitId));
        assert!(matches!(
            schema.resolve_path("items.name"),
            Some(PathTarget::Declared(ty)) if ty.kind == FieldKind::String
        ));
        assert!(schema.resolve_path("items.price").is_none());
        assert!(schema.resolve_path("user").is_none());
    }

    #[test]
    fn test_serialize_round_trips_source_keys() {
        let field = FieldSpec::new("role", FieldKind::String)
            .with_enum(["admin", "regular"])
            .with_default(json!("regular"));
        let value = serde_json::to_value(&field).unwrap();
        assert_eq!(
            value,
            json!({ "name": "role", "kind": "string", "enum": ["admin", "regular"], "default": "regular" })
        );
    }
}

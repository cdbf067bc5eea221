//! Secret Santa Schemas
//!
//! Entity schemas, native validators and the sharded cluster layout for the
//! Secret Santa document store.
//!
//! ## Features
//!
//! - **Single Source**: entity schemas are declared once; native `$jsonSchema`
//!   validators are compiled from them and exported
//! - **Sharded Provisioning**: collections are created with validators, shard
//!   keys, pre-split chunks and indexes, best-effort per operation
//! - **Drift Detection**: exported validators are compared against what the
//!   schemas compile to
//! - **Lint**: shard keys, indexes and split points must name real fields
//!
//! ## Architecture
//!
//! ```text
//! schemas/*.json ──► SchemaRegistry ──► CollectionPlanner ──► CollectionConfig
//!                          │                                         │
//!                          ▼                                         ▼
//!                  ValidatorCompiler ◄───────────────────────── Provisioner
//!                          │                                         │
//!                          ▼                                         ▼
//!               validators/*.json (export)            ClusterClient (memory | mongosh script)
//! ```

pub mod client;
pub mod collection;
pub mod compiler;
pub mod config;
pub mod defaults;
pub mod error;
pub mod initializer;
pub mod lint;
pub mod provision;
pub mod registry;
pub mod schema;
pub mod sync;

pub use client::{ClusterClient, MemoryCluster, ScriptCluster};
pub use collection::{CollectionConfig, IndexSpec, KeyDirection, KeyPattern, Presplit, ShardStrategy};
pub use compiler::{compile, NativeValidator, UnknownKindPolicy, ValidatorCompiler};
pub use config::SantaConfig;
pub use defaults::CollectionPlanner;
pub use error::{ClientError, Result, SchemaError};
pub use initializer::{ClusterInitializer, Summary};
pub use lint::{LintResult, SchemaLinter};
pub use provision::{ProvisionReport, Provisioner};
pub use registry::{SchemaRegistry, ValidatorCatalog};
pub use schema::{EntitySchema, FieldKind, FieldSpec, TypeSpec};
pub use sync::{DriftFinding, DriftReport, SchemaSynchronizer};

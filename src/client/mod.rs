//! Database boundary
//!
//! The provisioner talks to the cluster only through [`ClusterClient`].
//! Two backends ship with the crate:
//!
//! - [`MemoryCluster`]: an in-process cluster model, used for dry runs and tests
//! - [`ScriptCluster`]: renders every call as a mongosh statement, producing
//!   an initialization script to run against the router

pub mod memory;
pub mod script;

use std::num::NonZeroU32;

use crate::collection::{KeyPattern, SplitPoint};
use crate::compiler::NativeValidator;
use crate::error::ClientError;

pub use memory::{Call, MemoryCluster};
pub use script::ScriptCluster;

/// Outcome of a drop-if-exists request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    Absent,
    /// The backend does not execute immediately; the drop is guarded on existence
    Scheduled,
}

/// Options for index creation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    pub unique: bool,
    pub name: Option<String>,
}

/// Operations the provisioner needs from a sharded cluster.
///
/// Calls are synchronous and issued one at a time; each must be
/// acknowledged before the next is made.
pub trait ClusterClient {
    fn enable_sharding(&mut self, database: &str) -> Result<(), ClientError>;

    fn drop_collection_if_exists(&mut self, collection: &str) -> Result<DropOutcome, ClientError>;

    fn create_collection(&mut self, collection: &str, validator: &NativeValidator) -> Result<(), ClientError>;

    /// Returns the name of the created index
    fn create_index(
        &mut self,
        collection: &str,
        key: &KeyPattern,
        options: &IndexOptions,
    ) -> Result<String, ClientError>;

    fn shard_collection(
        &mut self,
        namespace: &str,
        key: &KeyPattern,
        initial_chunks: Option<NonZeroU32>,
    ) -> Result<(), ClientError>;

    fn split_at(&mut self, namespace: &str, point: &SplitPoint) -> Result<(), ClientError>;
}

/// `database.collection`
pub fn namespace(database: &str, collection: &str) -> String {
    format!("{}.{}", database, collection)
}

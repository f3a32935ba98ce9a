// Copyright 2026 Maurice S. Barnum
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The document store as seen by the harness.
//!
//! Everything the benchmark needs from a clustered document store is expressed by the two
//! traits here.  [`Store`] knows the cluster topology and opens connections; [`Connection`]
//! runs commands against one endpoint.  Implementations decide what "endpoint" means: the
//! harness only relies on [`Store::primary_endpoint`] accepting writes and administrative
//! commands, and on [`Store::resolve_endpoints`] listing one direct read endpoint per node.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bon::Builder;
use serde_json::Value;

use crate::Result;

mod eval;
pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type Document = serde_json::Map<String, Value>;

/// One operation of an atomic update.  A slice of these is applied in order, as a unit,
/// against the single document matched by the update's filter.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateOp {
    /// Replace (or create) a top-level field
    Set { field: String, value: Value },
    /// Append to a top-level array field, creating it if absent
    Push { field: String, value: Value },
    /// Set `field` to the mean of `key` across the elements of the array `of`, as it is
    /// after the preceding operations in the same update
    Average {
        field: String,
        of: String,
        key: String,
    },
}

impl UpdateOp {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateOp::Set {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn push(field: impl Into<String>, value: impl Into<Value>) -> Self {
        UpdateOp::Push {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn average(field: impl Into<String>, of: impl Into<String>, key: impl Into<String>) -> Self {
        UpdateOp::Average {
            field: field.into(),
            of: of.into(),
            key: key.into(),
        }
    }
}

#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(on(String, into))]
pub struct IndexSpec {
    /// Ascending key paths, in index order
    pub keys: Vec<String>,
    /// Defaults to the store's conventional `path_1[_path_1...]` naming
    pub name: Option<String>,
    #[builder(default = false)]
    pub hidden: bool,
}

impl IndexSpec {
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| index_name(self.keys.iter().map(String::as_str)))
    }
}

/// Conventional name of an ascending index over `keys`
pub fn index_name<'a>(keys: impl IntoIterator<Item = &'a str>) -> String {
    keys.into_iter()
        .map(|k| format!("{k}_1"))
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Builder, Clone, Debug)]
#[builder(on(String, into))]
pub struct ExplainRequest {
    pub collection: String,
    pub pipeline: Vec<Value>,
    #[builder(default = Verbosity::ExecutionStats)]
    pub verbosity: Verbosity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verbosity {
    QueryPlanner,
    ExecutionStats,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::QueryPlanner => write!(f, "queryPlanner"),
            Verbosity::ExecutionStats => write!(f, "executionStats"),
        }
    }
}

#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    fn endpoint(&self) -> &str;

    /// Insert `documents`.  On failure the error reports how many were written.
    async fn bulk_insert(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ordered: bool,
    ) -> Result<usize>;

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()>;

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>>;

    async fn scan(&self, collection: &str, filter: &Document) -> Result<Vec<Document>>;

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>>;

    /// Apply `update` to the one document matching `filter`, atomically with respect to every
    /// other update of that document.  Fails with a write error if nothing matches.
    async fn atomic_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &[UpdateOp],
    ) -> Result<()>;

    /// Returns the name of the created index
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<String>;

    async fn set_index_visibility(&self, collection: &str, index: &str, hidden: bool)
    -> Result<()>;

    async fn drop_collection(&self, collection: &str) -> Result<()>;

    async fn run_diagnostic(&self, request: &ExplainRequest) -> Result<Document>;
}

#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Endpoint that routes to the cluster as a whole
    fn primary_endpoint(&self) -> &str;

    /// One direct read endpoint per cluster member
    async fn resolve_endpoints(&self) -> Result<Vec<String>>;

    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Connection>>;
}

/// Build a filter document from `(path, value)` pairs
pub fn filter<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Document
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

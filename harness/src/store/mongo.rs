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

//! A [`Store`] backed by a MongoDB replica set.
//!
//! The cluster endpoint is the configured connection string and routes writes and
//! administrative commands to the primary.  Node endpoints are one `directConnection=true`
//! string per member of the seed list; for `mongodb+srv://` strings the seed list is the
//! result of the SRV lookup done while parsing.  Credentials and TLS settings of the
//! connection string carry over to every node connection and never appear in endpoint names.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Client;
use mongodb::Database;
use mongodb::IndexModel;
use mongodb::bson;
use mongodb::bson::Bson;
use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::Acknowledgment;
use mongodb::options::ClientOptions;
use mongodb::options::CollectionOptions;
use mongodb::options::IndexOptions;
use mongodb::options::ServerAddress;
use mongodb::options::WriteConcern;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::info;

use super::Connection;
use super::Document;
use super::ExplainRequest;
use super::IndexSpec;
use super::Store;
use super::UpdateOp;
use crate::Error;
use crate::Result;

const APP_NAME: &str = "pipebench";

/// Connection string of a single member, bypassing topology discovery
pub fn direct_endpoint(addr: &ServerAddress) -> String {
    format!("mongodb://{addr}/?directConnection=true")
}

/// `scheme://hosts` of a connection string, without credentials, database or options
fn redact(uri: &str) -> String {
    let (scheme, rest) = uri.split_once("://").unwrap_or(("mongodb", uri));
    let hosts = rest.split(['/', '?']).next().unwrap_or(rest);
    let hosts = hosts.rsplit_once('@').map_or(hosts, |(_, h)| h);
    format!("{scheme}://{hosts}")
}

/// Bulk loads only wait for the member that took the write
fn load_write_concern() -> WriteConcern {
    WriteConcern::builder().w(Acknowledgment::Nodes(1)).build()
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<bson::Document> {
    bson::to_document(value).map_err(|e| Error::Custom(format!("cannot encode as BSON: {e}")))
}

fn decode(doc: bson::Document) -> Document {
    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(m) => m,
        // a BSON document always converts to a JSON object
        _ => Document::new(),
    }
}

/// Express `update` as an update pipeline so the whole list applies as one write
fn update_pipeline(update: &[UpdateOp]) -> Vec<Value> {
    update
        .iter()
        .map(|op| match op {
            UpdateOp::Set { field, value } => {
                json!({"$set": {field.clone(): {"$literal": value}}})
            }
            UpdateOp::Push { field, value } => json!({"$set": {field.clone(): {
                "$concatArrays": [{"$ifNull": [format!("${field}"), []]}, [{"$literal": value}]]
            }}}),
            UpdateOp::Average { field, of, key } => {
                json!({"$set": {field.clone(): {"$avg": format!("${of}.{key}")}}})
            }
        })
        .collect()
}

mod inner {
    use super::{ClientOptions, ServerAddress};

    #[derive(Debug)]
    pub(super) struct Inner {
        pub(super) options: ClientOptions,
        pub(super) database: String,
        pub(super) cluster: String,
        pub(super) nodes: Vec<(String, ServerAddress)>,
    }
} // mod inner

#[derive(Clone, Debug)]
pub struct MongoStore {
    inner: Arc<inner::Inner>,
}

impl MongoStore {
    /// Parse `uri`, resolving SRV records if it is a `mongodb+srv://` string.  Nothing is
    /// connected until [`Store::connect`].
    pub async fn new(uri: &str, database: impl Into<String>) -> Result<Self> {
        let cluster = redact(uri);
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|e| Error::connection(cluster.as_str(), e.to_string()))?;
        options.app_name = Some(APP_NAME.to_string());
        let nodes = options
            .hosts
            .iter()
            .map(|addr| (direct_endpoint(addr), addr.clone()))
            .collect::<Vec<_>>();
        info!(cluster, nodes = nodes.len(), "store resolved");
        Ok(Self {
            inner: Arc::new(inner::Inner {
                options,
                database: database.into(),
                cluster,
                nodes,
            }),
        })
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    fn options_for(&self, endpoint: &str) -> Result<ClientOptions> {
        if endpoint == self.inner.cluster {
            return Ok(self.inner.options.clone());
        }
        let Some((_, addr)) = self.inner.nodes.iter().find(|(e, _)| e == endpoint) else {
            return Err(Error::connection(endpoint, "not a member of the cluster"));
        };
        let mut options = self.inner.options.clone();
        options.hosts = vec![addr.clone()];
        options.direct_connection = Some(true);
        options.repl_set_name = None;
        Ok(options)
    }
}

#[async_trait]
impl Store for MongoStore {
    fn primary_endpoint(&self) -> &str {
        &self.inner.cluster
    }

    async fn resolve_endpoints(&self) -> Result<Vec<String>> {
        Ok(self.inner.nodes.iter().map(|(e, _)| e.clone()).collect())
    }

    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Connection>> {
        let options = self.options_for(endpoint)?;
        let client =
            Client::with_options(options).map_err(|e| Error::connection(endpoint, e.to_string()))?;
        client
            .database("admin")
            .run_command(doc! {"ping": 1})
            .await
            .map_err(|e| Error::connection(endpoint, e.to_string()))?;
        debug!(endpoint, "connected");
        Ok(Arc::new(MongoConnection {
            endpoint: endpoint.to_string(),
            db: client.database(&self.inner.database),
        }))
    }
}

#[derive(Debug)]
pub struct MongoConnection {
    endpoint: String,
    db: Database,
}

impl MongoConnection {
    fn collection(&self, name: &str) -> mongodb::Collection<bson::Document> {
        self.db.collection(name)
    }
}

#[async_trait]
impl Connection for MongoConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn bulk_insert(
        &self,
        collection: &str,
        documents: Vec<Document>,
        ordered: bool,
    ) -> Result<usize> {
        let attempted = documents.len();
        if attempted == 0 {
            return Ok(0);
        }
        let docs = documents
            .iter()
            .map(encode)
            .collect::<Result<Vec<_>>>()?;
        let options = CollectionOptions::builder()
            .write_concern(load_write_concern())
            .build();
        let r = self
            .db
            .collection_with_options::<bson::Document>(collection, options)
            .insert_many(docs)
            .ordered(ordered)
            .await;
        match r {
            Ok(r) => Ok(r.inserted_ids.len()),
            Err(e) => {
                let inserted = match e.kind.as_ref() {
                    ErrorKind::InsertMany(failure) => {
                        let errors = failure.write_errors.as_deref().unwrap_or_default();
                        if ordered {
                            errors.first().map_or(0, |w| w.index)
                        } else {
                            attempted.saturating_sub(errors.len())
                        }
                    }
                    _ => 0,
                };
                Err(Error::write(collection, inserted, e.to_string()))
            }
        }
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.collection(collection)
            .insert_one(encode(&document)?)
            .await
            .map_err(|e| Error::write(collection, 0, e.to_string()))?;
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>> {
        let found = self
            .collection(collection)
            .find_one(encode(filter)?)
            .await
            .map_err(|e| Error::query(collection, e.to_string()))?;
        Ok(found.map(decode))
    }

    async fn scan(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        let query = |e: mongodb::error::Error| Error::query(collection, e.to_string());
        let docs: Vec<bson::Document> = self
            .collection(collection)
            .find(encode(filter)?)
            .await
            .map_err(query)?
            .try_collect()
            .await
            .map_err(query)?;
        Ok(docs.into_iter().map(decode).collect())
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>> {
        let query = |e: mongodb::error::Error| Error::query(collection, e.to_string());
        let stages = pipeline.iter().map(encode).collect::<Result<Vec<_>>>()?;
        let docs: Vec<bson::Document> = self
            .collection(collection)
            .aggregate(stages)
            .await
            .map_err(query)?
            .try_collect()
            .await
            .map_err(query)?;
        Ok(docs.into_iter().map(decode).collect())
    }

    async fn atomic_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &[UpdateOp],
    ) -> Result<()> {
        let stages = update_pipeline(update)
            .iter()
            .map(encode)
            .collect::<Result<Vec<_>>>()?;
        let r = self
            .collection(collection)
            .update_one(encode(filter)?, stages)
            .await
            .map_err(|e| Error::query(collection, e.to_string()))?;
        if r.matched_count == 0 {
            return Err(Error::write(collection, 0, "no document matches filter"));
        }
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<String> {
        let mut keys = bson::Document::new();
        for k in &index.keys {
            keys.insert(k.as_str(), 1_i32);
        }
        let model = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(index.name())
                    .hidden(index.hidden)
                    .build(),
            )
            .build();
        let r = self
            .collection(collection)
            .create_index(model)
            .await
            .map_err(|e| Error::admin(format!("create index on {collection}: {e}")))?;
        Ok(r.index_name)
    }

    async fn set_index_visibility(
        &self,
        collection: &str,
        index: &str,
        hidden: bool,
    ) -> Result<()> {
        self.db
            .run_command(doc! {
                "collMod": collection,
                "index": {"name": index, "hidden": hidden},
            })
            .await
            .map_err(|e| Error::admin(format!("collMod {collection} index {index}: {e}")))?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.collection(collection)
            .drop()
            .await
            .map_err(|e| Error::admin(format!("drop {collection}: {e}")))
    }

    async fn run_diagnostic(&self, request: &ExplainRequest) -> Result<Document> {
        let collection = request.collection.as_str();
        let stages = request
            .pipeline
            .iter()
            .map(encode)
            .collect::<Result<Vec<_>>>()?;
        let plan = self
            .db
            .run_command(doc! {
                "explain": {"aggregate": collection, "pipeline": stages, "cursor": {}},
                "verbosity": request.verbosity.to_string(),
            })
            .await
            .map_err(|e| Error::query(collection, e.to_string()))?;
        Ok(decode(plan))
    }
}

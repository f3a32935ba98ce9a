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

//! An in-process [`Store`] simulating a small replicated cluster.
//!
//! Every node endpoint and the primary endpoint see the same dataset.  Connections count
//! themselves per endpoint so callers can verify how load was spread, and a few faults can be
//! switched on to exercise error paths.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use super::Connection;
use super::Document;
use super::ExplainRequest;
use super::IndexSpec;
use super::Store;
use super::UpdateOp;
use super::Verbosity;
use super::eval;
use crate::Error;
use crate::Result;

pub const PRIMARY_ENDPOINT: &str = "memory://cluster";

pub fn node_endpoint(i: usize) -> String {
    format!("memory://node-{i}")
}

/// A read served by a [`MemoryStore`] connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Scan,
    Aggregate,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Access {
    pub endpoint: String,
    pub kind: AccessKind,
    pub collection: String,
}

/// Failures to inject.  All off by default.
#[derive(Clone, Debug, Default)]
pub struct Faults {
    /// Every `connect` fails
    pub refuse_connections: bool,
    /// Aggregations beyond this many (counted across all connections) fail
    pub fail_aggregates_after: Option<usize>,
    /// Bulk inserts into these collections write half of their documents and then fail
    pub reject_inserts: HashSet<String>,
}

mod inner {
    use super::*;

    #[derive(Debug)]
    pub(super) struct Index {
        pub(super) name: String,
        pub(super) keys: Vec<String>,
        pub(super) hidden: bool,
    }

    #[derive(Debug, Default)]
    pub(super) struct Collection {
        pub(super) docs: Vec<Document>,
        pub(super) indexes: Vec<Index>,
    }

    #[derive(Debug, Default)]
    pub(super) struct Stats {
        pub(super) connects: HashMap<String, usize>,
        pub(super) aggregates: HashMap<String, usize>,
        pub(super) aggregates_total: usize,
        pub(super) scans: HashMap<String, usize>,
        /// Every scan and aggregation, in the order they were served
        pub(super) accesses: Vec<Access>,
    }

    impl Stats {
        pub(super) fn record(&mut self, endpoint: &str, kind: AccessKind, collection: &str) {
            let counts = match kind {
                AccessKind::Scan => &mut self.scans,
                AccessKind::Aggregate => {
                    self.aggregates_total += 1;
                    &mut self.aggregates
                }
            };
            *counts.entry(endpoint.to_string()).or_default() += 1;
            self.accesses.push(Access {
                endpoint: endpoint.to_string(),
                kind,
                collection: collection.to_string(),
            });
        }
    }

    #[derive(Debug, Default)]
    pub(super) struct State {
        pub(super) collections: HashMap<String, Collection>,
        pub(super) faults: Faults,
        pub(super) stats: Stats,
    }

    impl eval::Catalog for State {
        fn documents(&self, collection: &str) -> &[Document] {
            self.collections
                .get(collection)
                .map_or(&[], |c| c.docs.as_slice())
        }
    }

    #[derive(Debug)]
    pub(super) struct Inner {
        pub(super) database: String,
        pub(super) nodes: usize,
        pub(super) latency: Option<Duration>,
        pub(super) state: RwLock<State>,
    }
} // mod inner

use inner::Inner;
use inner::State;

#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[bon::bon]
impl MemoryStore {
    #[builder]
    pub fn new(
        #[builder(default = 1)] nodes: usize,
        #[builder(default = String::from("pipebench"), into)] database: String,
        latency: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                database,
                nodes: nodes.max(1),
                latency,
                state: RwLock::new(State::default()),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MemoryStore {
    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn nodes(&self) -> usize {
        self.inner.nodes
    }

    pub async fn set_faults(&self, faults: Faults) {
        self.inner.state.write().await.faults = faults;
    }

    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        let guard = self.inner.state.read().await;
        eval::Catalog::documents(&*guard, collection).to_vec()
    }

    pub async fn count(&self, collection: &str) -> usize {
        let guard = self.inner.state.read().await;
        eval::Catalog::documents(&*guard, collection).len()
    }

    /// `None` if the index does not exist
    pub async fn index_hidden(&self, collection: &str, index: &str) -> Option<bool> {
        let guard = self.inner.state.read().await;
        guard
            .collections
            .get(collection)?
            .indexes
            .iter()
            .find(|i| i.name == index)
            .map(|i| i.hidden)
    }

    pub async fn index_names(&self, collection: &str) -> Vec<String> {
        let guard = self.inner.state.read().await;
        guard
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Connections opened, per endpoint
    pub async fn connects(&self) -> HashMap<String, usize> {
        self.inner.state.read().await.stats.connects.clone()
    }

    /// Aggregations served, per endpoint
    pub async fn aggregates(&self) -> HashMap<String, usize> {
        self.inner.state.read().await.stats.aggregates.clone()
    }

    /// Full scans served, per endpoint
    pub async fn scans(&self) -> HashMap<String, usize> {
        self.inner.state.read().await.stats.scans.clone()
    }

    /// Scans and aggregations in the order they were served
    pub async fn accesses(&self) -> Vec<Access> {
        self.inner.state.read().await.stats.accesses.clone()
    }

    fn valid_endpoint(&self, endpoint: &str) -> bool {
        endpoint == PRIMARY_ENDPOINT || (0..self.inner.nodes).any(|i| node_endpoint(i) == endpoint)
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn primary_endpoint(&self) -> &str {
        PRIMARY_ENDPOINT
    }

    async fn resolve_endpoints(&self) -> Result<Vec<String>> {
        Ok((0..self.inner.nodes).map(node_endpoint).collect())
    }

    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Connection>> {
        if !self.valid_endpoint(endpoint) {
            return Err(Error::connection(endpoint, "unknown endpoint"));
        }
        let mut guard = self.inner.state.write().await;
        if guard.faults.refuse_connections {
            return Err(Error::connection(endpoint, "connection refused"));
        }
        *guard
            .stats
            .connects
            .entry(endpoint.to_string())
            .or_default() += 1;
        debug!(endpoint, "connected");
        Ok(Arc::new(MemoryConnection {
            endpoint: endpoint.to_string(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    endpoint: String,
    inner: Arc<Inner>,
}

impl MemoryConnection {
    async fn pause(&self) {
        if let Some(d) = self.inner.latency {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn bulk_insert(
        &self,
        collection: &str,
        mut documents: Vec<Document>,
        _ordered: bool,
    ) -> Result<usize> {
        self.pause().await;
        let mut guard = self.inner.state.write().await;
        let rejected = guard.faults.reject_inserts.contains(collection);
        if rejected {
            documents.truncate(documents.len() / 2);
        }
        let n = documents.len();
        guard
            .collections
            .entry(collection.to_string())
            .or_default()
            .docs
            .extend(documents);
        if rejected {
            return Err(Error::write(collection, n, "simulated bulk write failure"));
        }
        Ok(n)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<()> {
        self.pause().await;
        let mut guard = self.inner.state.write().await;
        guard
            .collections
            .entry(collection.to_string())
            .or_default()
            .docs
            .push(document);
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Option<Document>> {
        self.pause().await;
        let guard = self.inner.state.read().await;
        for d in eval::Catalog::documents(&*guard, collection) {
            if eval::matches(d, filter).map_err(|e| Error::query(collection, e))? {
                return Ok(Some(d.clone()));
            }
        }
        Ok(None)
    }

    async fn scan(&self, collection: &str, filter: &Document) -> Result<Vec<Document>> {
        self.pause().await;
        let mut guard = self.inner.state.write().await;
        let mut out = Vec::new();
        for d in eval::Catalog::documents(&*guard, collection) {
            if eval::matches(d, filter).map_err(|e| Error::query(collection, e))? {
                out.push(d.clone());
            }
        }
        guard
            .stats
            .record(&self.endpoint, AccessKind::Scan, collection);
        Ok(out)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Document>> {
        self.pause().await;
        {
            let mut guard = self.inner.state.write().await;
            guard
                .stats
                .record(&self.endpoint, AccessKind::Aggregate, collection);
            let total = guard.stats.aggregates_total;
            if let Some(limit) = guard.faults.fail_aggregates_after
                && total > limit
            {
                return Err(Error::query(collection, "simulated query failure"));
            }
        }

        let guard = self.inner.state.read().await;
        let docs = eval::Catalog::documents(&*guard, collection);
        let (selected, rest) =
            eval::select(docs, pipeline).map_err(|e| Error::query(collection, e))?;
        eval::run(&*guard, selected, rest).map_err(|e| Error::query(collection, e))
    }

    async fn atomic_update(
        &self,
        collection: &str,
        filter: &Document,
        update: &[UpdateOp],
    ) -> Result<()> {
        self.pause().await;
        let mut guard = self.inner.state.write().await;
        let Some(c) = guard.collections.get_mut(collection) else {
            return Err(Error::write(collection, 0, "no document matches filter"));
        };
        let mut target = None;
        for (i, d) in c.docs.iter().enumerate() {
            if eval::matches(d, filter).map_err(|e| Error::query(collection, e))? {
                target = Some(i);
                break;
            }
        }
        let Some(i) = target else {
            return Err(Error::write(collection, 0, "no document matches filter"));
        };

        // Apply to a copy so a failed update leaves the document untouched
        let mut updated = c.docs[i].clone();
        eval::apply_update(&mut updated, update).map_err(|e| Error::query(collection, e))?;
        c.docs[i] = updated;
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<String> {
        self.pause().await;
        if index.keys.is_empty() {
            return Err(Error::admin(format!("index on {collection} has no keys")));
        }
        let name = index.name();
        let mut guard = self.inner.state.write().await;
        let c = guard.collections.entry(collection.to_string()).or_default();
        match c.indexes.iter().find(|i| i.name == name) {
            Some(existing) if existing.keys == index.keys => {}
            Some(_) => {
                return Err(Error::admin(format!(
                    "index {name} already exists on {collection} with different keys"
                )));
            }
            None => c.indexes.push(inner::Index {
                name: name.clone(),
                keys: index.keys.clone(),
                hidden: index.hidden,
            }),
        }
        Ok(name)
    }

    async fn set_index_visibility(
        &self,
        collection: &str,
        index: &str,
        hidden: bool,
    ) -> Result<()> {
        self.pause().await;
        let mut guard = self.inner.state.write().await;
        let found = guard
            .collections
            .get_mut(collection)
            .and_then(|c| c.indexes.iter_mut().find(|i| i.name == index));
        match found {
            Some(i) => {
                i.hidden = hidden;
                Ok(())
            }
            None => Err(Error::admin(format!(
                "index {index} not found on {collection}"
            ))),
        }
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.pause().await;
        self.inner.state.write().await.collections.remove(collection);
        Ok(())
    }

    async fn run_diagnostic(&self, request: &ExplainRequest) -> Result<Document> {
        self.pause().await;
        let collection = request.collection.as_str();
        let guard = self.inner.state.read().await;
        let docs = eval::Catalog::documents(&*guard, collection);

        let first_match = request
            .pipeline
            .first()
            .and_then(|s| s.get("$match"))
            .and_then(Value::as_object);

        // Longest visible index whose key prefix is fully constrained by the leading $match
        let chosen = first_match.and_then(|f| {
            guard
                .collections
                .get(collection)?
                .indexes
                .iter()
                .filter(|i| !i.hidden)
                .map(|i| (i, i.keys.iter().take_while(|k| f.contains_key(*k)).count()))
                .filter(|(_, n)| *n > 0)
                .max_by_key(|(_, n)| *n)
        });

        let winning_plan = match chosen {
            Some((index, _)) => {
                let key_pattern: Document =
                    index.keys.iter().map(|k| (k.clone(), json!(1))).collect();
                json!({
                    "stage": "FETCH",
                    "inputStage": {
                        "stage": "IXSCAN",
                        "indexName": index.name,
                        "keyPattern": key_pattern,
                    },
                })
            }
            None => json!({"stage": "COLLSCAN"}),
        };
        let mut plan = Document::new();
        plan.insert(
            "queryPlanner".to_string(),
            json!({
                "namespace": format!("{}.{collection}", self.inner.database),
                "parsedQuery": first_match.cloned().unwrap_or_default(),
                "winningPlan": winning_plan,
            }),
        );

        if request.verbosity == Verbosity::ExecutionStats {
            let started = Instant::now();
            let examined = match (chosen, first_match) {
                (Some((index, n)), Some(f)) => {
                    let prefix: Document = index.keys[..n]
                        .iter()
                        .filter_map(|k| f.get(k).map(|v| (k.clone(), v.clone())))
                        .collect();
                    let mut count = 0;
                    for d in docs {
                        if eval::matches(d, &prefix).map_err(|e| Error::query(collection, e))? {
                            count += 1;
                        }
                    }
                    count
                }
                _ => docs.len(),
            };
            let (selected, rest) =
                eval::select(docs, &request.pipeline).map_err(|e| Error::query(collection, e))?;
            let returned = eval::run(&*guard, selected, rest)
                .map_err(|e| Error::query(collection, e))?
                .len();
            let keys_examined = if chosen.is_some() { examined } else { 0 };
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            plan.insert(
                "executionStats".to_string(),
                json!({
                    "nReturned": returned,
                    "totalDocsExamined": examined,
                    "totalKeysExamined": keys_examined,
                    "executionTimeMillis": elapsed,
                }),
            );
        }
        plan.insert("ok".to_string(), json!(1));
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::filter;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            other => panic!("not a document: {other}"),
        }
    }

    async fn seeded(store: &MemoryStore) -> anyhow::Result<Arc<dyn Connection>> {
        let conn = store.connect(store.primary_endpoint()).await?;
        let profiles = vec![
            doc(json!({"profileID": "a-0", "contact": {"address": {"city": "Boise"}}})),
            doc(json!({"profileID": "a-1", "contact": {"address": {"city": "Boise"}}})),
            doc(json!({"profileID": "b-0", "contact": {"address": {"city": "Reno"}}})),
        ];
        assert_eq!(3, conn.bulk_insert("Profiles", profiles, false).await?);
        Ok(conn)
    }

    #[test_log::test(tokio::test)]
    async fn test_endpoints() -> anyhow::Result<()> {
        let store = MemoryStore::builder().nodes(3).build();
        let endpoints = store.resolve_endpoints().await?;
        assert_eq!(
            vec!["memory://node-0", "memory://node-1", "memory://node-2"],
            endpoints
        );
        for e in &endpoints {
            store.connect(e).await?;
        }
        store.connect(PRIMARY_ENDPOINT).await?;
        assert!(matches!(
            store.connect("memory://node-3").await,
            Err(Error::Connection { .. })
        ));
        assert_eq!(Some(&1), store.connects().await.get("memory://node-2"));

        store
            .set_faults(Faults {
                refuse_connections: true,
                ..Faults::default()
            })
            .await;
        assert!(store.connect(PRIMARY_ENDPOINT).await.is_err());
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_insert_and_query() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let conn = seeded(&store).await?;
        let found = conn
            .scan("Profiles", &filter([("contact.address.city", "Boise")]))
            .await?;
        assert_eq!(2, found.len());
        let one = conn.find_one("Profiles", &filter([("profileID", "b-0")])).await?;
        assert!(one.is_some());
        let out = conn
            .aggregate(
                "Profiles",
                &[json!({"$match": {"contact.address.city": "Reno"}}), json!({"$limit": 5})],
            )
            .await?;
        assert_eq!(1, out.len());
        assert_eq!(Some(&1), store.aggregates().await.get(PRIMARY_ENDPOINT));
        assert_eq!(Some(&1), store.scans().await.get(PRIMARY_ENDPOINT));
        let kinds: Vec<_> = store
            .accesses()
            .await
            .into_iter()
            .map(|a| (a.kind, a.collection))
            .collect();
        assert_eq!(
            vec![
                (AccessKind::Scan, "Profiles".to_string()),
                (AccessKind::Aggregate, "Profiles".to_string())
            ],
            kinds
        );

        conn.drop_collection("Profiles").await?;
        assert_eq!(0, store.count("Profiles").await);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_rejected_insert_is_partial() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        store
            .set_faults(Faults {
                reject_inserts: HashSet::from(["Devices".to_string()]),
                ..Faults::default()
            })
            .await;
        let conn = store.connect(PRIMARY_ENDPOINT).await?;
        let docs = (0..10).map(|i| doc(json!({"n": i}))).collect();
        let err = conn.bulk_insert("Devices", docs, false).await.unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(Some(5), err.partially_written());
        assert_eq!(5, store.count("Devices").await);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_atomic_update() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let conn = store.connect(PRIMARY_ENDPOINT).await?;
        conn.insert_one("Results", doc(json!({"testName": "t", "instanceResults": []})))
            .await?;
        let f = filter([("testName", "t")]);
        conn.atomic_update(
            "Results",
            &f,
            &[
                UpdateOp::push("instanceResults", json!({"durationMillis": 4})),
                UpdateOp::average("instanceAverage", "instanceResults", "durationMillis"),
            ],
        )
        .await?;
        let d = conn.find_one("Results", &f).await?.unwrap();
        assert_eq!(Some(&json!(4.0)), d.get("instanceAverage"));

        let missing = conn
            .atomic_update("Results", &filter([("testName", "x")]), &[UpdateOp::set("a", 1)])
            .await;
        assert!(matches!(missing, Err(Error::Write { .. })));

        // a failing update leaves the document as it was
        let bad = conn
            .atomic_update(
                "Results",
                &f,
                &[UpdateOp::set("marker", 1), UpdateOp::push("testName", 1)],
            )
            .await;
        assert!(bad.is_err());
        let d = conn.find_one("Results", &f).await?.unwrap();
        assert!(!d.contains_key("marker"));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_index_visibility_and_explain() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let conn = seeded(&store).await?;
        let spec = IndexSpec::builder()
            .keys(vec!["contact.address.city".into()])
            .hidden(true)
            .build();
        let name = conn.create_index("Profiles", &spec).await?;
        assert_eq!("contact.address.city_1", name);
        // creating the same index again is a no-op
        conn.create_index("Profiles", &spec).await?;
        assert_eq!(vec![name.clone()], store.index_names("Profiles").await);
        assert_eq!(Some(true), store.index_hidden("Profiles", &name).await);

        let request = ExplainRequest::builder()
            .collection("Profiles")
            .pipeline(vec![json!({"$match": {"contact.address.city": "Boise"}})])
            .build();
        let plan = conn.run_diagnostic(&request).await?;
        assert_eq!(json!("COLLSCAN"), plan["queryPlanner"]["winningPlan"]["stage"]);
        assert_eq!(json!(3), plan["executionStats"]["totalDocsExamined"]);

        conn.set_index_visibility("Profiles", &name, false).await?;
        let plan = conn.run_diagnostic(&request).await?;
        let ixscan = &plan["queryPlanner"]["winningPlan"]["inputStage"];
        assert_eq!(json!("IXSCAN"), ixscan["stage"]);
        assert_eq!(json!(name), ixscan["indexName"]);
        assert_eq!(json!(2), plan["executionStats"]["nReturned"]);
        assert_eq!(json!(2), plan["executionStats"]["totalDocsExamined"]);

        let missing = conn.set_index_visibility("Profiles", "nope_1", false).await;
        assert!(matches!(missing, Err(Error::Admin(_))));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_fail_aggregates_after() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let conn = seeded(&store).await?;
        store
            .set_faults(Faults {
                fail_aggregates_after: Some(1),
                ..Faults::default()
            })
            .await;
        conn.aggregate("Profiles", &[]).await?;
        let r = conn.aggregate("Profiles", &[]).await;
        assert!(matches!(r, Err(Error::Query { .. })));
        Ok(())
    }
}

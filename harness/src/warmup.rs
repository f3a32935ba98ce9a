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

use std::time::Instant;

use futures::future::try_join_all;
use serde_json::json;
use tracing::info;

use crate::Result;
use crate::pool::ConnectionPool;
use crate::store::filter;

/// Collections read by the benchmark and a field every one of their documents carries
const WARM_SCANS: [(&str, &str); 3] = [
    ("Profiles", "contact.address.city"),
    ("Mappings", "deviceSN"),
    ("Devices", "deviceSN"),
];

/// Per-collection document counts seen by one node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeWarmup {
    pub endpoint: String,
    pub documents: Vec<(&'static str, usize)>,
}

/// Read every benchmarked collection in full on every node, so each node's cache holds the
/// working set before timing starts.  Scans run concurrently; the first failure is returned.
pub async fn warm_caches(pool: &ConnectionPool) -> Result<Vec<NodeWarmup>> {
    let started = Instant::now();
    let endpoints = pool.store().resolve_endpoints().await?;
    let nodes = try_join_all(endpoints.iter().map(|endpoint| warm_node(pool, endpoint))).await?;
    info!(nodes = nodes.len(), elapsed = ?started.elapsed(), "caches warmed");
    Ok(nodes)
}

async fn warm_node(pool: &ConnectionPool, endpoint: &str) -> Result<NodeWarmup> {
    let conn = pool.get(endpoint).await?;
    let scans = WARM_SCANS.iter().map(|(collection, field)| {
        let conn = &conn;
        async move {
            let f = filter([(*field, json!({"$exists": true}))]);
            let n = conn.scan(collection, &f).await?.len();
            Ok::<_, crate::Error>((*collection, n))
        }
    });
    let documents = try_join_all(scans).await?;
    info!(endpoint, ?documents, "node warmed");
    Ok(NodeWarmup {
        endpoint: endpoint.to_string(),
        documents,
    })
}

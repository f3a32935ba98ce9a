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

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Error;
use crate::Result;
use crate::store::Connection;
use crate::store::Store;

// Errors are shared between every waiter of a pending connect
type CompletionResult = std::result::Result<Arc<dyn Connection>, Arc<Error>>;

mod inner {
    use super::{Arc, CompletionResult, Connection, HashMap, RwLock, Store, broadcast};

    #[derive(Clone, Debug)]
    pub(super) enum Item {
        Connection(Arc<dyn Connection>),
        Pending(broadcast::Sender<CompletionResult>),
    }

    #[derive(Debug, Default)]
    pub(super) struct State {
        pub(super) connections: HashMap<String, Item>,
    }

    #[derive(Debug)]
    pub(super) struct Inner {
        pub(super) store: Arc<dyn Store>,
        pub(super) state: RwLock<State>,
    }
} // mod inner

/// Shared connections, one per endpoint, opened on first use.
///
/// Concurrent requests for an endpoint that is still connecting wait for that attempt rather
/// than starting their own.  A failed attempt is not cached.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    inner: Arc<inner::Inner>,
}

impl ConnectionPool {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(inner::Inner {
                store,
                state: RwLock::new(inner::State::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    async fn await_pending_op(
        mut rx: broadcast::Receiver<CompletionResult>,
    ) -> Result<Arc<dyn Connection>> {
        match rx.recv().await {
            Ok(Ok(c)) => Ok(c),
            Ok(Err(e)) => Err(Error::from(e)),
            Err(e) => Err(Error::Custom(format!("pending connect abandoned: {e}"))),
        }
    }

    // Return a pooled connection, waiting for a pending connect if one is in progress
    async fn try_get(&self, endpoint: &str) -> Option<Result<Arc<dyn Connection>>> {
        use inner::Item;
        let guard = self.inner.state.read().await;
        match guard.connections.get(endpoint)? {
            Item::Connection(c) => Some(Ok(Arc::clone(c))),
            Item::Pending(tx) => {
                let rx = tx.subscribe();
                drop(guard); // allow pending operation to complete
                Some(Self::await_pending_op(rx).await)
            }
        }
    }

    async fn complete(
        &self,
        endpoint: &str,
        tx: broadcast::Sender<CompletionResult>,
        r: Result<Arc<dyn Connection>>,
    ) -> Result<Arc<dyn Connection>> {
        use inner::Item;

        let mut guard = self.inner.state.write().await;
        let notification: CompletionResult = match guard.connections.entry(endpoint.to_string()) {
            Entry::Occupied(mut o) => match o.get() {
                Item::Pending(otx) if otx.same_channel(&tx) => match r {
                    Ok(c) => {
                        o.insert(Item::Connection(Arc::clone(&c)));
                        Ok(c)
                    }
                    Err(e) => {
                        o.remove();
                        Err(Arc::new(e))
                    }
                },
                // replaced while we were connecting: prefer what is there now
                Item::Connection(c) => Ok(Arc::clone(c)),
                Item::Pending(_) => r.map_err(Arc::new),
            },
            Entry::Vacant(_) => r.map_err(Arc::new),
        };
        drop(guard);

        match tx.send(notification.clone()) {
            Err(_) => debug!(endpoint, "no waiters for connect completion"),
            Ok(waiters) => info!(endpoint, waiters, "connect completion sent"),
        }
        notification.map_err(Error::from)
    }

    /// The pooled connection to `endpoint`, opening it if needed
    pub async fn get(&self, endpoint: &str) -> Result<Arc<dyn Connection>> {
        use inner::Item;

        // Already there, we're done and don't need the write lock
        if let Some(item) = self.try_get(endpoint).await {
            return item;
        }

        let mut guard = self.inner.state.write().await;
        let entry = guard.connections.entry(endpoint.to_string());
        if let Entry::Occupied(item) = entry {
            return match item.get() {
                Item::Connection(c) => Ok(Arc::clone(c)),
                Item::Pending(tx) => {
                    let rx = tx.subscribe();
                    drop(guard);
                    Self::await_pending_op(rx).await
                }
            };
        }

        let tx = {
            let (tx, _) = broadcast::channel(1);
            entry.insert_entry(Item::Pending(tx.clone()));
            tx
        };

        // Connect without the write lock to avoid blocking other endpoints
        drop(guard);
        let r = self.inner.store.connect(endpoint).await;
        if let Err(err) = &r {
            warn!(endpoint, %err, "connect failed");
        }
        self.complete(endpoint, tx, r).await
    }

    /// The pooled connection to the store's primary endpoint
    pub async fn primary(&self) -> Result<Arc<dyn Connection>> {
        let endpoint = self.inner.store.primary_endpoint().to_string();
        self.get(&endpoint).await
    }

    /// Open `n` unpooled connections to the primary endpoint
    pub async fn dedicated_primary(&self, n: usize) -> Result<Vec<Arc<dyn Connection>>> {
        let endpoint = self.inner.store.primary_endpoint();
        let mut conns = Vec::with_capacity(n);
        for _ in 0..n {
            conns.push(self.inner.store.connect(endpoint).await?);
        }
        Ok(conns)
    }

    /// Open `n` unpooled connections spread round-robin across the node endpoints
    pub async fn dedicated_nodes(&self, n: usize) -> Result<Vec<Arc<dyn Connection>>> {
        let endpoints = self.inner.store.resolve_endpoints().await?;
        if endpoints.is_empty() {
            return Err(Error::connection(
                self.inner.store.primary_endpoint(),
                "no node endpoints resolved",
            ));
        }
        let mut conns = Vec::with_capacity(n);
        for endpoint in endpoints.iter().cycle().take(n) {
            conns.push(self.inner.store.connect(endpoint).await?);
        }
        debug!(connections = n, nodes = endpoints.len(), "node connections opened");
        Ok(conns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::memory::Faults;
    use crate::store::memory::PRIMARY_ENDPOINT;
    use crate::store::memory::node_endpoint;

    fn pool(store: &MemoryStore) -> ConnectionPool {
        ConnectionPool::new(Arc::new(store.clone()))
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn test_concurrent_get_connects_once() -> anyhow::Result<()> {
        let store = MemoryStore::builder().nodes(2).build();
        let pool = pool(&store);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.primary().await }));
        }
        for h in handles {
            let conn = h.await??;
            assert_eq!(PRIMARY_ENDPOINT, conn.endpoint());
        }
        assert_eq!(Some(&1), store.connects().await.get(PRIMARY_ENDPOINT));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_connect_is_not_cached() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let pool = pool(&store);
        store
            .set_faults(Faults {
                refuse_connections: true,
                ..Faults::default()
            })
            .await;
        let err = pool.primary().await.err();
        assert!(matches!(err.as_ref().map(Error::root), Some(Error::Connection { .. })));

        store.set_faults(Faults::default()).await;
        pool.primary().await?;
        pool.primary().await?;
        assert_eq!(Some(&1), store.connects().await.get(PRIMARY_ENDPOINT));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_dedicated_nodes_round_robin() -> anyhow::Result<()> {
        let store = MemoryStore::builder().nodes(3).build();
        let pool = pool(&store);
        let conns = pool.dedicated_nodes(7).await?;
        let endpoints: Vec<_> = conns.iter().map(|c| c.endpoint().to_string()).collect();
        assert_eq!(node_endpoint(0), endpoints[0]);
        assert_eq!(node_endpoint(1), endpoints[1]);
        assert_eq!(node_endpoint(2), endpoints[2]);
        assert_eq!(node_endpoint(0), endpoints[3]);
        let connects = store.connects().await;
        assert_eq!(Some(&3), connects.get(&node_endpoint(0)));
        assert_eq!(Some(&2), connects.get(&node_endpoint(2)));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_dedicated_primary() -> anyhow::Result<()> {
        let store = MemoryStore::default();
        let conns = pool(&store).dedicated_primary(3).await?;
        assert_eq!(3, conns.len());
        assert_eq!(Some(&3), store.connects().await.get(PRIMARY_ENDPOINT));
        Ok(())
    }
}

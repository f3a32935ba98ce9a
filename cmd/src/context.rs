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


use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use crate::harness::ConnectionPool;
use crate::harness::Document;
use crate::harness::MemoryStore;
use crate::harness::MongoStore;
use crate::harness::Store;
use crate::harness::config::Config;
use crate::harness::config::ConfigDocument;

const DEFAULT_CONFIG_COLLECTION: &str = "Config";

#[derive(Clone, Debug)]
pub struct Context {
    /// Set when running against the in-process store
    memory: Option<MemoryStore>,
    pool: ConnectionPool,
    config: Arc<Config>,
}

impl Context {
    pub(super) async fn new(cli: &crate::Cli) -> anyhow::Result<Self> {
        let (store, memory): (Arc<dyn Store>, _) = match &cli.uri {
            Some(uri) => (Arc::new(MongoStore::new(uri, cli.database.clone()).await?), None),
            None => {
                let memory = MemoryStore::builder()
                    .nodes(cli.nodes)
                    .database(cli.database.clone())
                    .maybe_latency(cli.latency)
                    .build();
                (Arc::new(memory.clone()), Some(memory))
            }
        };
        let pool = ConnectionPool::new(Arc::clone(&store));

        let mut builder = Config::builder()
            .outer_workers(cli.outer_workers)
            .inner_workers(cli.inner_workers)
            .profiles(cli.profiles)
            .test_runs(cli.test_runs)
            .results_collection(cli.results_collection.clone())
            .batch_size(cli.batch_size)
            .reload_data(cli.reload_data)
            .run_tests(cli.run_tests)
            .debug(cli.debug)
            .seed(cli.seed);

        if cli.config_collection.is_some() || cli.config_file.is_some() {
            let collection = cli
                .config_collection
                .as_deref()
                .unwrap_or(DEFAULT_CONFIG_COLLECTION);
            let primary = pool.primary().await?;
            if let Some(path) = &cli.config_file {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let doc: Document = serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?;
                // the file replaces whatever configuration was stored before
                primary.drop_collection(collection).await?;
                primary.insert_one(collection, doc).await?;
            }
            let doc = ConfigDocument::load(primary.as_ref(), collection).await?;
            info!(collection, ?doc, "configuration document loaded");
            builder = builder.document(doc);
        }

        let config = builder.build()?;
        info!(
            endpoint = store.primary_endpoint(),
            in_process = memory.is_some(),
            ?config,
            "context ready"
        );
        Ok(Self {
            memory,
            pool,
            config,
        })
    }

    /// The in-process store, if no connection string was given
    pub fn memory(&self) -> Option<&MemoryStore> {
        self.memory.as_ref()
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }
}

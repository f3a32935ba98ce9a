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

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;
use crate::store::Connection;

pub const DEFAULT_RESULTS_COLLECTION: &str = "Results";
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Clone, Debug, Serialize)]
pub struct Config {
    outer_workers: usize,       // must be non-zero
    inner_workers: usize,       // per outer worker, must be non-zero
    profiles: usize,            // should divide by outer_workers * inner_workers
    test_runs: usize,           // should divide by outer_workers * inner_workers
    results_collection: String, // defaults to DEFAULT_RESULTS_COLLECTION
    batch_size: usize,          // bulk insert threshold per category
    debug: bool,
    reload_data: bool,
    run_tests: bool,
    seed: Option<u64>, // if set, data generation is reproducible
}

impl Config {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn outer_workers(&self) -> usize {
        self.outer_workers
    }
    pub fn inner_workers(&self) -> usize {
        self.inner_workers
    }
    pub fn profiles(&self) -> usize {
        self.profiles
    }
    pub fn test_runs(&self) -> usize {
        self.test_runs
    }
    pub fn results_collection(&self) -> &str {
        &self.results_collection
    }
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
    pub fn debug(&self) -> bool {
        self.debug
    }
    pub fn reload_data(&self) -> bool {
        self.reload_data
    }
    pub fn run_tests(&self) -> bool {
        self.run_tests
    }
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Total number of leaf workers in a phase
    pub fn workers_per_phase(&self) -> usize {
        self.outer_workers * self.inner_workers
    }
}

/// Configuration as stored in a store collection.  Absent fields keep the builder's value.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    #[serde(alias = "Connections")]
    pub outer_workers: Option<usize>,
    #[serde(alias = "GoRoutines")]
    pub inner_workers: Option<usize>,
    #[serde(alias = "Profiles")]
    pub profiles: Option<usize>,
    #[serde(alias = "TestRuns")]
    pub test_runs: Option<usize>,
    #[serde(alias = "ResultsColl")]
    pub results_collection: Option<String>,
    pub batch_size: Option<usize>,
    #[serde(alias = "Debug")]
    pub debug: Option<bool>,
    #[serde(alias = "ReloadData")]
    pub reload_data: Option<bool>,
    #[serde(alias = "RunTests")]
    pub run_tests: Option<bool>,
    pub seed: Option<u64>,
}

impl ConfigDocument {
    /// Read the first document of `collection`
    pub async fn load(conn: &dyn Connection, collection: &str) -> Result<Self> {
        let doc = conn
            .find_one(collection, &crate::Document::new())
            .await?
            .ok_or_else(|| {
                Error::invalid_config(format!("no configuration document in {collection}"))
            })?;
        serde_json::from_value(serde_json::Value::Object(doc)).map_err(Error::from)
    }
}

#[derive(Clone, Debug)]
pub struct Builder {
    c: Config,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            c: Config {
                outer_workers: 1,
                inner_workers: 1,
                profiles: 0,
                test_runs: 0,
                results_collection: DEFAULT_RESULTS_COLLECTION.to_string(),
                batch_size: DEFAULT_BATCH_SIZE,
                debug: false,
                reload_data: true,
                run_tests: true,
                seed: None,
            },
        }
    }

    pub fn new_from(config: &Config) -> Self {
        Self { c: config.clone() }
    }

    #[must_use]
    pub fn outer_workers(mut self, x: usize) -> Self {
        self.c.outer_workers = x;
        self
    }

    #[must_use]
    pub fn inner_workers(mut self, x: usize) -> Self {
        self.c.inner_workers = x;
        self
    }

    #[must_use]
    pub fn profiles(mut self, x: usize) -> Self {
        self.c.profiles = x;
        self
    }

    #[must_use]
    pub fn test_runs(mut self, x: usize) -> Self {
        self.c.test_runs = x;
        self
    }

    #[must_use]
    pub fn results_collection(mut self, x: impl Into<String>) -> Self {
        self.c.results_collection = x.into();
        self
    }

    #[must_use]
    pub fn batch_size(mut self, x: usize) -> Self {
        self.c.batch_size = x;
        self
    }

    #[must_use]
    pub fn debug(mut self, x: bool) -> Self {
        self.c.debug = x;
        self
    }

    #[must_use]
    pub fn reload_data(mut self, x: bool) -> Self {
        self.c.reload_data = x;
        self
    }

    #[must_use]
    pub fn run_tests(mut self, x: bool) -> Self {
        self.c.run_tests = x;
        self
    }

    #[must_use]
    pub fn seed(mut self, x: Option<u64>) -> Self {
        self.c.seed = x;
        self
    }

    /// Overlay the fields present in `doc`
    #[must_use]
    pub fn document(mut self, doc: ConfigDocument) -> Self {
        let c = &mut self.c;
        c.outer_workers = doc.outer_workers.unwrap_or(c.outer_workers);
        c.inner_workers = doc.inner_workers.unwrap_or(c.inner_workers);
        c.profiles = doc.profiles.unwrap_or(c.profiles);
        c.test_runs = doc.test_runs.unwrap_or(c.test_runs);
        if let Some(x) = doc.results_collection {
            c.results_collection = x;
        }
        c.batch_size = doc.batch_size.unwrap_or(c.batch_size);
        c.debug = doc.debug.unwrap_or(c.debug);
        c.reload_data = doc.reload_data.unwrap_or(c.reload_data);
        c.run_tests = doc.run_tests.unwrap_or(c.run_tests);
        c.seed = doc.seed.or(c.seed);
        self
    }

    pub fn build(mut self) -> Result<Arc<Config>> {
        if self.c.outer_workers == 0 || self.c.inner_workers == 0 {
            return Err(Error::invalid_config(format!(
                "worker counts must be non-zero (outer={}, inner={})",
                self.c.outer_workers, self.c.inner_workers
            )));
        }
        if self.c.batch_size == 0 {
            return Err(Error::invalid_config("batch size must be non-zero"));
        }
        if self.c.results_collection.is_empty() {
            self.c.results_collection = DEFAULT_RESULTS_COLLECTION.to_string();
        }

        let Some(workers) = self.c.outer_workers.checked_mul(self.c.inner_workers) else {
            return Err(Error::invalid_config(format!(
                "too many workers per phase (outer={}, inner={})",
                self.c.outer_workers, self.c.inner_workers
            )));
        };
        // Uneven counts are accepted and the remainder is never scheduled
        for (what, n) in [("profiles", self.c.profiles), ("test_runs", self.c.test_runs)] {
            if n % workers != 0 {
                warn!(
                    what,
                    n,
                    workers,
                    dropped = n % workers,
                    "count not divisible by worker count, remainder will be skipped"
                );
            }
        }
        Ok(Arc::new(self.c))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

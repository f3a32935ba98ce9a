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
use std::time::Duration;

use pipebench_harness::ConnectionPool;
use pipebench_harness::MemoryStore;
use pipebench_harness::config::Config;

/// Bound on any single scenario; a stalled barrier fails the test instead of hanging it
#[allow(dead_code)]
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(30);

pub trait TestResultExt<T> {
    #[allow(dead_code)]
    fn trace_err(self) -> Self;
    fn trace_err_at(self, target: &'static str, file: &'static str, line: u32) -> Self;
}

impl<T, E: std::fmt::Debug> TestResultExt<T> for Result<T, E> {
    #[allow(dead_code)]
    fn trace_err(self) -> Self {
        if let Err(ref e) = self {
            tracing::error!(?e, "Operation failed");
        }
        self
    }

    fn trace_err_at(self, target: &'static str, file: &'static str, line: u32) -> Self {
        if let Err(ref e) = self {
            tracing::error!(target, file, line, ?e, "Operation failed");
        }
        self
    }
}

#[macro_export]
macro_rules! trace_err {
    ($expr:expr) => {{ $expr.trace_err_at(module_path!(), file!(), line!()) }};
}

/// An in-memory cluster and a pool over it
pub struct TestCluster {
    pub store: MemoryStore,
    pub pool: ConnectionPool,
}

impl TestCluster {
    pub fn start(nodes: usize) -> Self {
        let store = MemoryStore::builder().nodes(nodes).build();
        let pool = ConnectionPool::new(Arc::new(store.clone()));
        Self { store, pool }
    }
}

/// Small batches so flushes happen during a test-sized load
#[allow(dead_code)]
pub fn config(
    outer: usize,
    inner: usize,
    profiles: usize,
    test_runs: usize,
) -> anyhow::Result<Arc<Config>> {
    Ok(Config::builder()
        .outer_workers(outer)
        .inner_workers(inner)
        .profiles(profiles)
        .test_runs(test_runs)
        .batch_size(16)
        .seed(Some(42))
        .build()?)
}

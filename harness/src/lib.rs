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


//! Synthetic-dataset loader and pipeline-variant benchmark harness.
//!
//! A run regenerates a household dataset (profiles, devices and the mappings between them)
//! and then times several ways of asking the store the same question.  Work in both phases
//! is spread over a two-level pool of workers: outer workers each own a connection, inner
//! workers share their outer worker's connection.  Timings land in one result record per
//! pipeline variant.
//!
//! The store is reached through the [`Store`] and [`Connection`] traits.  [`MongoStore`]
//! talks to a MongoDB replica set; [`MemoryStore`] is a self-contained stand-in used by the
//! tests and benches.

pub mod barrier;
pub mod batch;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod generator;
pub mod loader;
pub mod orchestrator;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod results;
pub mod store;
pub mod variant;
pub mod warmup;

pub use errors::*;
pub use orchestrator::BenchmarkOrchestrator;
pub use orchestrator::BenchmarkSummary;
pub use pool::ConnectionPool;
pub use store::Connection;
pub use store::Document;
pub use store::MemoryStore;
pub use store::MongoStore;
pub use store::Store;
pub use variant::PipelineVariant;

pub type Result<T> = std::result::Result<T, Error>;

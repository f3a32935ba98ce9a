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

//! The data-load phase: regenerate the Profiles, Devices and Mappings collections.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;
use tracing::warn;

use crate::Result;
use crate::batch::BatchAccumulator;
use crate::batch::BatchStats;
use crate::batch::Category;
use crate::config::Config;
use crate::coordinator::Phase;
use crate::coordinator::WorkerSlot;
use crate::generator::FamilyGenerator;
use crate::pool::ConnectionPool;
use crate::results::ResultAggregator;
use crate::results::millis_between;
use crate::variant::benchmark_indexes;

/// Profile numbering starts at one
const FIRST_PROFILE: usize = 1;

#[derive(Clone, Debug)]
pub struct LoadReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Profiles generated, whether or not every write of them succeeded
    pub profiles: usize,
    pub stats: BatchStats,
    pub indexes: Vec<String>,
}

impl LoadReport {
    pub fn duration_millis(&self) -> u64 {
        millis_between(self.start_time, self.end_time)
    }
}

/// Generator seed for one worker: distinct per worker, stable across runs
fn worker_seed(seed: u64, slot: &WorkerSlot) -> u64 {
    seed ^ (slot.range.start as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

async fn generate(
    slot: WorkerSlot,
    accumulator: BatchAccumulator,
    seed: Option<u64>,
) -> Result<(usize, BatchStats)> {
    let rng = match seed {
        Some(seed) => StdRng::seed_from_u64(worker_seed(seed, &slot)),
        None => StdRng::from_entropy(),
    };
    let mut generator = FamilyGenerator::new(rng);
    let mut accumulator = accumulator;
    let mut generated = 0;
    while generated < slot.range.len() {
        let family = generator.family(slot.range.len() - generated);
        generated += family.profiles.len();
        for d in family.devices {
            accumulator.add(Category::Devices, d).await?;
        }
        for d in family.mappings {
            accumulator.add(Category::Mappings, d).await?;
        }
        for d in family.profiles {
            accumulator.add(Category::Profiles, d).await?;
        }
    }
    let stats = accumulator.finish().await?;
    Ok((generated, stats))
}

/// Drop and regenerate the dataset, then record the load timing and build the indexes.
///
/// The configured profile count is spread over `outer_workers` connections to the primary,
/// each shared by `inner_workers` generators.  Every generator owns its batch buffers.
pub async fn load(pool: &ConnectionPool, config: &Arc<Config>) -> Result<LoadReport> {
    let primary = pool.primary().await?;
    for category in Category::ALL {
        primary.drop_collection(category.collection()).await?;
    }

    let conns = Arc::new(pool.dedicated_primary(config.outer_workers()).await?);
    let phase = Phase::builder()
        .name("load")
        .base(FIRST_PROFILE)
        .total(config.profiles())
        .outer_workers(config.outer_workers())
        .inner_workers(config.inner_workers())
        .build();

    info!(
        profiles = config.profiles(),
        outer = config.outer_workers(),
        inner = config.inner_workers(),
        "loading"
    );
    let start_time = Utc::now();
    let batch_size = config.batch_size();
    let debug = config.debug();
    let seed = config.seed();
    let outputs = phase
        .run(
            move |outer, _| {
                let conns = Arc::clone(&conns);
                async move { Ok::<_, crate::Error>(Arc::clone(&conns[outer])) }
            },
            move |slot, conn| async move {
                generate(slot, BatchAccumulator::new(conn, batch_size, debug), seed).await
            },
        )
        .await?;
    let end_time = Utc::now();

    let mut stats = BatchStats::default();
    let mut profiles = 0usize;
    for (_, (generated, worker_stats)) in &outputs {
        profiles += *generated;
        stats.merge(worker_stats);
    }
    if stats.failed_flushes() > 0 {
        warn!(failed = stats.failed_flushes(), "some bulk writes were rejected");
    }

    let mut indexes = Vec::new();
    for (collection, spec) in benchmark_indexes() {
        indexes.push(primary.create_index(collection, &spec).await?);
    }

    ResultAggregator::new(Arc::clone(&primary), config.results_collection())
        .record_load(start_time, end_time)
        .await?;

    let report = LoadReport {
        start_time,
        end_time,
        profiles,
        stats,
        indexes,
    };
    info!(
        profiles,
        devices = report.stats.get(Category::Devices).inserted,
        mappings = report.stats.get(Category::Mappings).inserted,
        millis = report.duration_millis(),
        "load complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::WorkRange;

    #[test]
    fn test_worker_seeds_differ() {
        let slot = |start| WorkerSlot {
            outer: 0,
            inner: 0,
            range: WorkRange::new(start, start + 4),
        };
        assert_ne!(worker_seed(7, &slot(1)), worker_seed(7, &slot(5)));
        assert_eq!(worker_seed(7, &slot(5)), worker_seed(7, &slot(5)));
    }
}

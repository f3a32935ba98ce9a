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


// Benchmark of the harness's own overhead, independent of any real store.
//
// Measures:
//   1. Phase dispatch: two-level fan-out and barrier drain with no-op workers
//   2. Result recording: concurrent atomic append-and-average on one run
//   3. Variant evaluation: each pipeline against a small generated dataset
//
// Run with: cargo bench --package pipebench-harness --bench coordination

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use chrono::Utc;
use pipebench_harness::ConnectionPool;
use pipebench_harness::Error;
use pipebench_harness::MemoryStore;
use pipebench_harness::PipelineVariant;
use pipebench_harness::Store;
use pipebench_harness::config::Config;
use pipebench_harness::coordinator::Phase;
use pipebench_harness::loader;
use pipebench_harness::pipeline::QueryParams;
use pipebench_harness::results::InstanceResult;
use pipebench_harness::results::ResultAggregator;
use pipebench_harness::variant::QUERY_COLLECTION;
use rand::SeedableRng;
use rand::rngs::StdRng;

const PHASE_ITERATIONS: u64 = 200;
const RECORDS: usize = 2_000;
const QUERIES: u64 = 200;

fn format_duration(d: Duration, iterations: u64) -> String {
    let nanos_per_op = d.as_nanos() as f64 / iterations as f64;
    if nanos_per_op < 1000.0 {
        format!("{nanos_per_op:.1} ns/op")
    } else if nanos_per_op < 1_000_000.0 {
        format!("{:.2} µs/op", nanos_per_op / 1000.0)
    } else {
        format!("{:.2} ms/op", nanos_per_op / 1_000_000.0)
    }
}

fn print_result(label: &str, d: Duration, iterations: u64) {
    println!(
        "  {label:<38} {:<16} (total: {d:?})",
        format_duration(d, iterations)
    );
}

// ---------------------------------------------------------------------------
// Benchmark: phase dispatch with no-op workers
// ---------------------------------------------------------------------------

async fn bench_phase_dispatch() {
    println!("Phase Dispatch (no-op workers, {PHASE_ITERATIONS} phases per shape)");
    println!("{}", "-".repeat(74));

    for (outer, inner) in [(1, 1), (4, 4), (8, 16), (32, 32)] {
        let phase = Phase::builder()
            .name("noop")
            .total(outer * inner * 4)
            .outer_workers(outer)
            .inner_workers(inner)
            .build();
        let start = Instant::now();
        for _ in 0..PHASE_ITERATIONS {
            let r = phase
                .run(
                    |_, _| async { Ok::<_, Error>(()) },
                    |slot, ()| async move { Ok::<_, Error>(std::hint::black_box(slot.range.len())) },
                )
                .await;
            if let Err(e) = r {
                println!("  {outer}x{inner}: failed: {e}");
                return;
            }
        }
        print_result(
            &format!("{outer} outer x {inner} inner"),
            start.elapsed(),
            PHASE_ITERATIONS,
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// Benchmark: concurrent result recording
// ---------------------------------------------------------------------------

async fn bench_record(writers: usize) {
    println!("Result Recording ({writers} writers, {RECORDS} samples)");
    println!("{}", "-".repeat(74));

    let store = MemoryStore::default();
    let conn = match store.connect(store.primary_endpoint()).await {
        Ok(c) => c,
        Err(e) => {
            println!("  connect failed: {e}");
            return;
        }
    };
    let agg = ResultAggregator::new(conn, "Results");
    if let Err(e) = agg.create_run("bench").await {
        println!("  create failed: {e}");
        return;
    }

    let start = Instant::now();
    let mut handles = Vec::with_capacity(writers);
    for w in 0..writers {
        let agg = agg.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..RECORDS / writers {
                let now = Utc::now();
                let sample = InstanceResult::new(now, now, 1, w + 1, "Boise", "Roku");
                agg.record("bench", &sample).await?;
            }
            Ok::<_, Error>(())
        }));
    }
    for h in handles {
        if let Ok(Err(e)) = h.await {
            println!("  record failed: {e}");
        }
    }
    print_result("append + average", start.elapsed(), RECORDS as u64);
    println!();
}

// ---------------------------------------------------------------------------
// Benchmark: pipeline variants against the in-memory store
// ---------------------------------------------------------------------------

async fn bench_variants(profiles: usize) {
    println!("Variant Evaluation ({profiles} profiles, {QUERIES} queries per variant)");
    println!("{}", "-".repeat(74));

    let store = MemoryStore::default();
    let pool = ConnectionPool::new(Arc::new(store.clone()));
    let config = match Config::builder()
        .outer_workers(2)
        .inner_workers(2)
        .profiles(profiles)
        .seed(Some(1))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            println!("  invalid config: {e}");
            return;
        }
    };
    if let Err(e) = loader::load(&pool, &config).await {
        println!("  load failed: {e}");
        return;
    }
    let conn = match pool.primary().await {
        Ok(c) => c,
        Err(e) => {
            println!("  connect failed: {e}");
            return;
        }
    };

    for variant in PipelineVariant::ALL {
        let mut rng = StdRng::seed_from_u64(7);
        let start = Instant::now();
        for _ in 0..QUERIES {
            let pipeline = variant.pipeline(&QueryParams::random(&mut rng));
            let rows = conn.aggregate(QUERY_COLLECTION, &pipeline).await;
            std::hint::black_box(rows.map(|r| r.len()).unwrap_or_default());
        }
        print_result(variant.name(), start.elapsed(), QUERIES);
    }
    println!();
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    println!();
    println!("Harness Coordination Benchmark");
    println!("==============================");
    println!();

    bench_phase_dispatch().await;
    bench_record(1).await;
    bench_record(8).await;
    bench_record(50).await;
    bench_variants(400).await;
    bench_variants(4_000).await;
}

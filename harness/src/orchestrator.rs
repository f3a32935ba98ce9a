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

//! Sequencing of the benchmark: one timed phase per pipeline variant.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Result;
use crate::config::Config;
use crate::coordinator::Phase;
use crate::coordinator::WorkerSlot;
use crate::loader;
use crate::loader::LoadReport;
use crate::pipeline::QueryParams;
use crate::pool::ConnectionPool;
use crate::results::InstanceResult;
use crate::results::ResultAggregator;
use crate::store::Connection;
use crate::store::ExplainRequest;
use crate::variant::PipelineVariant;
use crate::variant::QUERY_COLLECTION;
use crate::warmup::warm_caches;

/// Outcome of one variant's timed phase
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSummary {
    pub name: String,
    pub duration_millis: u64,
    pub samples: usize,
    pub average_millis: Option<f64>,
    pub explained: bool,
}

impl fmt::Display for BenchmarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} samples in {}ms",
            self.name, self.samples, self.duration_millis
        )?;
        if let Some(avg) = self.average_millis {
            write!(f, ", {avg:.2}ms average")?;
        }
        Ok(())
    }
}

/// Everything a `run` did
#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub load: Option<LoadReport>,
    pub benchmarks: Vec<BenchmarkSummary>,
}

/// Make `indexes` on the queried collection visible for the duration of `body`.
///
/// Indexes made visible are hidden again on every exit path.  An error from `body` takes
/// precedence over one from restoring visibility.
pub async fn with_visible_indexes<T, F>(
    conn: &dyn Connection,
    indexes: &[String],
    body: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let mut shown = Vec::with_capacity(indexes.len());
    let mut toggled = Ok(());
    for name in indexes {
        match conn
            .set_index_visibility(QUERY_COLLECTION, name, false)
            .await
        {
            Ok(()) => shown.push(name),
            Err(e) => {
                toggled = Err(e);
                break;
            }
        }
    }

    let out = match toggled {
        Ok(()) => body.await,
        Err(e) => Err(e),
    };

    let mut restored = Ok(());
    for name in shown.into_iter().rev() {
        if let Err(err) = conn
            .set_index_visibility(QUERY_COLLECTION, name, true)
            .await
        {
            warn!(index = name.as_str(), %err, "failed to hide index");
            if restored.is_ok() {
                restored = Err(err);
            }
        }
    }
    let v = out?;
    restored?;
    Ok(v)
}

/// Runs the selected pipeline variants one after another, in table order.
#[derive(Clone, Debug)]
pub struct BenchmarkOrchestrator {
    pool: ConnectionPool,
    config: Arc<Config>,
    variants: Vec<PipelineVariant>,
}

impl BenchmarkOrchestrator {
    pub fn new(pool: ConnectionPool, config: Arc<Config>) -> Self {
        Self {
            pool,
            config,
            variants: PipelineVariant::ALL.to_vec(),
        }
    }

    /// Restrict the run to `variants`.  Execution order stays that of the variant table.
    #[must_use]
    pub fn variants(mut self, mut variants: Vec<PipelineVariant>) -> Self {
        variants.sort();
        variants.dedup();
        self.variants = variants;
        self
    }

    pub fn selected(&self) -> &[PipelineVariant] {
        &self.variants
    }

    /// Drop previous results, then load and benchmark as the configuration asks
    pub async fn run(&self) -> Result<RunReport> {
        let primary = self.pool.primary().await?;
        ResultAggregator::new(primary, self.config.results_collection())
            .drop_all()
            .await?;

        let mut report = RunReport::default();
        if self.config.reload_data() {
            report.load = Some(loader::load(&self.pool, &self.config).await?);
        }
        if self.config.run_tests() {
            report.benchmarks = self.bench().await?;
        }
        Ok(report)
    }

    /// Time every selected variant
    pub async fn bench(&self) -> Result<Vec<BenchmarkSummary>> {
        let primary = self.pool.primary().await?;
        let results = ResultAggregator::new(Arc::clone(&primary), self.config.results_collection());

        let mut summaries = Vec::with_capacity(self.variants.len());
        let mut shape: Option<Vec<String>> = None;
        for &variant in &self.variants {
            let indexes = variant.required_indexes();
            if shape.as_ref() != Some(&indexes) {
                debug!(%variant, ?indexes, "index shape changed, warming caches");
                warm_caches(&self.pool).await?;
            }
            let summary = with_visible_indexes(
                primary.as_ref(),
                &indexes,
                self.run_variant(variant, &primary, &results),
            )
            .await?;
            info!(%summary, "variant complete");
            summaries.push(summary);
            shape = Some(indexes);
        }
        Ok(summaries)
    }

    async fn run_variant(
        &self,
        variant: PipelineVariant,
        primary: &Arc<dyn Connection>,
        results: &ResultAggregator,
    ) -> Result<BenchmarkSummary> {
        let name = variant.name();
        results.create_run(name).await?;

        let conns = Arc::new(self.pool.dedicated_nodes(self.config.outer_workers()).await?);
        let phase = Phase::builder()
            .name(name)
            .total(self.config.test_runs())
            .outer_workers(self.config.outer_workers())
            .inner_workers(self.config.inner_workers())
            .build();

        let seed = self.config.seed();
        let worker_results = results.clone();
        let primary = Arc::clone(primary);
        let start = Utc::now();
        phase
            .run(
                move |outer, _| {
                    let conns = Arc::clone(&conns);
                    async move { Ok::<_, crate::Error>(Arc::clone(&conns[outer])) }
                },
                move |slot, conn| {
                    let worker = Worker {
                        variant,
                        slot,
                        conn,
                        primary: Arc::clone(&primary),
                        results: worker_results.clone(),
                    };
                    worker.run(seed)
                },
            )
            .await?;
        let end = Utc::now();

        let run = results.finalize(name, start, end).await?;
        Ok(BenchmarkSummary {
            name: run.test_name,
            duration_millis: run.duration_millis.unwrap_or_default(),
            samples: run.instance_results.len(),
            average_millis: run.instance_average,
            explained: run.explain_plan.is_some(),
        })
    }
}

/// One inner worker of a variant's phase
struct Worker {
    variant: PipelineVariant,
    slot: WorkerSlot,
    /// Shared with the other inner workers of the same outer worker
    conn: Arc<dyn Connection>,
    primary: Arc<dyn Connection>,
    results: ResultAggregator,
}

impl Worker {
    async fn run(self, seed: Option<u64>) -> Result<()> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(self.slot.range.start as u64)),
            None => StdRng::from_entropy(),
        };
        let name = self.variant.name();
        for i in self.slot.range.units() {
            let params = QueryParams::random(&mut rng);
            let pipeline = self.variant.pipeline(&params);

            let start = Utc::now();
            let rows = self.conn.aggregate(QUERY_COLLECTION, &pipeline).await?;
            let end = Utc::now();
            debug!(slot = %self.slot, iteration = i, rows = rows.len(), "query done");

            let sample = InstanceResult::new(
                start,
                end,
                self.slot.outer + 1,
                self.slot.inner + 1,
                params.city,
                params.device_name,
            );
            self.results.record(name, &sample).await?;

            if self.slot.is_first() && i + 1 == self.slot.range.end {
                let request = ExplainRequest::builder()
                    .collection(QUERY_COLLECTION)
                    .pipeline(pipeline)
                    .build();
                let plan = self.primary.run_diagnostic(&request).await?;
                self.results.attach_diagnostic(name, plan).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::store::MemoryStore;
    use crate::store::Store;

    async fn setup() -> anyhow::Result<(MemoryStore, ConnectionPool)> {
        let store = MemoryStore::default();
        let pool = ConnectionPool::new(Arc::new(store.clone()));
        let conn = store.connect(store.primary_endpoint()).await?;
        for (collection, spec) in crate::variant::benchmark_indexes() {
            conn.create_index(collection, &spec).await?;
        }
        Ok((store, pool))
    }

    #[test_log::test(tokio::test)]
    async fn test_visible_only_inside_body() -> anyhow::Result<()> {
        let (store, pool) = setup().await?;
        let conn = pool.primary().await?;
        let indexes = PipelineVariant::IndexSort.required_indexes();
        let seen = with_visible_indexes(conn.as_ref(), &indexes, async {
            Ok::<_, Error>(store.index_hidden(QUERY_COLLECTION, &indexes[0]).await)
        })
        .await?;
        assert_eq!(Some(false), seen);
        assert_eq!(
            Some(true),
            store.index_hidden(QUERY_COLLECTION, &indexes[0]).await
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_hidden_again_after_failure() -> anyhow::Result<()> {
        let (store, pool) = setup().await?;
        let conn = pool.primary().await?;
        let indexes = PipelineVariant::NoMapping.required_indexes();
        let r: Result<()> = with_visible_indexes(conn.as_ref(), &indexes, async {
            Err(Error::query(QUERY_COLLECTION, "boom"))
        })
        .await;
        assert!(matches!(r, Err(Error::Query { .. })));
        assert_eq!(
            Some(true),
            store.index_hidden(QUERY_COLLECTION, &indexes[0]).await
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_index_restores_earlier_toggles() -> anyhow::Result<()> {
        let (store, pool) = setup().await?;
        let conn = pool.primary().await?;
        let indexes = vec![
            PipelineVariant::NoMapping.required_indexes().remove(0),
            "missing_1".to_string(),
        ];
        let r = with_visible_indexes(conn.as_ref(), &indexes, async { Ok::<_, Error>(()) }).await;
        assert!(matches!(r, Err(Error::Admin(_))));
        assert_eq!(
            Some(true),
            store.index_hidden(QUERY_COLLECTION, &indexes[0]).await
        );
        Ok(())
    }

    #[test]
    fn test_variants_keep_table_order() -> anyhow::Result<()> {
        let config = Config::builder().build()?;
        let o = BenchmarkOrchestrator::new(
            ConnectionPool::new(Arc::new(MemoryStore::default())),
            config,
        )
        .variants(vec![PipelineVariant::IndexSort, PipelineVariant::NoUnwinds]);
        assert_eq!(
            &[PipelineVariant::NoUnwinds, PipelineVariant::IndexSort],
            o.selected()
        );
        Ok(())
    }

    #[test]
    fn test_summary_display() {
        let s = BenchmarkSummary {
            name: "noMapping".into(),
            duration_millis: 40,
            samples: 4,
            average_millis: Some(2.5),
            explained: true,
        };
        assert_eq!("noMapping: 4 samples in 40ms, 2.50ms average", s.to_string());
    }
}

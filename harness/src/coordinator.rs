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

//! Two-level fan-out of one phase of work.
//!
//! The phase's units are partitioned across outer workers.  Each outer worker prepares a
//! resource shared by its inner workers (a connection, typically), partitions its own range
//! across them and waits on its own barrier.  The initiator waits on the outer barrier.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bon::Builder;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;

use crate::Error;
use crate::Result;
use crate::barrier::PhaseBarrier;
use crate::partition::WorkRange;
use crate::partition::partition;

/// Position of one inner worker.  Indices are zero-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerSlot {
    pub outer: usize,
    pub inner: usize,
    pub range: WorkRange,
}

impl WorkerSlot {
    pub fn is_first(&self) -> bool {
        self.outer == 0 && self.inner == 0
    }
}

impl fmt::Display for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.outer + 1, self.inner + 1, self.range)
    }
}

#[derive(Builder, Clone, Debug)]
#[builder(on(String, into))]
pub struct Phase {
    name: String,
    #[builder(default = 0)]
    base: usize,
    total: usize,
    outer_workers: usize,
    inner_workers: usize,
}

impl Phase {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the phase to completion.
    ///
    /// `setup` runs once per outer worker with that worker's index and range; its output is
    /// cloned into each of the worker's inner workers.  `work` runs once per inner worker.  The
    /// returned outputs are ordered by worker position.  The first error from any worker is
    /// returned as soon as it is reported; siblings are left running.
    pub async fn run<R, T, S, SF, W, WF>(&self, setup: S, work: W) -> Result<Vec<(WorkerSlot, T)>>
    where
        R: Clone + Send + Sync + 'static,
        T: Send + 'static,
        S: Fn(usize, WorkRange) -> SF + Send + Sync + 'static,
        SF: Future<Output = Result<R>> + Send + 'static,
        W: Fn(WorkerSlot, R) -> WF + Send + Sync + 'static,
        WF: Future<Output = Result<T>> + Send + 'static,
    {
        let started = Instant::now();
        let workers = self.outer_workers.checked_mul(self.inner_workers).ok_or_else(|| {
            Error::invalid_config(format!(
                "phase {} has too many workers ({} x {})",
                self.name, self.outer_workers, self.inner_workers
            ))
        })?;
        let ranges = partition(self.base, self.total, self.outer_workers)?;
        // validate the inner level before anything starts
        if let Some(first) = ranges.first() {
            first.split(self.inner_workers)?;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let setup = Arc::new(setup);
        let work = Arc::new(work);
        let master = PhaseBarrier::new(format!("{} master", self.name));
        for (outer, range) in ranges.into_iter().enumerate() {
            let token = master.completion(format!("{} outer {}", self.name, outer + 1));
            let name = self.name.clone();
            let inner_workers = self.inner_workers;
            let setup = Arc::clone(&setup);
            let work = Arc::clone(&work);
            let tx = tx.clone();
            tokio::spawn(async move {
                let r = outer_worker(name, outer, range, inner_workers, setup, work, tx).await;
                token.complete(r);
            });
        }
        drop(tx);

        master.wait().await?;

        let mut outputs = Vec::with_capacity(workers);
        while let Ok(item) = rx.try_recv() {
            outputs.push(item);
        }
        outputs.sort_by_key(|(slot, _): &(WorkerSlot, T)| *slot);
        info!(
            phase = self.name.as_str(),
            workers = outputs.len(),
            elapsed = ?started.elapsed(),
            "phase complete"
        );
        Ok(outputs)
    }
}

async fn outer_worker<R, T, S, SF, W, WF>(
    name: String,
    outer: usize,
    range: WorkRange,
    inner_workers: usize,
    setup: Arc<S>,
    work: Arc<W>,
    tx: mpsc::UnboundedSender<(WorkerSlot, T)>,
) -> Result<()>
where
    R: Clone + Send + Sync + 'static,
    T: Send + 'static,
    S: Fn(usize, WorkRange) -> SF + Send + Sync + 'static,
    SF: Future<Output = Result<R>> + Send + 'static,
    W: Fn(WorkerSlot, R) -> WF + Send + Sync + 'static,
    WF: Future<Output = Result<T>> + Send + 'static,
{
    let resource = setup(outer, range).await?;
    let sub = PhaseBarrier::new(format!("{name} sub {}", outer + 1));
    for (inner, r) in range.split(inner_workers)?.into_iter().enumerate() {
        let slot = WorkerSlot {
            outer,
            inner,
            range: r,
        };
        let token = sub.completion(format!("{name} {}.{}", outer + 1, inner + 1));
        let work = Arc::clone(&work);
        let resource = resource.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            debug!(%slot, "inner worker started");
            let r = work(slot, resource).await.map(|output| {
                // the receiver outlives every worker of a successful phase
                let _ = tx.send((slot, output));
            });
            token.complete(r);
        });
    }
    sub.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::time::timeout;

    const LIMIT: Duration = Duration::from_secs(5);

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn test_every_slot_runs_once() -> anyhow::Result<()> {
        let setups = Arc::new(AtomicUsize::new(0));
        let phase = Phase::builder()
            .name("load")
            .base(1)
            .total(8)
            .outer_workers(2)
            .inner_workers(2)
            .build();
        let counter = Arc::clone(&setups);
        let out = timeout(
            LIMIT,
            phase.run(
                move |outer, range| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(4, range.len());
                        Ok(format!("conn-{outer}"))
                    }
                },
                |slot, conn: String| async move {
                    assert_eq!(format!("conn-{}", slot.outer), conn);
                    Ok(slot.range.len())
                },
            ),
        )
        .await??;

        assert_eq!(2, setups.load(Ordering::SeqCst));
        assert_eq!(4, out.len());
        let ranges: Vec<_> = out.iter().map(|(s, _)| s.range).collect();
        assert_eq!(
            vec![
                WorkRange::new(1, 3),
                WorkRange::new(3, 5),
                WorkRange::new(5, 7),
                WorkRange::new(7, 9)
            ],
            ranges
        );
        assert_eq!(8, out.iter().map(|(_, n)| n).sum::<usize>());
        assert!(out[0].0.is_first());
        Ok(())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn test_truncated_units_are_not_scheduled() -> anyhow::Result<()> {
        let phase = Phase::builder()
            .name("uneven")
            .total(10)
            .outer_workers(2)
            .inner_workers(2)
            .build();
        let out = timeout(
            LIMIT,
            phase.run(
                |_, _| async { Ok(()) },
                |slot, ()| async move { Ok(slot.range.len()) },
            ),
        )
        .await??;
        // 10 / 2 = 5 per outer worker, 5 / 2 = 2 per inner worker
        assert_eq!(8, out.iter().map(|(_, n)| n).sum::<usize>());
        Ok(())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn test_first_error_is_returned() -> anyhow::Result<()> {
        let phase = Phase::builder()
            .name("failing")
            .total(4)
            .outer_workers(2)
            .inner_workers(2)
            .build();
        let r = timeout(
            LIMIT,
            phase.run(
                |_, _| async { Ok(()) },
                |slot, ()| async move {
                    if slot.outer == 1 && slot.inner == 0 {
                        return Err(Error::query("Profiles", "boom"));
                    }
                    Ok(())
                },
            ),
        )
        .await?;
        assert!(matches!(r, Err(Error::Query { .. })));
        Ok(())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn test_setup_error_is_returned() -> anyhow::Result<()> {
        let phase = Phase::builder()
            .name("no-connection")
            .total(4)
            .outer_workers(2)
            .inner_workers(1)
            .build();
        let r = timeout(
            LIMIT,
            phase.run(
                |outer, _| async move {
                    Err::<(), _>(Error::connection(format!("memory://node-{outer}"), "refused"))
                },
                |_, ()| async { Ok(()) },
            ),
        )
        .await?;
        assert!(matches!(r, Err(Error::Connection { .. })));
        Ok(())
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn test_panicking_worker_is_reported() -> anyhow::Result<()> {
        let phase = Phase::builder()
            .name("panicking")
            .total(2)
            .outer_workers(1)
            .inner_workers(2)
            .build();
        let r = timeout(
            LIMIT,
            phase.run(
                |_, _| async { Ok(()) },
                |slot, ()| async move {
                    if slot.inner == 1 {
                        panic!("worker {slot} gave up");
                    }
                    Ok(())
                },
            ),
        )
        .await?;
        assert!(matches!(r, Err(Error::WorkerAborted(_))));
        Ok(())
    }

    #[test]
    fn test_invalid_worker_counts_rejected() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        for (outer, inner) in [(0, 1), (1, 0), (usize::MAX, 2)] {
            let phase = Phase::builder()
                .name("zero")
                .total(4)
                .outer_workers(outer)
                .inner_workers(inner)
                .build();
            let r = rt.block_on(phase.run(|_, _| async { Ok(()) }, |_, ()| async { Ok(()) }));
            assert!(matches!(r, Err(Error::InvalidConfiguration(_))));
        }
    }
}

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

//! A counting barrier for one phase of work.
//!
//! The initiator takes one [`Completion`] per worker before starting it, then waits.  The
//! barrier drains once every completion has been finished.  A worker that fails hands its error
//! to the barrier instead; the barrier stays undrained, but the waiting initiator is released
//! with the first error.  Dropping a completion without finishing it counts as a failure.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use tracing::warn;

use crate::Error;
use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierState {
    Idle,
    Dispatched { expected: usize, remaining: usize },
    Drained,
}

#[derive(Debug, Default)]
struct Progress {
    expected: usize,
    completed: usize,
    failure: Option<Error>,
}

impl Progress {
    fn drained(&self) -> bool {
        self.completed >= self.expected
    }
}

#[derive(Debug)]
pub struct PhaseBarrier {
    name: String,
    tx: Arc<watch::Sender<Progress>>,
}

impl PhaseBarrier {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(Progress::default());
        Self {
            name: name.into(),
            tx: Arc::new(tx),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register one more worker.  Must be called before the worker starts.
    pub fn completion(&self, label: impl Into<String>) -> Completion {
        self.tx.send_modify(|p| p.expected += 1);
        Completion {
            label: label.into(),
            tx: Arc::clone(&self.tx),
            done: false,
        }
    }

    pub fn state(&self) -> BarrierState {
        let p = self.tx.borrow();
        if p.expected == 0 {
            BarrierState::Idle
        } else if p.drained() {
            BarrierState::Drained
        } else {
            BarrierState::Dispatched {
                expected: p.expected,
                remaining: p.expected - p.completed,
            }
        }
    }

    /// Block until every registered worker has finished, or return the first reported failure.
    /// Returns immediately when nothing was registered.
    pub async fn wait(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let failed = rx
            .wait_for(|p| p.failure.is_some() || p.drained())
            .await
            .map(|p| p.failure.is_some())
            .map_err(|e| Error::Custom(format!("barrier {} closed: {e}", self.name)))?;

        if !failed {
            debug!(barrier = self.name.as_str(), "drained");
            return Ok(());
        }
        let mut failure = None;
        self.tx.send_if_modified(|p| {
            failure = p.failure.take();
            false
        });
        Err(failure.unwrap_or_else(|| Error::WorkerAborted(self.name.clone())))
    }
}

/// A worker's obligation to report back to its [`PhaseBarrier`]
pub struct Completion {
    label: String,
    tx: Arc<watch::Sender<Progress>>,
    done: bool,
}

impl Completion {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn finish(mut self) {
        self.done = true;
        self.tx.send_modify(|p| p.completed += 1);
    }

    pub fn fail(mut self, err: Error) {
        self.done = true;
        self.report(err);
    }

    pub fn complete(self, r: Result<()>) {
        match r {
            Ok(()) => self.finish(),
            Err(e) => self.fail(e),
        }
    }

    fn report(&self, err: Error) {
        warn!(worker = self.label.as_str(), %err, "worker failed");
        self.tx.send_modify(|p| {
            if p.failure.is_none() {
                p.failure = Some(err);
            }
        });
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("label", &self.label)
            .field("done", &self.done)
            .finish()
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            self.report(Error::WorkerAborted(self.label.clone()));
        }
    }
}

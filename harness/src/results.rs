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

//! Benchmark result records and the aggregator that maintains them.

use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::info;

use crate::Document;
use crate::Error;
use crate::Result;
use crate::store::Connection;
use crate::store::UpdateOp;
use crate::store::filter;

pub const LOAD_RUN_NAME: &str = "Data Load";

const TEST_NAME: &str = "testName";
const INSTANCE_RESULTS: &str = "instanceResults";
const INSTANCE_AVERAGE: &str = "instanceAverage";
const DURATION_MILLIS: &str = "durationMillis";

/// Whole milliseconds from `start` to `end`, zero if `end` is earlier
pub fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}

/// Timing of one query executed by one inner worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResult {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_millis: u64,
    /// 1-based
    pub outer_worker_index: usize,
    /// 1-based
    pub inner_worker_index: usize,
    /// City queried
    pub tag1: String,
    /// Device name queried
    pub tag2: String,
}

impl InstanceResult {
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        outer_worker_index: usize,
        inner_worker_index: usize,
        tag1: impl Into<String>,
        tag2: impl Into<String>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            duration_millis: millis_between(start_time, end_time),
            outer_worker_index,
            inner_worker_index,
            tag1: tag1.into(),
            tag2: tag2.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkRun {
    pub test_name: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_millis: Option<u64>,
    #[serde(default)]
    pub instance_results: Vec<InstanceResult>,
    #[serde(default)]
    pub instance_average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain_plan: Option<Document>,
}

impl BenchmarkRun {
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ..Default::default()
        }
    }

    fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(m) => Ok(m),
            other => Err(Error::Custom(format!("run serialized to {other}"))),
        }
    }
}

/// Maintains [`BenchmarkRun`] records in the results collection.
///
/// Every worker of a phase calls [`ResultAggregator::record`] on the same run; each call is a
/// single atomic update, so the stored average always matches the stored samples.
#[derive(Clone, Debug)]
pub struct ResultAggregator {
    conn: Arc<dyn Connection>,
    collection: String,
}

impl ResultAggregator {
    pub fn new(conn: Arc<dyn Connection>, collection: impl Into<String>) -> Self {
        Self {
            conn,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn by_name(test_name: &str) -> Document {
        filter([(TEST_NAME, test_name)])
    }

    pub async fn drop_all(&self) -> Result<()> {
        info!(collection = self.collection.as_str(), "dropping previous results");
        self.conn.drop_collection(&self.collection).await
    }

    /// Insert an empty run.  Fails if a run with the same name exists.
    pub async fn create_run(&self, test_name: &str) -> Result<()> {
        if self
            .conn
            .find_one(&self.collection, &Self::by_name(test_name))
            .await?
            .is_some()
        {
            return Err(Error::DuplicateRun(test_name.to_string()));
        }
        let doc = BenchmarkRun::new(test_name).to_document()?;
        self.conn.insert_one(&self.collection, doc).await
    }

    /// Append one sample and recompute the running average, as one atomic update
    pub async fn record(&self, test_name: &str, result: &InstanceResult) -> Result<()> {
        let sample = serde_json::to_value(result)?;
        let update = [
            UpdateOp::push(INSTANCE_RESULTS, sample),
            UpdateOp::average(INSTANCE_AVERAGE, INSTANCE_RESULTS, DURATION_MILLIS),
        ];
        self.conn
            .atomic_update(&self.collection, &Self::by_name(test_name), &update)
            .await
            .map_err(|e| match e {
                Error::Write { inserted: 0, .. } => Error::RunNotFound(test_name.to_string()),
                other => other,
            })
    }

    pub async fn attach_diagnostic(&self, test_name: &str, plan: Document) -> Result<()> {
        debug!(test_name, "attaching query plan");
        self.conn
            .atomic_update(
                &self.collection,
                &Self::by_name(test_name),
                &[UpdateOp::set("explainPlan", Value::Object(plan))],
            )
            .await
    }

    /// Record the run's wall-clock bounds and return the finished run
    pub async fn finalize(
        &self,
        test_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BenchmarkRun> {
        let update = [
            UpdateOp::set("startTime", serde_json::to_value(start)?),
            UpdateOp::set("endTime", serde_json::to_value(end)?),
            UpdateOp::set(DURATION_MILLIS, millis_between(start, end)),
        ];
        self.conn
            .atomic_update(&self.collection, &Self::by_name(test_name), &update)
            .await?;
        self.fetch(test_name).await
    }

    pub async fn fetch(&self, test_name: &str) -> Result<BenchmarkRun> {
        let doc = self
            .conn
            .find_one(&self.collection, &Self::by_name(test_name))
            .await?
            .ok_or_else(|| Error::RunNotFound(test_name.to_string()))?;
        Ok(serde_json::from_value(Value::Object(doc))?)
    }

    /// Write the timing-only record of a data load
    pub async fn record_load(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
        let run = BenchmarkRun {
            start_time: Some(start),
            end_time: Some(end),
            duration_millis: Some(millis_between(start, end)),
            ..BenchmarkRun::new(LOAD_RUN_NAME)
        };
        self.conn
            .insert_one(&self.collection, run.to_document()?)
            .await
    }
}

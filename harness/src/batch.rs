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

use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::Document;
use crate::Result;
use crate::store::Connection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Profiles,
    Devices,
    Mappings,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Profiles, Category::Devices, Category::Mappings];

    pub fn collection(&self) -> &'static str {
        match self {
            Category::Profiles => "Profiles",
            Category::Devices => "Devices",
            Category::Mappings => "Mappings",
        }
    }

    fn index(self) -> usize {
        match self {
            Category::Profiles => 0,
            Category::Devices => 1,
            Category::Mappings => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// Outcome of one bulk write
#[derive(Debug)]
pub struct FlushReport {
    pub category: Category,
    pub attempted: usize,
    pub inserted: usize,
    /// A rejected write, tolerated and logged
    pub error: Option<crate::Error>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub flushes: usize,
    pub attempted: usize,
    pub inserted: usize,
    pub failed_flushes: usize,
}

impl AddAssign for CategoryStats {
    fn add_assign(&mut self, rhs: Self) {
        self.flushes += rhs.flushes;
        self.attempted += rhs.attempted;
        self.inserted += rhs.inserted;
        self.failed_flushes += rhs.failed_flushes;
    }
}

/// Per-category totals across any number of flushes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchStats {
    categories: [CategoryStats; 3],
}

impl BatchStats {
    pub fn get(&self, category: Category) -> &CategoryStats {
        &self.categories[category.index()]
    }

    pub fn record(&mut self, report: &FlushReport) {
        let s = &mut self.categories[report.category.index()];
        s.flushes += 1;
        s.attempted += report.attempted;
        s.inserted += report.inserted;
        if report.error.is_some() {
            s.failed_flushes += 1;
        }
    }

    pub fn merge(&mut self, other: &BatchStats) {
        for (mine, theirs) in self.categories.iter_mut().zip(other.categories) {
            *mine += theirs;
        }
    }

    pub fn failed_flushes(&self) -> usize {
        self.categories.iter().map(|s| s.failed_flushes).sum()
    }
}

/// Per-worker document buffers, one per [`Category`], written in bulk.
///
/// A buffer is flushed as soon as it holds `threshold` documents; [`BatchAccumulator::finish`]
/// writes whatever is left.  Rejected writes are logged and skipped, any other store error is
/// returned.
#[derive(Debug)]
pub struct BatchAccumulator {
    conn: Arc<dyn Connection>,
    threshold: usize,
    debug: bool,
    buffers: [Vec<Document>; 3],
    stats: BatchStats,
}

impl BatchAccumulator {
    pub fn new(conn: Arc<dyn Connection>, threshold: usize, debug: bool) -> Self {
        let threshold = threshold.max(1);
        Self {
            conn,
            threshold,
            debug,
            buffers: Default::default(),
            stats: BatchStats::default(),
        }
    }

    pub fn len(&self, category: Category) -> usize {
        self.buffers[category.index()].len()
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    pub async fn add(&mut self, category: Category, document: Document) -> Result<()> {
        let buffer = &mut self.buffers[category.index()];
        buffer.push(document);
        if buffer.len() >= self.threshold {
            self.flush(category).await?;
        }
        Ok(())
    }

    pub async fn flush(&mut self, category: Category) -> Result<FlushReport> {
        let documents = std::mem::take(&mut self.buffers[category.index()]);
        let attempted = documents.len();
        let mut report = FlushReport {
            category,
            attempted,
            inserted: 0,
            error: None,
        };
        if attempted == 0 {
            return Ok(report);
        }

        match self
            .conn
            .bulk_insert(category.collection(), documents, false)
            .await
        {
            Ok(inserted) => {
                report.inserted = inserted;
                if self.debug {
                    debug!(%category, inserted, "batch written");
                }
            }
            Err(err) if !err.is_fatal() => {
                report.inserted = err.partially_written().unwrap_or_default();
                warn!(%category, attempted, inserted = report.inserted, %err, "bulk write rejected");
                report.error = Some(err);
            }
            Err(err) => return Err(err),
        }
        self.stats.record(&report);
        Ok(report)
    }

    /// Flush every non-empty buffer.  Called at the end of the owning worker's range.
    pub async fn finish(mut self) -> Result<BatchStats> {
        for category in Category::ALL {
            if self.len(category) > 0 {
                self.flush(category).await?;
            }
        }
        Ok(self.stats)
    }
}

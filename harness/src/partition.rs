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
use std::ops::Range;

use crate::Error;
use crate::Result;

/// Half-open interval of work units
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkRange {
    pub start: usize,
    pub end: usize,
}

impl WorkRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn units(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Split this range across `workers`, dropping any remainder
    pub fn split(&self, workers: usize) -> Result<Vec<WorkRange>> {
        partition(self.start, self.len(), workers)
    }
}

impl fmt::Display for WorkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Divide `[base, base + total)` into `workers` contiguous ranges of `total / workers` units.
///
/// The remainder `total % workers` is not assigned to anyone.
pub fn partition(base: usize, total: usize, workers: usize) -> Result<Vec<WorkRange>> {
    if workers == 0 {
        return Err(Error::invalid_config("cannot partition work across zero workers"));
    }
    let per_worker = total / workers;
    Ok((0..workers)
        .map(|i| {
            let start = base + i * per_worker;
            WorkRange::new(start, start + per_worker)
        })
        .collect())
}

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


use clap::Args;
use serde_json::json;

use super::CommandRunnable;
use super::print_json;
use crate::harness::BenchmarkOrchestrator;

#[derive(Args)]
pub struct RunCommand {}

#[async_trait::async_trait]
impl CommandRunnable for RunCommand {
    async fn run(self, ctx: &crate::Context) -> anyhow::Result<()> {
        let orchestrator =
            BenchmarkOrchestrator::new(ctx.pool().clone(), std::sync::Arc::clone(ctx.config()));
        let report = orchestrator.run().await?;
        if let Some(load) = &report.load {
            print_json(&json!({
                "testName": crate::harness::results::LOAD_RUN_NAME,
                "profiles": load.profiles,
                "durationMillis": load.duration_millis(),
                "failedFlushes": load.stats.failed_flushes(),
            }))?;
        }
        for summary in &report.benchmarks {
            print_json(summary)?;
        }
        if report.load.is_none() && report.benchmarks.is_empty() {
            tracing::warn!("nothing to do: both reload-data and run-tests are off");
        }
        Ok(())
    }
}

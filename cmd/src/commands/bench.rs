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


use std::sync::Arc;

use clap::Args;
use tracing::info;

use super::CommandRunnable;
use super::print_json;
use crate::harness::BenchmarkOrchestrator;
use crate::harness::PipelineVariant;
use crate::harness::loader;

#[derive(Args)]
pub struct BenchCommand {
    /// Variants to run, by name; all of them if omitted.  They always run in table order.
    #[arg(long, value_delimiter = ',')]
    variants: Vec<String>,
}

#[async_trait::async_trait]
impl CommandRunnable for BenchCommand {
    async fn run(self, ctx: &crate::Context) -> anyhow::Result<()> {
        let variants = PipelineVariant::select(&self.variants)?;
        // the in-process store starts empty
        if ctx.memory().is_some() {
            loader::load(ctx.pool(), ctx.config()).await?;
        }

        let orchestrator = BenchmarkOrchestrator::new(ctx.pool().clone(), Arc::clone(ctx.config()))
            .variants(variants);
        for summary in orchestrator.bench().await? {
            print_json(&summary)?;
        }

        if let Some(memory) = ctx.memory() {
            let mut aggregates: Vec<_> = memory.aggregates().await.into_iter().collect();
            aggregates.sort();
            info!(?aggregates, "queries served per endpoint");
        }
        Ok(())
    }
}

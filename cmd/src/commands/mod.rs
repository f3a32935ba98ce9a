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


use async_trait::async_trait;
use clap::Subcommand;

mod bench;
mod completions;
mod load;
mod run;
mod variants;

pub use bench::BenchCommand;
pub use completions::CompletionsCommand;
pub use load::LoadCommand;
pub use run::RunCommand;
pub use variants::VariantsCommand;

#[async_trait]
pub trait CommandRunnable {
    async fn run(self, ctx: &crate::Context) -> anyhow::Result<()>;
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate shell completions
    Completions(CompletionsCommand),

    /// Drop previous results, then load and benchmark as configured
    Run(RunCommand),

    /// Regenerate the dataset only
    Load(LoadCommand),

    /// Load, then benchmark the selected variants
    Bench(BenchCommand),

    /// List the pipeline variants and the indexes they use
    Variants(VariantsCommand),
}

#[async_trait]
impl CommandRunnable for Commands {
    async fn run(self, ctx: &crate::Context) -> anyhow::Result<()> {
        match self {
            Commands::Completions(cmd) => cmd.run(ctx).await,
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Load(cmd) => cmd.run(ctx).await,
            Commands::Bench(cmd) => cmd.run(ctx).await,
            Commands::Variants(cmd) => cmd.run(ctx).await,
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

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


use std::path::PathBuf;
use std::time::Duration;

use clap::ArgAction;
use clap::Parser;
use tracing::error;

use pipebench_harness as harness;

mod commands;
use commands::CommandRunnable;
use commands::Commands;

mod context;
use context::Context;

mod log;
use log::LogArgs;

#[derive(Parser)]
#[command(
    name = "pipebench",
    version,
    about = "load a synthetic household dataset and benchmark pipeline variants against it"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    log: LogArgs,

    /// MongoDB connection string; `mongodb+srv://` strings are resolved to every member.
    /// Without one, an in-process store is used.
    #[arg(long, global = true, env = "MONGODB_URI", hide_env_values = true)]
    uri: Option<String>,

    /// Simulated replica nodes of the in-process store
    #[arg(long, global = true, default_value_t = 3)]
    nodes: usize,

    /// Simulated latency added to every in-process store operation, e.g. "2ms"
    #[arg(long, global = true, value_parser = humantime::parse_duration)]
    latency: Option<Duration>,

    #[arg(long, global = true, env = "MONGODB_DB_NAME", default_value = "pipebench")]
    database: String,

    /// Connections per phase; each is shared by its inner workers
    #[arg(long, global = true, env = "PIPEBENCH_OUTER_WORKERS", default_value_t = num_cpus::get())]
    outer_workers: usize,

    /// Concurrent workers per outer worker
    #[arg(long, global = true, env = "PIPEBENCH_INNER_WORKERS", default_value_t = 4)]
    inner_workers: usize,

    /// Profiles to generate; should divide by outer * inner workers
    #[arg(long, global = true, env = "PIPEBENCH_PROFILES", default_value_t = 10_000)]
    profiles: usize,

    /// Queries per variant; should divide by outer * inner workers
    #[arg(long, global = true, env = "PIPEBENCH_TEST_RUNS", default_value_t = 1_000)]
    test_runs: usize,

    #[arg(long, global = true, env = "PIPEBENCH_RESULTS_COLLECTION", default_value = harness::config::DEFAULT_RESULTS_COLLECTION)]
    results_collection: String,

    /// Documents buffered per collection before a bulk write
    #[arg(long, global = true, env = "PIPEBENCH_BATCH_SIZE", default_value_t = harness::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Regenerate the dataset before benchmarking (`run` only)
    #[arg(long, global = true, env = "PIPEBENCH_RELOAD_DATA", default_value_t = true, action = ArgAction::Set)]
    reload_data: bool,

    /// Benchmark after loading (`run` only)
    #[arg(long, global = true, env = "PIPEBENCH_RUN_TESTS", default_value_t = true, action = ArgAction::Set)]
    run_tests: bool,

    /// Log every bulk write
    #[arg(long, global = true, env = "PIPEBENCH_DEBUG", default_value_t = false)]
    debug: bool,

    /// Make generated data and query parameters reproducible
    #[arg(long, global = true, env = "PIPEBENCH_SEED")]
    seed: Option<u64>,

    /// Read the configuration from the first document of this collection
    #[arg(long, global = true, env = "MONGODB_CONFIG_COLL")]
    config_collection: Option<String>,

    /// JSON configuration document stored into the configuration collection at startup
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.log.setup(log::DEFAULT_FILTER)?;

    let ctx = Context::new(&cli).await?;
    let r = cli.command.run(&ctx).await;
    if let Err(err) = &r {
        error!(%err, "pipebench failed");
    }
    r
}

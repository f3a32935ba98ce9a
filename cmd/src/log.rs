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


use std::env;
use std::io;

use clap::Args;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

/// Filter used when neither `--log-level` nor `RUST_LOG` is given
pub const DEFAULT_FILTER: &str = "warn,pipebench=info,pipebench_harness=info";

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log level or filter.
    /// Simple levels: `trace`, `debug`, `info`, `warn`, `error`
    ///
    /// Extended syntax (like `RUST_LOG`) is also supported,
    /// e.g. "pipebench_harness=debug,warn"
    #[arg(long = "log-level", global = true, value_parser = parse_env_filter)]
    pub log_level: Option<EnvFilter>,

    /// Omit timestamps from log lines
    #[arg(long, global = true, default_value_t = false)]
    pub log_without_time: bool,
}

fn parse_env_filter(s: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(s).map_err(|e| e.to_string())
}

impl LogArgs {
    /// `--log-level` first, then `RUST_LOG`, then `default`
    pub fn to_filter(&self, default: &str) -> EnvFilter {
        if let Some(filter) = &self.log_level {
            filter.clone()
        } else if env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(default)
        }
    }

    /// Install the global subscriber.  Logs go to stderr; stdout carries results.
    pub fn setup(&self, default: &str) -> anyhow::Result<()> {
        let builder = FmtSubscriber::builder()
            .with_env_filter(self.to_filter(default))
            .with_writer(io::stderr);
        if self.log_without_time {
            tracing::subscriber::set_global_default(builder.without_time().finish())?;
        } else {
            tracing::subscriber::set_global_default(builder.finish())?;
        }
        Ok(())
    }
}

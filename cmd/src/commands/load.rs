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
use serde_json::Map;
use serde_json::Value;

use super::CommandRunnable;
use super::print_json;
use crate::harness::batch::Category;
use crate::harness::loader;

#[derive(Args)]
pub struct LoadCommand {}

#[async_trait::async_trait]
impl CommandRunnable for LoadCommand {
    async fn run(self, ctx: &crate::Context) -> anyhow::Result<()> {
        let report = loader::load(ctx.pool(), ctx.config()).await?;

        let mut out = Map::new();
        out.insert("profiles".into(), report.profiles.into());
        out.insert("durationMillis".into(), report.duration_millis().into());
        for category in Category::ALL {
            out.insert(
                category.collection().into(),
                serde_json::to_value(report.stats.get(category))?,
            );
        }
        out.insert("indexes".into(), report.indexes.into());
        print_json(&Value::Object(out))
    }
}

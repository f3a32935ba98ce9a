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

use super::CommandRunnable;
use crate::harness::PipelineVariant;

#[derive(Args)]
pub struct VariantsCommand {}

#[async_trait::async_trait]
impl CommandRunnable for VariantsCommand {
    async fn run(self, _: &crate::Context) -> anyhow::Result<()> {
        for v in PipelineVariant::ALL {
            let d = v.descriptor();
            println!("{:<22} {}", d.name, d.summary);
            for index in v.required_indexes() {
                println!("{:<22}   uses {index}", "");
            }
        }
        Ok(())
    }
}

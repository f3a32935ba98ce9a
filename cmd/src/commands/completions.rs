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


use std::io;

use clap::Args;
use clap::CommandFactory;
use clap_complete::Shell;
use clap_complete::generate;

use super::CommandRunnable;
use crate::Cli;

#[derive(Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[async_trait::async_trait]
impl CommandRunnable for CompletionsCommand {
    async fn run(self, _: &crate::Context) -> anyhow::Result<()> {
        let mut cmd = Cli::command();
        let prog_name = cmd.get_name().to_string();
        generate(self.shell, &mut cmd, prog_name, &mut io::stdout());
        Ok(())
    }
}

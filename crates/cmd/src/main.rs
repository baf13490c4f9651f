// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use logship_app::App;
use snafu::{ResultExt, Whatever};

mod build_info;

#[derive(Debug, Parser)]
#[clap(name = "logship", about = "logship-cmd", author = build_info::AUTHOR, version = build_info::FULL_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Starts the logship producer daemon from a TOML config file.
Examples:

logship run --config /etc/logship/logship.toml

")]
struct RunArgs {
    /// Path to the daemon's TOML configuration file.
    #[arg(long, short)]
    config: PathBuf,
}

impl RunArgs {
    async fn run(&self) -> Result<(), Whatever> {
        let app = App::bootstrap("logship", &self.config).whatever_context("failed to bootstrap logship")?;
        app.run().await.whatever_context("logship exited with an error")
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    human_panic::setup_panic!();
    logship_common_telemetry::panic_hook::set_panic_hook();
    logship_common_base::load_dotenv().whatever_context("failed to load .env")?;
    let cli = Cli::parse();
    match cli.commands {
        Commands::Run(ra) => ra.run().await,
    }
}

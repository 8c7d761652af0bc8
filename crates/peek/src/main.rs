// Peek - Live-state Snapshot Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Peek command line interface.
//!
//! Runs captures against JSON scenarios and prints the snapshots.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use eyre::Result;
use peek_common::{env::PEEK_CONFIG, EngineConfig};

mod cmd;

#[derive(Debug, Parser)]
#[command(name = "peek")]
#[command(about = "Peek - bounded live-state snapshots for non-intrusive debugging")]
#[command(version)]
pub struct Cli {
    /// Also write logs to a daily-rotated file
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Capture snapshots at the breakpoints of a scenario
    Capture(CaptureArgs),
    /// Print the effective engine configuration
    Config(ConfigArgs),
}

/// Engine configuration source and overrides
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// TOML engine configuration file
    #[arg(long, env = PEEK_CONFIG)]
    pub config: Option<PathBuf>,

    /// Maximum nesting depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Maximum elements captured per collection
    #[arg(long)]
    pub max_collection_size: Option<usize>,

    /// Maximum length of a string representation
    #[arg(long)]
    pub max_string_length: Option<usize>,

    /// Ceiling on variables per snapshot
    #[arg(long)]
    pub max_variables: Option<usize>,

    /// Processing time budget in milliseconds
    #[arg(long)]
    pub max_processing_time_ms: Option<u64>,

    /// Maximum breakpoints processed on one line
    #[arg(long)]
    pub max_breakpoints_per_line: Option<usize>,
}

impl ConfigArgs {
    /// Load the configuration file, or the defaults, and apply the overrides
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };

        if let Some(v) = self.max_depth {
            config.max_depth = v;
        }
        if let Some(v) = self.max_collection_size {
            config.max_collection_size = v;
        }
        if let Some(v) = self.max_string_length {
            config.max_string_length = v;
        }
        if let Some(v) = self.max_variables {
            config.max_variables = v;
        }
        if let Some(v) = self.max_processing_time_ms {
            config.max_processing_time_ms = v;
        }
        if let Some(v) = self.max_breakpoints_per_line {
            config.max_breakpoints_per_line = v;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Arguments of the capture command
#[derive(Debug, Clone, Args)]
pub struct CaptureArgs {
    /// Scenario file (JSON heap, stack and breakpoints)
    pub scenario: PathBuf,

    /// Extra breakpoint, `[<kind>@]<file>:<line>` (repeatable)
    #[arg(short, long = "breakpoint")]
    pub breakpoints: Vec<String>,

    /// Capture kind applied to every breakpoint
    #[arg(long)]
    pub kind: Option<String>,

    /// Watch expression added to every breakpoint (repeatable)
    #[arg(short, long = "watch")]
    pub watches: Vec<String>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Include capture metrics in the output
    #[arg(long)]
    pub metrics: bool,

    #[command(flatten)]
    pub(crate) config: ConfigArgs,
}

fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    peek_common::logging::init_logging("peek", cli.log_file)?;

    match &cli.command {
        Commands::Capture(args) => cmd::capture::run(args),
        Commands::Config(args) => cmd::config::run(args),
    }
}

//! Command-line arguments.
//!
//! Values given on the command line override the TOML config file.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use qft_core::QftConfig;
use qft_core::domain::Role;

/// qft - task state viewer for block-based file transfers.
#[derive(Parser, Debug)]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Args {
    /// TOML config file. Defaults apply when omitted.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding trust material (overrides `data_dir` in the config).
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv).
    #[clap(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read engine events (one JSON object per line) from stdin and print the task table.
    Watch {
        /// Which registry the events belong to.
        #[clap(long, value_enum)]
        role: RoleArg,

        /// Print JSON instead of a table.
        #[clap(long)]
        json: bool,
    },

    /// Transfer a file through the in-process loopback engine.
    Demo {
        /// File to send.
        #[clap(long)]
        file: PathBuf,

        /// Pacing rate in packets per second.
        #[clap(long, default_value_t = 20_000)]
        pace_rate: u64,

        /// Re-send each previous sender snapshot to exercise stale rejection.
        #[clap(long)]
        replay_stale: bool,

        /// Print JSON instead of a table.
        #[clap(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    Sender,
    Receiver,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Sender => Role::Sender,
            RoleArg::Receiver => Role::Receiver,
        }
    }
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn resolve_config(&self) -> anyhow::Result<QftConfig> {
        let mut config = QftConfig::load_or_default(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        Ok(config)
    }

    /// Filter directive for the tracing subscriber.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn,qft=info,qft_core=info",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

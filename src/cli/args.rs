//! CLI argument structures
//!
//! The main CLI structure and its subcommands. Run and submit arguments are
//! defined in `config::args` so saved argument sets share their shape.

use crate::config::{RunArgs, SubmitArgs};
use clap::{Parser, Subcommand};

/// Batch-parallel runner for the shear bias measurement pipeline
#[derive(Parser, Debug)]
#[command(name = "she-pipeline")]
#[command(about = "she-pipeline - Run shear bias measurement simulations in parallel batches", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bias measurement pipeline over all simulations
    #[command(name = "run")]
    Run(Box<RunArgs>),

    /// Show how simulations would be split into batches
    #[command(name = "plan")]
    Plan {
        /// Number of simulations
        #[arg(long)]
        units: usize,

        /// Worker processes per batch; 0 picks one fewer than the number of cores
        #[arg(long = "number_threads", alias = "threads", default_value_t = 0)]
        number_threads: usize,
    },

    /// Prepare an ISF and submit a pipeline to the execution server
    #[command(name = "submit")]
    Submit(Box<SubmitArgs>),
}

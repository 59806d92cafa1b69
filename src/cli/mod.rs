//! Command-line front-end
//!
//! - Argument parsing structures
//! - Routing to the run, plan and submit commands

pub mod args;
pub mod router;

pub use args::{Cli, Commands};
pub use router::execute_command;

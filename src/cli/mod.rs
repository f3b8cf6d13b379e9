//! CLI argument parsing and command dispatch.

pub mod args;
pub mod scan;

pub use args::{Cli, Commands, ConnectionArgs, OutputFormat};

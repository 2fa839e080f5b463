//! CLI module
//!
//! Command-line interface for the node daemon.

pub mod args;
pub mod config;

pub use args::CliArgs;
pub use config::Config;

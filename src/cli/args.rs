//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;
use std::net::SocketAddr;

/// CLI arguments for the kadfs node daemon
#[derive(Debug, Parser)]
#[command(name = "kadfsd")]
#[command(about = "A content-addressed Kademlia DHT node", long_about = None)]
pub struct CliArgs {
    /// Address to bind the UDP transport to
    #[arg(short, long, default_value = "0.0.0.0:7400", value_name = "ADDR")]
    pub bind: SocketAddr,

    /// Address of an existing node to join the network through
    #[arg(short = 'j', long, value_name = "ADDR")]
    pub bootstrap: Option<SocketAddr>,

    /// Node id as 40 hex characters (random if omitted)
    #[arg(long, value_name = "HEX")]
    pub id: Option<String>,

    /// Bucket size and lookup result width
    #[arg(long, default_value_t = 20)]
    pub bucket_size: usize,

    /// Number of concurrent RPCs per lookup round
    #[arg(long, default_value_t = 3)]
    pub concurrency: usize,

    /// Per-RPC timeout in milliseconds
    #[arg(long, default_value_t = 500)]
    pub rpc_timeout_ms: u64,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

//! CLI configuration module
//!
//! Manages configuration for the node daemon.

use crate::cli::args::CliArgs;
use crate::error::KadfsError;
use std::time::Duration;

/// Configuration for a kadfs node
#[derive(Debug, Clone)]
pub struct Config {
    /// Bucket size and lookup result width (K)
    pub k: usize,
    /// Number of concurrent RPCs per lookup round (ALPHA)
    pub alpha: usize,
    /// Per-RPC timeout
    pub rpc_timeout: Duration,
    /// Interval between re-publishes of values this node originated
    pub publish_interval: Duration,
    /// Interval between re-pushes of values this node merely holds
    pub republish_interval: Duration,
    /// Lease after which an unpinned held value is dropped
    pub expire_interval: Duration,
    /// Idle interval after which a bucket is refreshed
    pub bucket_refresh_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: 20,
            alpha: 3,
            rpc_timeout: Duration::from_millis(500),
            publish_interval: Duration::from_secs(24 * 3600),
            republish_interval: Duration::from_secs(3600),
            expire_interval: Duration::from_secs(24 * 3600),
            bucket_refresh_interval: Duration::from_secs(3600),
        }
    }
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            k: args.bucket_size,
            alpha: args.concurrency,
            rpc_timeout: Duration::from_millis(args.rpc_timeout_ms),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), KadfsError> {
        if self.k == 0 {
            return Err(KadfsError::config_error_with_field(
                "bucket size must be at least 1",
                "bucket_size",
            ));
        }
        if self.alpha == 0 {
            return Err(KadfsError::config_error_with_field(
                "concurrency must be at least 1",
                "concurrency",
            ));
        }
        if self.alpha > self.k {
            return Err(KadfsError::config_error_with_field(
                "concurrency cannot exceed the bucket size",
                "concurrency",
            ));
        }
        if self.rpc_timeout.is_zero() {
            return Err(KadfsError::config_error_with_field(
                "RPC timeout cannot be zero",
                "rpc_timeout_ms",
            ));
        }
        Ok(())
    }
}

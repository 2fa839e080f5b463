//! kadfsd - Main entry point
//!
//! Runs one DHT node: binds the UDP transport, optionally joins an existing
//! network, then serves until interrupted.

use anyhow::{Context, Result};
use kadfs::{CliArgs, Config, KademliaId, Node};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("kadfsd starting");
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    let id = match &args.id {
        Some(hex) => KademliaId::from_hex(hex).context("Invalid node id")?,
        None => KademliaId::random(),
    };

    let node = Node::new(id, args.bind, config)
        .await
        .context("Failed to bind node")?;
    node.start();

    match args.bootstrap {
        Some(bootstrap) => {
            node.join(bootstrap).await.context("Failed to join network")?;
            info!(
                "Joined network via {} ({} contacts known)",
                bootstrap,
                node.known_contacts().await
            );
        }
        None => warn!("No bootstrap address given; waiting for peers"),
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("kadfsd shutting down");
    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

//! Buddy Lists Daemon
//!
//! Consumes buddy list commands and character, invite and cash shop status
//! events from NATS, and publishes buddy list status events.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! buddy-lists
//!
//! # Start with custom config
//! buddy-lists --config /path/to/config.toml
//!
//! # Point at a specific broker and character service
//! buddy-lists --nats-url nats://broker:4222 --character-service-url http://characters:8080/api
//! ```

use buddy_lists::transport::nats;
use buddy_lists::{
    BuddyDb, BuddyListProcessor, Config, Dispatcher, HttpCharacterDirectory, NatsTransport, TransportInviteSubsystem,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "buddy-lists")]
#[command(about = "Buddy list service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// NATS server URL
    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,

    /// Character service base URL
    #[arg(long, env = "CHARACTER_SERVICE_URL")]
    character_service_url: Option<String>,

    /// Capacity for lists created on character creation
    #[arg(long)]
    default_capacity: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("buddy_lists=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(url) = args.nats_url {
        config.nats_url = url;
    }
    if let Some(url) = args.character_service_url {
        config.character_service_url = url;
    }
    if let Some(capacity) = args.default_capacity {
        config.default_capacity = capacity;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        nats_url = %config.nats_url,
        "Starting buddy-lists"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db_path = config.db_path();
    let pool_size = config.db_pool_size;
    let db = tokio::task::spawn_blocking(move || BuddyDb::open(&db_path, pool_size)).await??;
    let stats = db.stats()?;
    info!(lists = stats.list_count, buddies = stats.buddy_count, "Database ready");

    let client = nats::connect(&config.nats_url, "buddy-lists").await?;
    let (transport, publisher) = NatsTransport::spawn(client.clone());
    let transport = Arc::new(transport);

    let directory = Arc::new(HttpCharacterDirectory::new(
        config.character_service_url.clone(),
        config.directory_timeout(),
    ));
    let invites = Arc::new(TransportInviteSubsystem::new(
        transport.clone(),
        config.topics.invite_command.clone(),
    ));
    let processor = Arc::new(BuddyListProcessor::new(
        db,
        directory,
        invites,
        transport,
        config.topics.buddy_list_status.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        processor,
        config.topics.clone(),
        config.default_capacity,
    ));

    tokio::select! {
        result = nats::consume(client, dispatcher.clone()) => {
            if let Err(e) = result {
                error!(error = %e, "Consumer stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // The blocking HTTP client must not be dropped on a runtime thread. Dropping
    // the last transport handle lets the publisher drain and flush.
    tokio::task::spawn_blocking(move || drop(dispatcher)).await?;
    if let Err(e) = publisher.await {
        error!(error = %e, "Publisher task failed");
    }

    info!("Service shutdown.");
    Ok(())
}

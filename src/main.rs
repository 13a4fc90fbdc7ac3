mod bot;
mod commands;
mod config;
mod memory;
mod platform;
mod scheduler;
mod server;
mod workers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Moderator;
use crate::config::Config;
use crate::memory::MemoryStore;
use crate::platform::yhchat::YhChatClient;
use crate::workers::WorkerPool;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,yhguard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  API: {}", config.yhchat.base_url);
    info!("  Database: {}", config.memory.database_path.display());
    info!("  Main chat: {:?}", config.moderation.main_chat_id);
    info!("  Audit chat: {:?}", config.moderation.audit_chat_id);
    info!("  Workers: {}", config.server.workers);

    let store = MemoryStore::open(&config.memory.database_path)?;
    let platform = Arc::new(YhChatClient::new(config.yhchat.clone()));
    let moderator = Arc::new(Moderator::new(
        store,
        platform,
        config.moderation.clone(),
    ));

    let pool = WorkerPool::spawn(
        moderator,
        config.server.workers,
        config.server.queue_capacity,
    );

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = scheduler::start_stats_report(&config.monitor.stats_cron, pool.stats()).await?;

    info!("Moderator is starting...");
    server::serve(&config.server, pool).await?;

    Ok(())
}

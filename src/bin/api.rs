use std::sync::Arc;
use std::time::Duration;

use support_agent_orchestrator::{
    api::start_server,
    detection::DetectionEngine,
    memory::{InMemorySessionStore, StoreConfig, DEFAULT_SWEEP_MAX_IDLE},
    orchestrator::Orchestrator,
    taxonomy::Taxonomy,
};
use tracing::{info, warn};

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let store_config = StoreConfig {
        max_sessions: env_u64("MAX_SESSIONS", 1000) as usize,
        session_ttl: Duration::from_secs(env_u64("SESSION_TTL_SECS", 3600)),
        ..StoreConfig::default()
    };
    let sweep_interval = Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 300));
    let sweep_max_idle = Duration::from_secs(env_u64(
        "SWEEP_MAX_IDLE_SECS",
        DEFAULT_SWEEP_MAX_IDLE.as_secs(),
    ));

    info!("Support Agent Orchestrator - API Server");
    info!("Port: {}", api_port);

    // Create components
    let taxonomy = Arc::new(Taxonomy::load()?);
    let detection = DetectionEngine::new(Arc::clone(&taxonomy))?;
    let store = Box::new(InMemorySessionStore::new(store_config));
    let orchestrator = Arc::new(Orchestrator::new(taxonomy, detection, store));

    // Periodic inactive-session sweep
    let sweeper = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            match sweeper.sweep_inactive(sweep_max_idle).await {
                Ok(removed) if removed > 0 => info!(removed, "periodic sweep"),
                Ok(_) => {}
                Err(e) => warn!("periodic sweep failed: {}", e),
            }
        }
    });

    info!("Orchestrator initialized");
    info!("Starting API server...");

    // Start API server
    start_server(orchestrator, api_port).await?;

    Ok(())
}

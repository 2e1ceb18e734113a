use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use game_core::{MemorySessionStore, SessionStore};
use game_persistence::{SqlSessionStore, connection::connect_and_migrate};
use game_server::{
    config::{Config, StoreBackend},
    create_game_manager, create_routes,
    websocket::{ConnectionManager, handlers::leave_room},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Stop The Bus server...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn SessionStore> = match config.store_backend {
        StoreBackend::Memory => {
            info!("Using in-memory session store");
            Arc::new(MemorySessionStore::new())
        }
        StoreBackend::Sqlite => match connect_and_migrate(&config.database_url).await {
            Ok(db) => Arc::new(SqlSessionStore::new(db)),
            Err(e) => {
                error!("Failed to connect to database and run migrations: {}", e);
                std::process::exit(1);
            }
        },
    };

    let connection_manager = Arc::new(ConnectionManager::new());
    let game_manager = create_game_manager(
        store,
        connection_manager.clone(),
        config.game_manager_settings(),
    );

    if config.enable_debug_routes {
        info!("Debug routes enabled");
    }
    let routes = create_routes(
        connection_manager.clone(),
        game_manager.clone(),
        config.enable_debug_routes,
    );

    // Start cleanup task
    let cleanup_connection_manager = connection_manager.clone();
    let cleanup_game_manager = game_manager.clone();
    let connection_timeout = Duration::from_secs(config.connection_timeout_seconds);
    let cleanup_interval = Duration::from_secs(config.cleanup_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;

            let idle = cleanup_connection_manager
                .cleanup_inactive_connections(connection_timeout)
                .await;
            for connection in &idle {
                leave_room(&cleanup_game_manager, connection).await;
            }

            if let Err(e) = cleanup_game_manager.cleanup_expired().await {
                error!("Session cleanup failed: {}", e);
            }
        }
    });

    let addr = match config.host.parse::<std::net::IpAddr>() {
        Ok(ip) => (ip, config.port),
        Err(e) => {
            error!("Invalid HOST '{}': {}", config.host, e);
            std::process::exit(1);
        }
    };
    info!("Server starting on {}:{}", config.host, config.port);

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async {
        // Wait for SIGINT (Ctrl+C) or SIGTERM
        #[cfg(unix)]
        {
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
                .expect("Failed to install SIGINT handler");
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    });

    info!(
        "Server started successfully on {}. Press Ctrl+C to stop.",
        addr
    );
    server.await;
    info!("Server shutdown complete.");
}

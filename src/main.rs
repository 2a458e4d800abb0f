//! RTB server binary: wires configuration, the auction registry and the
//! HTTP + streaming routers together.

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use rtb_server::adapters::http::{auction_router, AppState};
use rtb_server::adapters::realtime::{realtime_router, RealtimeState};
use rtb_server::config::AppConfig;
use rtb_server::domain::auction::AuctionRegistry;

#[tokio::main]
async fn main() {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = config.validate() {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let registry = Arc::new(AuctionRegistry::new(config.realtime.room_config()));

    let app = Router::new()
        .merge(auction_router(AppState {
            registry: registry.clone(),
        }))
        .merge(realtime_router(RealtimeState {
            registry,
            realtime: config.realtime.clone(),
        }))
        // Browser clients on other origins create auctions and open sockets.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = match config.server.socket_addr() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::error!(error = %err, "invalid bind address");
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, environment = ?config.server.environment, "rtb-server listening");
    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
}

//! Streaming transport adapters.
//!
//! Two endpoints expose identical room semantics over different framing:
//! `/ws` (full-duplex WebSocket) and `/signal` (WebRTC signaling followed by
//! a data channel).

pub mod protocol;
pub mod websocket;
pub mod webrtc;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::config::RealtimeConfig;
use crate::domain::auction::AuctionRegistry;

/// Shared state for both streaming endpoints.
#[derive(Clone)]
pub struct RealtimeState {
    pub registry: Arc<AuctionRegistry>,
    pub realtime: RealtimeConfig,
}

/// Create the router for the streaming endpoints.
pub fn realtime_router(state: RealtimeState) -> Router {
    Router::new()
        .route("/ws", get(websocket::ws_handler))
        .route("/signal", get(webrtc::signal_handler))
        .with_state(state)
}

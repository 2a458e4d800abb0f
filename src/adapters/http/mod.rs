//! HTTP adapter - the auction CRUD surface consumed by the realtime core.

mod dto;
mod handlers;

pub use dto::{CreateAuctionRequest, ErrorBody};
pub use handlers::AppState;

use axum::{
    routing::get,
    Router,
};

use handlers::{create_auction, get_auction, healthz, list_auctions};

/// Create the router for the CRUD endpoints and the health probe.
pub fn auction_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/auctions", get(list_auctions).post(create_auction))
        .route("/api/auctions/{id}", get(get_auction))
        .with_state(state)
}

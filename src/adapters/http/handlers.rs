//! HTTP handlers for the auction CRUD surface.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::domain::auction::{money, AuctionRegistry, CreateAuctionParams};

use super::dto::{CreateAuctionRequest, ErrorBody};

/// Shared state for the CRUD endpoints.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AuctionRegistry>,
}

/// `POST /api/auctions`
pub async fn create_auction(
    State(state): State<AppState>,
    Json(request): Json<CreateAuctionRequest>,
) -> Response {
    let title = request.title.trim();
    if title.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("title required")),
        )
            .into_response();
    }

    let duration_seconds = if request.duration_seconds <= 0 {
        60
    } else {
        request.duration_seconds
    };
    let min_increment = if request.min_increment <= 0.0 {
        1.0
    } else {
        request.min_increment
    };

    let auction = state
        .registry
        .create(CreateAuctionParams {
            title: title.to_string(),
            start_price_cents: money::to_cents(request.start_price),
            min_increment_cents: money::to_cents(min_increment),
            duration_seconds,
            soft_close_seconds: request.soft_close_seconds.max(0),
            reserve_price_cents: money::to_cents(request.reserve_price),
        })
        .await;

    (StatusCode::CREATED, Json(auction)).into_response()
}

/// `GET /api/auctions`
pub async fn list_auctions(State(state): State<AppState>) -> Response {
    Json(state.registry.list().await).into_response()
}

/// `GET /api/auctions/{id}`
pub async fn get_auction(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id).await {
        Some(auction) => Json(auction).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ErrorBody::new("not found"))).into_response(),
    }
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

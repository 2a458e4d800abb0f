//! HTTP DTOs for the auction CRUD surface.
//!
//! Requests carry prices in major currency units; the handlers convert to
//! integer minor units at this boundary and nowhere else.

use serde::{Deserialize, Serialize};

/// Request to create an auction.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionRequest {
    pub title: String,
    /// Starting price in major units (e.g. dollars).
    #[serde(default)]
    pub start_price: f64,
    /// Minimum increment in major units; values <= 0 default to 1.
    #[serde(default)]
    pub min_increment: f64,
    /// Auction duration; values <= 0 default to 60 seconds.
    #[serde(default)]
    pub duration_seconds: i64,
    /// Anti-sniping window in seconds; 0 disables it.
    #[serde(default)]
    pub soft_close_seconds: i64,
    /// Reserve price in major units; advertised but never gates bids.
    #[serde(default)]
    pub reserve_price: f64,
}

/// Error body returned by the CRUD endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

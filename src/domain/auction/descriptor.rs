//! Auction descriptors and the identities that bid on them.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Immutable parameters of one auction.
///
/// Created once by the HTTP surface and never mutated afterwards; the live
/// deadline (which anti-sniping can push forward) is owned by the room, not by
/// the descriptor. `ends_at` here is the initial deadline.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: String,
    pub title: String,
    pub start_price_cents: i64,
    pub min_increment_cents: i64,
    pub reserve_price_cents: i64,
    pub ends_at: DateTime<Utc>,
    pub soft_close_seconds: i64,
    pub created_at: DateTime<Utc>,
}

/// Validated inputs for creating an auction, already in minor units.
#[derive(Debug, Clone)]
pub struct CreateAuctionParams {
    pub title: String,
    pub start_price_cents: i64,
    pub min_increment_cents: i64,
    pub duration_seconds: i64,
    pub soft_close_seconds: i64,
    pub reserve_price_cents: i64,
}

impl Auction {
    /// Builds a descriptor from creation parameters, assigning a fresh id and
    /// computing the initial deadline from the duration.
    pub fn from_params(params: CreateAuctionParams) -> Self {
        let now = Utc::now();
        Self {
            id: generate_auction_id(now),
            title: params.title,
            start_price_cents: params.start_price_cents,
            min_increment_cents: params.min_increment_cents,
            reserve_price_cents: params.reserve_price_cents,
            ends_at: now + Duration::seconds(params.duration_seconds),
            soft_close_seconds: params.soft_close_seconds,
            created_at: now,
        }
    }
}

/// Generates an auction id of the form `<unix-seconds>-<random-below-1M>`.
///
/// Callers must treat the id as opaque; the format is only a debugging aid.
fn generate_auction_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::rng().random_range(0..1_000_000);
    format!("{}-{}", now.timestamp(), suffix)
}

/// An opaque user identity plus display handle.
///
/// The server does not authenticate users; whatever identity a transport
/// presents at join time is attributed to that connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub handle: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CreateAuctionParams {
        CreateAuctionParams {
            title: "Vintage synth".to_string(),
            start_price_cents: 10_000,
            min_increment_cents: 500,
            duration_seconds: 120,
            soft_close_seconds: 15,
            reserve_price_cents: 20_000,
        }
    }

    #[test]
    fn from_params_sets_deadline_from_duration() {
        let auction = Auction::from_params(params());
        let expected = auction.created_at + Duration::seconds(120);
        assert_eq!(auction.ends_at, expected);
        assert_eq!(auction.start_price_cents, 10_000);
        assert_eq!(auction.soft_close_seconds, 15);
    }

    #[test]
    fn auction_id_has_timestamp_and_suffix() {
        let auction = Auction::from_params(params());
        let mut parts = auction.id.splitn(2, '-');
        let seconds: i64 = parts.next().unwrap().parse().unwrap();
        let suffix: u32 = parts.next().unwrap().parse().unwrap();
        assert_eq!(seconds, auction.created_at.timestamp());
        assert!(suffix < 1_000_000);
    }

    #[test]
    fn auction_serializes_camel_case() {
        let auction = Auction::from_params(params());
        let json = serde_json::to_value(&auction).unwrap();
        assert_eq!(json["startPriceCents"], 10_000);
        assert_eq!(json["minIncrementCents"], 500);
        assert_eq!(json["reservePriceCents"], 20_000);
        assert!(json["endsAt"].is_string());
    }
}

//! Room event and message types.
//!
//! Defines the protocol between the room engine and its participants:
//! - Inbound: transport adapters → room writer ([`RoomEvent`])
//! - Outbound: room writer → subscribers ([`ServerMessage`])
//!
//! Outbound messages serialize directly to the wire envelope
//! `{"type": ..., "roomId": ..., "payload": ...}` shared by both transports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::descriptor::User;

// ============================================
// Inbound events (adapter → room writer)
// ============================================

/// An event submitted to a room's input queue.
///
/// Bids carry an optional user so an unattributed submission is rejected by
/// the room (`unauthorized`) rather than dropped by the transport.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    JoinRoom { user: User },
    LeaveRoom { user: User },
    PlaceBid { user: Option<User>, amount_cents: i64 },
}

// ============================================
// Outbound messages (room writer → subscribers)
// ============================================

/// All message types fanned out to room subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full state snapshot; idempotent, re-sent at 1 Hz.
    RoomState {
        room_id: String,
        payload: RoomStateView,
    },

    /// Participant count changed.
    Presence {
        room_id: String,
        payload: PresencePayload,
    },

    /// A bid was accepted. Loss of this message is not tolerated; see the
    /// drop policy in the room engine.
    BidAccepted {
        room_id: String,
        payload: BidAcceptedPayload,
    },

    /// A bid was rejected with a typed reason.
    BidRejected {
        room_id: String,
        payload: BidRejectedPayload,
    },

    /// One-shot error frame (handshake failures, unknown rooms).
    Error { message: String },
}

/// Full public snapshot of a room, for UI consumption.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateView {
    pub auction_id: String,
    pub title: String,
    pub current_price_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_handle: Option<String>,
    pub ends_at: DateTime<Utc>,
    pub soft_close_seconds: i64,
    pub min_increment_cents: i64,
    pub participants: usize,
    pub participants_list: Vec<ParticipantView>,
    pub reserve_price_cents: i64,
    pub bid_history: Vec<BidView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_id: String,
    pub handle: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub participants: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidAcceptedPayload {
    pub amount_cents: i64,
    pub leader_user_id: String,
    pub leader_handle: String,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BidRejectedPayload {
    pub reason: RejectReason,
}

/// Why a bid did not change the price, in rule-evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Unauthorized,
    AuctionClosed,
    BelowMinIncrement,
}

/// One entry of a room's bid history; both accepted and rejected bids are
/// recorded in arrival order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidView {
    pub user_id: String,
    pub handle: String,
    pub amount_cents: i64,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub created_at: DateTime<Utc>,
}

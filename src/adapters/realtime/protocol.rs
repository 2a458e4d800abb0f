//! Client envelope parsing shared by both streaming transports.
//!
//! The WebSocket endpoint and the WebRTC data channel speak the same
//! JSON protocol; only the framing differs. Inbound frames are parsed here,
//! outbound frames are the domain's `ServerMessage` serialized as-is.

use serde::Deserialize;

use crate::domain::auction::{ServerMessage, User};

/// All frame types a client may send.
///
/// Unknown `type` tags map to [`ClientEnvelope::Unknown`] and are ignored by
/// the adapters; frames that fail to parse at all are dropped silently.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEnvelope {
    JoinRoom { room_id: String, user: User },
    PlaceBid { amount_cents: i64 },
    LeaveRoom,
    #[serde(other)]
    Unknown,
}

/// Parses one text frame; `None` means the frame is malformed.
pub fn parse_client_envelope(text: &str) -> Option<ClientEnvelope> {
    match serde_json::from_str(text) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            tracing::trace!(error = %err, "dropping malformed client frame");
            None
        }
    }
}

/// True if a join envelope names a room and a non-empty identity.
pub fn is_valid_join(room_id: &str, user: &User) -> bool {
    !room_id.is_empty() && !user.id.is_empty()
}

/// Serializes a one-shot error frame (`{"type":"error","message":...}`).
pub fn error_frame(message: &str) -> String {
    serde_json::to_string(&ServerMessage::Error {
        message: message.to_string(),
    })
    .expect("error frame serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_envelope_parses() {
        let frame = r#"{"type":"join_room","roomId":"a-1","user":{"id":"u1","handle":"alice"}}"#;
        match parse_client_envelope(frame) {
            Some(ClientEnvelope::JoinRoom { room_id, user }) => {
                assert_eq!(room_id, "a-1");
                assert_eq!(user.handle, "alice");
                assert!(is_valid_join(&room_id, &user));
            }
            other => panic!("expected join_room, got {other:?}"),
        }
    }

    #[test]
    fn place_bid_requires_amount() {
        let frame = r#"{"type":"place_bid","roomId":"a-1"}"#;
        assert!(parse_client_envelope(frame).is_none());

        let frame = r#"{"type":"place_bid","amountCents":110}"#;
        assert!(matches!(
            parse_client_envelope(frame),
            Some(ClientEnvelope::PlaceBid { amount_cents: 110 })
        ));
    }

    #[test]
    fn unknown_types_parse_as_unknown() {
        let frame = r#"{"type":"wave_hello","roomId":"a-1"}"#;
        assert!(matches!(
            parse_client_envelope(frame),
            Some(ClientEnvelope::Unknown)
        ));
    }

    #[test]
    fn malformed_frames_are_dropped() {
        assert!(parse_client_envelope("not json").is_none());
        assert!(parse_client_envelope(r#"{"roomId":"a-1"}"#).is_none());
    }

    #[test]
    fn join_validation_rejects_empty_identity() {
        let user = User {
            id: String::new(),
            handle: "ghost".to_string(),
        };
        assert!(!is_valid_join("a-1", &user));
        let user = User {
            id: "u1".to_string(),
            handle: "alice".to_string(),
        };
        assert!(!is_valid_join("", &user));
    }

    #[test]
    fn error_frame_shape_matches_protocol() {
        let frame = error_frame("expected join_room");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "expected join_room");
    }
}

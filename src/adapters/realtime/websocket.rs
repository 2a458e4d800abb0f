//! WebSocket transport adapter.
//!
//! Handles the full-duplex text-framed endpoint at `/ws`:
//! 1. Handshake: exactly one `join_room` frame selects the room and identity
//! 2. Subscribe to the room and submit the join event
//! 3. Reader task: decode frames, feed the room's input queue
//! 4. Writer task: drain the subscriber queue to the socket, ping every 30 s
//! 5. Teardown: one final `leave_room`, unsubscribe, close
//!
//! A client that floods the input queue is back-pressured at the socket; a
//! client that cannot drain its subscriber queue is evicted by the room on
//! the next critical broadcast, which closes the queue and ends the writer.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::time::timeout;

use crate::domain::auction::{RoomEvent, RoomHandle, ServerMessage, User};

use super::{
    protocol::{error_frame, is_valid_join, parse_client_envelope, ClientEnvelope},
    RealtimeState,
};

/// Handle WebSocket upgrade requests for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RealtimeState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RealtimeState) {
    let (mut sender, mut receiver) = socket.split();

    // Handshake: the first frame must be a valid join_room.
    let (room, user) = match read_join(&mut receiver, &state).await {
        Ok(join) => join,
        Err(Some(message)) => {
            let _ = sender.send(Message::Text(error_frame(message).into())).await;
            return;
        }
        Err(None) => return, // socket closed or timed out before joining
    };

    let Ok(subscription) = room.subscribe().await else {
        return;
    };
    let subscriber_id = subscription.id;
    if room
        .submit(RoomEvent::JoinRoom { user: user.clone() })
        .await
        .is_err()
    {
        return;
    }

    tracing::debug!(
        auction_id = %room.auction_id(),
        user_id = %user.id,
        subscriber_id,
        "websocket client joined"
    );

    let mut send_task = tokio::spawn(write_outbound(
        sender,
        subscription.messages,
        state.realtime.keepalive_interval(),
    ));
    let mut recv_task = tokio::spawn(read_inbound(
        receiver,
        room.clone(),
        user.clone(),
        state.realtime.read_deadline(),
    ));

    // Either task exiting tears the connection down.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let _ = room.submit(RoomEvent::LeaveRoom { user }).await;
    room.unsubscribe(subscriber_id);
}

/// Reads the handshake frame and resolves the room.
///
/// `Err(Some(message))` asks the caller to send one error frame before
/// closing; `Err(None)` means the socket is already unusable.
async fn read_join(
    receiver: &mut SplitStream<WebSocket>,
    state: &RealtimeState,
) -> Result<(RoomHandle, User), Option<&'static str>> {
    let frame = match timeout(state.realtime.read_deadline(), receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(_))) => return Err(Some("expected join_room")),
        _ => return Err(None),
    };
    resolve_join(&frame, state).await.map_err(Some)
}

/// Transport-free half of the handshake: the first text frame must be a
/// valid `join_room` naming a known room.
///
/// The error string is the `message` of the single error frame the caller
/// sends before closing.
async fn resolve_join(
    frame: &str,
    state: &RealtimeState,
) -> Result<(RoomHandle, User), &'static str> {
    let (room_id, user) = match parse_client_envelope(frame) {
        Some(ClientEnvelope::JoinRoom { room_id, user }) if is_valid_join(&room_id, &user) => {
            (room_id, user)
        }
        _ => return Err("expected join_room"),
    };

    match state.registry.room_for(&room_id).await {
        Some(room) => Ok((room, user)),
        None => Err("room_not_found"),
    }
}

/// Drains the subscriber queue to the socket and keeps the connection alive.
///
/// Ends when the queue closes (unsubscribe or eviction) or a write fails.
async fn write_outbound(
    mut sender: SplitSink<WebSocket, Message>,
    mut messages: tokio::sync::mpsc::Receiver<ServerMessage>,
    keepalive: std::time::Duration,
) {
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);

    loop {
        tokio::select! {
            message = messages.recv() => {
                let Some(message) = message else { break };
                let json = serde_json::to_string(&message)
                    .expect("outbound message serialization should not fail");
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if sender
                    .send(Message::Ping(Bytes::from_static(b"ping")))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }
}

/// Dispatches inbound frames to the room until the client goes quiet.
///
/// Every received frame (pongs included) refreshes the read deadline.
async fn read_inbound(
    mut receiver: SplitStream<WebSocket>,
    room: RoomHandle,
    user: User,
    read_deadline: std::time::Duration,
) {
    loop {
        let frame = match timeout(read_deadline, receiver.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Err(_) => {
                tracing::debug!(user_id = %user.id, "read deadline expired");
                break;
            }
            _ => break,
        };

        match frame {
            Message::Text(text) => match parse_client_envelope(&text) {
                Some(ClientEnvelope::PlaceBid { amount_cents }) => {
                    let event = RoomEvent::PlaceBid {
                        user: Some(user.clone()),
                        amount_cents,
                    };
                    if room.submit(event).await.is_err() {
                        break;
                    }
                }
                Some(ClientEnvelope::LeaveRoom) => {
                    let event = RoomEvent::LeaveRoom { user: user.clone() };
                    if room.submit(event).await.is_err() {
                        break;
                    }
                }
                // Repeated joins, unknown types and malformed frames are
                // ignored.
                _ => {}
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

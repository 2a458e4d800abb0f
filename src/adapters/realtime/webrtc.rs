//! WebRTC transport adapter.
//!
//! `/signal` runs a short signaling exchange over a temporary WebSocket:
//! one `offer` frame in, one `answer` frame out (after ICE gathering), then
//! the control socket lingers briefly and closes. All room traffic flows
//! over a negotiated data channel labelled `rtb-v1`, which speaks exactly
//! the protocol of the WebSocket endpoint.
//!
//! The peer connection outlives the control socket; it is closed once it
//! reaches a terminal state.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use webrtc::{
    api::APIBuilder,
    data_channel::{data_channel_message::DataChannelMessage, RTCDataChannel},
    ice_transport::ice_server::RTCIceServer,
    peer_connection::{
        configuration::RTCConfiguration, peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription, RTCPeerConnection,
    },
};

use crate::domain::auction::{RoomEvent, RoomHandle, SubscriberId, User};

use super::{
    protocol::{error_frame, is_valid_join, parse_client_envelope, ClientEnvelope},
    RealtimeState,
};

/// Only data channels with this label get room semantics attached.
const DATA_CHANNEL_LABEL: &str = "rtb-v1";

/// Frames exchanged on the signaling socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SignalMessage {
    Offer { sdp: String },
    Answer { sdp: String },
}

#[derive(Debug, Error)]
enum SignalingError {
    #[error("webrtc negotiation failed: {0}")]
    Rtc(#[from] webrtc::Error),

    #[error("signaling socket write failed: {0}")]
    Socket(#[from] axum::Error),

    #[error("no local description after ICE gathering")]
    MissingLocalDescription,
}

/// Handle WebSocket upgrade requests for `/signal`.
pub async fn signal_handler(ws: WebSocketUpgrade, State(state): State<RealtimeState>) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = run_signaling(socket, state).await {
            tracing::debug!(error = %err, "signaling session ended with error");
        }
    })
}

async fn run_signaling(socket: WebSocket, state: RealtimeState) -> Result<(), SignalingError> {
    let (mut sender, mut receiver) = socket.split();

    // Exactly one offer frame starts the exchange.
    let offer_sdp = match receiver.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
            Ok(SignalMessage::Offer { sdp }) if !sdp.is_empty() => sdp,
            _ => {
                let _ = sender
                    .send(Message::Text(error_frame("expected offer").into()))
                    .await;
                return Ok(());
            }
        },
        _ => return Ok(()),
    };

    let api = APIBuilder::new().build();
    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: state.realtime.stun_servers.clone(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let peer = Arc::new(api.new_peer_connection(rtc_config).await?);
    attach_room_semantics(&peer, state.clone());

    peer.set_remote_description(RTCSessionDescription::offer(offer_sdp)?)
        .await?;
    let answer = peer.create_answer(None).await?;

    // Wait for ICE gathering so the answer carries all candidates; the
    // protocol has no trickle path.
    let mut gathering_done = peer.gathering_complete_promise().await;
    peer.set_local_description(answer).await?;
    let _ = gathering_done.recv().await;

    let local = peer
        .local_description()
        .await
        .ok_or(SignalingError::MissingLocalDescription)?;
    let frame = serde_json::to_string(&SignalMessage::Answer { sdp: local.sdp })
        .expect("answer serialization should not fail");
    sender.send(Message::Text(frame.into())).await?;

    // Hold the control socket briefly so the answer is flushed to the
    // client, then let it drop. The data channel carries everything else.
    let _ = timeout(state.realtime.signal_linger(), receiver.next()).await;
    drop(sender);
    drop(receiver);

    wait_for_terminal_state(&peer).await;
    let _ = peer.close().await;
    Ok(())
}

/// Session state shared between the data-channel callbacks.
#[derive(Default)]
struct ChannelSession {
    room: Option<RoomHandle>,
    user: Option<User>,
    subscriber_id: Option<SubscriberId>,
}

/// Wires room semantics onto any `rtb-v1` data channel the peer opens.
fn attach_room_semantics(peer: &RTCPeerConnection, state: RealtimeState) {
    peer.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        let state = state.clone();
        Box::pin(async move {
            if channel.label() != DATA_CHANNEL_LABEL {
                return;
            }

            let session = Arc::new(Mutex::new(ChannelSession::default()));

            let message_session = session.clone();
            let message_channel = channel.clone();
            let message_state = state.clone();
            channel.on_message(Box::new(move |message: DataChannelMessage| {
                let session = message_session.clone();
                let channel = message_channel.clone();
                let state = message_state.clone();
                Box::pin(async move {
                    let Ok(text) = std::str::from_utf8(&message.data) else {
                        return;
                    };
                    handle_channel_frame(text, &channel, &session, &state).await;
                })
            }));

            let close_session = session.clone();
            channel.on_close(Box::new(move || {
                let session = close_session.clone();
                Box::pin(async move {
                    let (room, user, subscriber_id) = {
                        let mut guard = session.lock().await;
                        (
                            guard.room.take(),
                            guard.user.take(),
                            guard.subscriber_id.take(),
                        )
                    };
                    let Some(room) = room else { return };
                    if let Some(user) = user {
                        let _ = room.submit(RoomEvent::LeaveRoom { user }).await;
                    }
                    if let Some(id) = subscriber_id {
                        room.unsubscribe(id);
                    }
                })
            }));
        })
    }));
}

async fn handle_channel_frame(
    text: &str,
    channel: &Arc<RTCDataChannel>,
    session: &Arc<Mutex<ChannelSession>>,
    state: &RealtimeState,
) {
    let Some(envelope) = parse_client_envelope(text) else {
        return;
    };

    match envelope {
        ClientEnvelope::JoinRoom { room_id, user } if is_valid_join(&room_id, &user) => {
            join_channel(channel, session, state, &room_id, user).await;
        }
        ClientEnvelope::PlaceBid { amount_cents } => {
            let (room, user) = {
                let guard = session.lock().await;
                (guard.room.clone(), guard.user.clone())
            };
            if let (Some(room), Some(user)) = (room, user) {
                let _ = room
                    .submit(RoomEvent::PlaceBid {
                        user: Some(user),
                        amount_cents,
                    })
                    .await;
            }
        }
        ClientEnvelope::LeaveRoom => {
            let (room, user) = {
                let guard = session.lock().await;
                (guard.room.clone(), guard.user.clone())
            };
            if let (Some(room), Some(user)) = (room, user) {
                let _ = room.submit(RoomEvent::LeaveRoom { user }).await;
            }
        }
        _ => {}
    }
}

async fn join_channel(
    channel: &Arc<RTCDataChannel>,
    session: &Arc<Mutex<ChannelSession>>,
    state: &RealtimeState,
    room_id: &str,
    user: User,
) {
    let Some(room) = state.registry.room_for(room_id).await else {
        let _ = channel.send_text(error_frame("room_not_found")).await;
        return;
    };
    let Ok(subscription) = room.subscribe().await else {
        return;
    };

    {
        let mut guard = session.lock().await;
        if guard.room.is_some() {
            // Already joined on this channel; discard the extra subscription.
            room.unsubscribe(subscription.id);
            return;
        }
        guard.room = Some(room.clone());
        guard.user = Some(user.clone());
        guard.subscriber_id = Some(subscription.id);
    }

    tracing::debug!(
        auction_id = %room.auction_id(),
        user_id = %user.id,
        subscriber_id = subscription.id,
        "data channel client joined"
    );

    // Forward the subscriber queue onto the channel. The queue closing means
    // the room evicted us; close the channel so the client reconnects.
    let writer_channel = channel.clone();
    let mut messages = subscription.messages;
    tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            let json = serde_json::to_string(&message)
                .expect("outbound message serialization should not fail");
            if writer_channel.send_text(json).await.is_err() {
                break;
            }
        }
        let _ = writer_channel.close().await;
    });

    let _ = room.submit(RoomEvent::JoinRoom { user }).await;
}

fn is_terminal(state: RTCPeerConnectionState) -> bool {
    matches!(
        state,
        RTCPeerConnectionState::Failed
            | RTCPeerConnectionState::Disconnected
            | RTCPeerConnectionState::Closed
    )
}

/// Resolves once the peer connection fails, disconnects or closes.
async fn wait_for_terminal_state(peer: &RTCPeerConnection) {
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
    peer.on_peer_connection_state_change(Box::new(move |peer_state: RTCPeerConnectionState| {
        if is_terminal(peer_state) {
            let _ = done_tx.try_send(());
        }
        Box::pin(async {})
    }));

    // The connection may have reached a terminal state before the handler
    // was installed; no further transition would fire for it.
    if is_terminal(peer.connection_state()) {
        return;
    }
    let _ = done_rx.recv().await;
}

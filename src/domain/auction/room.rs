//! Single-writer room engine.
//!
//! One task per room owns every piece of mutable auction state: current
//! price, leader, deadline, participants, bid history and the subscriber map.
//! All other tasks talk to it through queues, which gives a total order over
//! bid arrivals and lets the anti-sniping path update price, leader and
//! deadline atomically without locks.
//!
//! # Queues
//!
//! - Bounded input queue (back-pressure on the transports when full)
//! - Subscribe requests answered over a oneshot (fresh id + outbound queue)
//! - Unsubscribe notifications (unbounded so teardown never blocks)
//! - A periodic state tick (1 Hz in production)
//!
//! # Drop policy
//!
//! Each subscriber owns a bounded outbound queue. Snapshots, presence and
//! rejections are lossy: a full queue drops the message for that subscriber
//! only, and the next tick resupplies state. `bid_accepted` is critical: a
//! subscriber whose queue cannot take it is evicted, which closes its queue
//! and signals its transport to disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::descriptor::{Auction, User};
use super::events::{
    BidAcceptedPayload, BidRejectedPayload, BidView, ParticipantView, PresencePayload,
    RejectReason, RoomEvent, RoomStateView, ServerMessage,
};

/// Tuning knobs for one room's queues and tick cadence.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Capacity of the inbound event queue; senders block when it is full.
    pub input_queue_capacity: usize,
    /// Capacity of each subscriber's outbound queue.
    pub subscriber_queue_capacity: usize,
    /// Interval between periodic state broadcasts.
    pub tick_interval: StdDuration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            input_queue_capacity: 4096,
            subscriber_queue_capacity: 256,
            tick_interval: StdDuration::from_secs(1),
        }
    }
}

/// Identifier a room allocates for each subscriber, monotonically increasing.
pub type SubscriberId = u64;

/// A live attachment to a room's outbound fan-out.
///
/// The first message on `messages` is always a `room_state` snapshot. The
/// channel closing means the room evicted this subscriber; the transport
/// should disconnect its client.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub messages: mpsc::Receiver<ServerMessage>,
}

struct SubscribeRequest {
    reply: oneshot::Sender<Subscription>,
}

/// The room writer task has stopped; only possible at process shutdown.
#[derive(Debug, Error)]
#[error("room writer for auction {auction_id} is gone")]
pub struct RoomClosed {
    pub auction_id: String,
}

/// Cloneable handle for talking to one room's writer task.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    auction_id: Arc<str>,
    input: mpsc::Sender<RoomEvent>,
    subscribe_tx: mpsc::Sender<SubscribeRequest>,
    unsubscribe_tx: mpsc::UnboundedSender<SubscriberId>,
}

impl RoomHandle {
    pub fn auction_id(&self) -> &str {
        &self.auction_id
    }

    /// Submits an event to the room's input queue.
    ///
    /// Suspends while the queue is full; this is the intended back-pressure
    /// on a transport whose client floods the room.
    pub async fn submit(&self, event: RoomEvent) -> Result<(), RoomClosed> {
        self.input.send(event).await.map_err(|_| self.closed())
    }

    /// Registers a new subscriber and returns its outbound queue.
    ///
    /// The writer delivers one `room_state` snapshot into the queue before
    /// any other message.
    pub async fn subscribe(&self) -> Result<Subscription, RoomClosed> {
        let (reply, response) = oneshot::channel();
        self.subscribe_tx
            .send(SubscribeRequest { reply })
            .await
            .map_err(|_| self.closed())?;
        response.await.map_err(|_| self.closed())
    }

    /// Detaches a subscriber. Never blocks; safe to call during teardown.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.unsubscribe_tx.send(id);
    }

    /// True if both handles point at the same writer task.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.input.same_channel(&other.input)
    }

    fn closed(&self) -> RoomClosed {
        RoomClosed {
            auction_id: self.auction_id.to_string(),
        }
    }
}

/// Spawns the writer task for an auction and returns its handle.
pub fn spawn_room(auction: Arc<Auction>, config: RoomConfig) -> RoomHandle {
    let (input_tx, input_rx) = mpsc::channel(config.input_queue_capacity);
    let (subscribe_tx, subscribe_rx) = mpsc::channel(1);
    let (unsubscribe_tx, unsubscribe_rx) = mpsc::unbounded_channel();

    let handle = RoomHandle {
        auction_id: Arc::from(auction.id.as_str()),
        input: input_tx,
        subscribe_tx,
        unsubscribe_tx,
    };

    let writer = RoomWriter::new(auction, config.subscriber_queue_capacity);
    tokio::spawn(writer.run(input_rx, subscribe_rx, unsubscribe_rx, config.tick_interval));

    handle
}

/// Exclusive owner of one auction's mutable state.
struct RoomWriter {
    auction: Arc<Auction>,

    current_price_cents: i64,
    leader: Option<User>,
    ends_at: DateTime<Utc>,
    participants: HashMap<String, User>,
    bid_history: Vec<BidView>,

    subscribers: HashMap<SubscriberId, mpsc::Sender<ServerMessage>>,
    next_subscriber_id: SubscriberId,
    subscriber_queue_capacity: usize,
}

impl RoomWriter {
    fn new(auction: Arc<Auction>, subscriber_queue_capacity: usize) -> Self {
        Self {
            current_price_cents: auction.start_price_cents,
            leader: None,
            ends_at: auction.ends_at,
            participants: HashMap::new(),
            bid_history: Vec::new(),
            subscribers: HashMap::new(),
            next_subscriber_id: 0,
            subscriber_queue_capacity,
            auction,
        }
    }

    async fn run(
        mut self,
        mut input: mpsc::Receiver<RoomEvent>,
        mut subscribe_rx: mpsc::Receiver<SubscribeRequest>,
        mut unsubscribe_rx: mpsc::UnboundedReceiver<SubscriberId>,
        tick_interval: StdDuration,
    ) {
        // Start the ticker one period out so room creation does not emit an
        // immediate snapshot to nobody.
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + tick_interval, tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(auction_id = %self.auction.id, "room writer started");

        loop {
            tokio::select! {
                Some(event) = input.recv() => self.handle_event(event),
                Some(request) = subscribe_rx.recv() => self.handle_subscribe(request),
                Some(id) = unsubscribe_rx.recv() => self.handle_unsubscribe(id),
                _ = ticker.tick() => self.broadcast_state(),
            }
        }
    }

    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::JoinRoom { user } => {
                self.participants.insert(user.id.clone(), user);
                self.broadcast_presence();
                self.broadcast_state();
            }
            RoomEvent::LeaveRoom { user } => {
                self.participants.remove(&user.id);
                self.broadcast_presence();
            }
            RoomEvent::PlaceBid { user, amount_cents } => {
                self.process_bid(user, amount_cents);
            }
        }
    }

    fn process_bid(&mut self, user: Option<User>, amount_cents: i64) {
        let now = Utc::now();
        let rejection = self.evaluate_bid(user.as_ref(), amount_cents, now);

        self.bid_history.push(BidView {
            user_id: user.as_ref().map(|u| u.id.clone()).unwrap_or_default(),
            handle: user.as_ref().map(|u| u.handle.clone()).unwrap_or_default(),
            amount_cents,
            accepted: rejection.is_none(),
            reason: rejection,
            created_at: now,
        });

        match rejection {
            None => {
                // Safe: evaluate_bid rejects user-less submissions.
                let Some(bidder) = user else { return };
                self.accept_bid(bidder, amount_cents, now);
            }
            Some(reason) => {
                tracing::debug!(
                    auction_id = %self.auction.id,
                    amount_cents,
                    ?reason,
                    "bid rejected"
                );
                self.broadcast_lossy(ServerMessage::BidRejected {
                    room_id: self.auction.id.clone(),
                    payload: BidRejectedPayload { reason },
                });
            }
        }
    }

    /// Applies the bid rules in order; the first failing rule names the
    /// rejection. `None` means the bid is acceptable.
    fn evaluate_bid(
        &self,
        user: Option<&User>,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> Option<RejectReason> {
        if user.is_none() {
            Some(RejectReason::Unauthorized)
        } else if now > self.ends_at {
            Some(RejectReason::AuctionClosed)
        } else if amount_cents < self.current_price_cents + self.auction.min_increment_cents {
            Some(RejectReason::BelowMinIncrement)
        } else {
            None
        }
    }

    fn accept_bid(&mut self, bidder: User, amount_cents: i64, now: DateTime<Utc>) {
        self.current_price_cents = amount_cents;

        // Anti-sniping: a winning bid inside the soft-close window pushes the
        // deadline out by one full window. The deadline never moves backwards.
        if self.auction.soft_close_seconds > 0 {
            let window = Duration::seconds(self.auction.soft_close_seconds);
            if self.ends_at - now <= window {
                self.ends_at += window;
            }
        }

        tracing::info!(
            auction_id = %self.auction.id,
            bidder = %bidder.id,
            amount_cents,
            ends_at = %self.ends_at,
            "bid accepted"
        );

        let payload = BidAcceptedPayload {
            amount_cents,
            leader_user_id: bidder.id.clone(),
            leader_handle: bidder.handle.clone(),
            ends_at: self.ends_at,
        };
        self.leader = Some(bidder);

        self.broadcast_critical(ServerMessage::BidAccepted {
            room_id: self.auction.id.clone(),
            payload,
        });
        self.broadcast_state();
    }

    fn handle_subscribe(&mut self, request: SubscribeRequest) {
        let (tx, rx) = mpsc::channel(self.subscriber_queue_capacity);
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        // The queue is fresh, so the initial snapshot always fits and is
        // guaranteed to precede every other message for this subscriber.
        let _ = tx.try_send(ServerMessage::RoomState {
            room_id: self.auction.id.clone(),
            payload: self.build_state(),
        });
        self.subscribers.insert(id, tx);

        let subscription = Subscription { id, messages: rx };
        if request.reply.send(subscription).is_err() {
            // Requester vanished before the handshake finished.
            self.subscribers.remove(&id);
        }
    }

    fn handle_unsubscribe(&mut self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(auction_id = %self.auction.id, subscriber_id = id, "unsubscribed");
        }
    }

    fn broadcast_state(&mut self) {
        let state = self.build_state();
        self.broadcast_lossy(ServerMessage::RoomState {
            room_id: self.auction.id.clone(),
            payload: state,
        });
    }

    fn broadcast_presence(&mut self) {
        self.broadcast_lossy(ServerMessage::Presence {
            room_id: self.auction.id.clone(),
            payload: PresencePayload {
                participants: self.participants.len(),
            },
        });
    }

    /// Best-effort fan-out: a full or closed subscriber queue drops the
    /// message for that subscriber only. Snapshots are idempotent and the
    /// next tick supersedes anything dropped here.
    fn broadcast_lossy(&mut self, message: ServerMessage) {
        for tx in self.subscribers.values() {
            let _ = tx.try_send(message.clone());
        }
    }

    /// Fan-out that never silently drops: a subscriber that cannot take the
    /// message is evicted, which closes its queue and disconnects its
    /// transport.
    fn broadcast_critical(&mut self, message: ServerMessage) {
        let auction_id = &self.auction.id;
        self.subscribers
            .retain(|id, tx| match tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        auction_id = %auction_id,
                        subscriber_id = *id,
                        "evicting slow subscriber on critical broadcast"
                    );
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }

    fn build_state(&self) -> RoomStateView {
        RoomStateView {
            auction_id: self.auction.id.clone(),
            title: self.auction.title.clone(),
            current_price_cents: self.current_price_cents,
            leader_user_id: self.leader.as_ref().map(|u| u.id.clone()),
            leader_handle: self.leader.as_ref().map(|u| u.handle.clone()),
            ends_at: self.ends_at,
            soft_close_seconds: self.auction.soft_close_seconds,
            min_increment_cents: self.auction.min_increment_cents,
            participants: self.participants.len(),
            participants_list: self
                .participants
                .values()
                .map(|u| ParticipantView {
                    user_id: u.id.clone(),
                    handle: u.handle.clone(),
                })
                .collect(),
            reserve_price_cents: self.auction.reserve_price_cents,
            bid_history: self.bid_history.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auction::descriptor::CreateAuctionParams;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    fn auction(duration_seconds: i64, soft_close_seconds: i64) -> Arc<Auction> {
        Arc::new(Auction::from_params(CreateAuctionParams {
            title: "Lot".to_string(),
            start_price_cents: 100,
            min_increment_cents: 10,
            duration_seconds,
            soft_close_seconds,
            reserve_price_cents: 0,
        }))
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            handle: format!("handle-{id}"),
        }
    }

    /// Test config with a tick slow enough to stay out of the way.
    fn quiet_config() -> RoomConfig {
        RoomConfig {
            tick_interval: StdDuration::from_secs(3600),
            ..RoomConfig::default()
        }
    }

    async fn next_message(sub: &mut Subscription) -> ServerMessage {
        timeout(StdDuration::from_secs(2), sub.messages.recv())
            .await
            .expect("timed out waiting for room message")
            .expect("subscriber queue closed unexpectedly")
    }

    #[tokio::test]
    async fn new_subscriber_receives_snapshot_first() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();

        match next_message(&mut sub).await {
            ServerMessage::RoomState { payload, .. } => {
                assert_eq!(payload.current_price_cents, 100);
                assert_eq!(payload.participants, 0);
                assert!(payload.leader_user_id.is_none());
            }
            other => panic!("expected room_state first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn join_broadcasts_presence_then_state() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await; // initial snapshot

        room.submit(RoomEvent::JoinRoom { user: user("a") })
            .await
            .unwrap();

        match next_message(&mut sub).await {
            ServerMessage::Presence { payload, .. } => assert_eq!(payload.participants, 1),
            other => panic!("expected presence, got {other:?}"),
        }
        match next_message(&mut sub).await {
            ServerMessage::RoomState { payload, .. } => {
                assert_eq!(payload.participants, 1);
                assert_eq!(payload.participants_list[0].user_id, "a");
            }
            other => panic!("expected room_state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn accepted_bid_updates_price_leader_and_history() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await;

        room.submit(RoomEvent::PlaceBid {
            user: Some(user("a")),
            amount_cents: 110,
        })
        .await
        .unwrap();

        match next_message(&mut sub).await {
            ServerMessage::BidAccepted { payload, .. } => {
                assert_eq!(payload.amount_cents, 110);
                assert_eq!(payload.leader_user_id, "a");
            }
            other => panic!("expected bid_accepted, got {other:?}"),
        }
        match next_message(&mut sub).await {
            ServerMessage::RoomState { payload, .. } => {
                assert_eq!(payload.current_price_cents, 110);
                assert_eq!(payload.leader_user_id.as_deref(), Some("a"));
                assert_eq!(payload.bid_history.len(), 1);
                assert!(payload.bid_history[0].accepted);
            }
            other => panic!("expected room_state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bid_below_increment_is_rejected_and_recorded() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await;

        // 100 + 10 is the minimum acceptable amount.
        room.submit(RoomEvent::PlaceBid {
            user: Some(user("a")),
            amount_cents: 105,
        })
        .await
        .unwrap();

        match next_message(&mut sub).await {
            ServerMessage::BidRejected { payload, .. } => {
                assert_eq!(payload.reason, RejectReason::BelowMinIncrement);
            }
            other => panic!("expected bid_rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bid_without_user_is_unauthorized() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await;

        room.submit(RoomEvent::PlaceBid {
            user: None,
            amount_cents: 1_000,
        })
        .await
        .unwrap();

        match next_message(&mut sub).await {
            ServerMessage::BidRejected { payload, .. } => {
                assert_eq!(payload.reason, RejectReason::Unauthorized);
            }
            other => panic!("expected bid_rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bid_after_deadline_is_rejected_closed() {
        let room = spawn_room(auction(-1, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await;

        room.submit(RoomEvent::PlaceBid {
            user: Some(user("a")),
            amount_cents: 10_000,
        })
        .await
        .unwrap();

        match next_message(&mut sub).await {
            ServerMessage::BidRejected { payload, .. } => {
                assert_eq!(payload.reason, RejectReason::AuctionClosed);
            }
            other => panic!("expected bid_rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bid_inside_soft_close_window_extends_deadline() {
        // Deadline 5 s out, window 10 s: any accepted bid extends.
        let room = spawn_room(auction(5, 10), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        let before = match next_message(&mut sub).await {
            ServerMessage::RoomState { payload, .. } => payload.ends_at,
            other => panic!("expected room_state, got {other:?}"),
        };

        room.submit(RoomEvent::PlaceBid {
            user: Some(user("b")),
            amount_cents: 110,
        })
        .await
        .unwrap();

        match next_message(&mut sub).await {
            ServerMessage::BidAccepted { payload, .. } => {
                assert_eq!(payload.ends_at, before + Duration::seconds(10));
            }
            other => panic!("expected bid_accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bid_outside_soft_close_window_keeps_deadline() {
        let room = spawn_room(auction(3600, 10), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        let before = match next_message(&mut sub).await {
            ServerMessage::RoomState { payload, .. } => payload.ends_at,
            other => panic!("expected room_state, got {other:?}"),
        };

        room.submit(RoomEvent::PlaceBid {
            user: Some(user("b")),
            amount_cents: 110,
        })
        .await
        .unwrap();

        match next_message(&mut sub).await {
            ServerMessage::BidAccepted { payload, .. } => {
                assert_eq!(payload.ends_at, before);
            }
            other => panic!("expected bid_accepted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn equal_concurrent_bids_resolve_first_wins() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await;

        // Both bids are valid against the starting price; the writer's
        // arrival order decides, and the loser sees the updated price.
        for bidder in ["a", "b"] {
            room.submit(RoomEvent::PlaceBid {
                user: Some(user(bidder)),
                amount_cents: 110,
            })
            .await
            .unwrap();
        }

        match next_message(&mut sub).await {
            ServerMessage::BidAccepted { payload, .. } => {
                assert_eq!(payload.leader_user_id, "a");
            }
            other => panic!("expected bid_accepted, got {other:?}"),
        }
        next_message(&mut sub).await; // state after acceptance
        match next_message(&mut sub).await {
            ServerMessage::BidRejected { payload, .. } => {
                assert_eq!(payload.reason, RejectReason::BelowMinIncrement);
            }
            other => panic!("expected bid_rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_subscriber_survives_lossy_but_is_evicted_on_critical() {
        let config = RoomConfig {
            subscriber_queue_capacity: 2,
            ..quiet_config()
        };
        let room = spawn_room(auction(60, 0), config);

        // Never drained: the snapshot takes one slot.
        let mut stalled = room.subscribe().await.unwrap();
        // Healthy observer used to sequence the test.
        let mut healthy = room.subscribe().await.unwrap();
        next_message(&mut healthy).await;

        // Presence + state fills the stalled queue; the overflow is dropped
        // silently (lossy).
        room.submit(RoomEvent::JoinRoom { user: user("a") })
            .await
            .unwrap();
        next_message(&mut healthy).await; // presence
        next_message(&mut healthy).await; // state

        // Critical broadcast with a full queue evicts the stalled subscriber.
        room.submit(RoomEvent::PlaceBid {
            user: Some(user("a")),
            amount_cents: 110,
        })
        .await
        .unwrap();
        match next_message(&mut healthy).await {
            ServerMessage::BidAccepted { .. } => {}
            other => panic!("expected bid_accepted, got {other:?}"),
        }

        // The stalled queue holds what fit before eviction, then closes.
        assert!(matches!(
            stalled.messages.recv().await,
            Some(ServerMessage::RoomState { .. })
        ));
        assert!(matches!(
            stalled.messages.recv().await,
            Some(ServerMessage::Presence { .. })
        ));
        assert!(stalled.messages.recv().await.is_none());
    }

    #[tokio::test]
    async fn periodic_tick_broadcasts_state() {
        let config = RoomConfig {
            tick_interval: StdDuration::from_millis(20),
            ..RoomConfig::default()
        };
        // Already closed: the room still ticks state out.
        let room = spawn_room(auction(-1, 0), config);
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await; // snapshot

        match next_message(&mut sub).await {
            ServerMessage::RoomState { .. } => {}
            other => panic!("expected ticked room_state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_queue() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let mut sub = room.subscribe().await.unwrap();
        next_message(&mut sub).await;

        room.unsubscribe(sub.id);
        assert!(
            timeout(StdDuration::from_secs(2), sub.messages.recv())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn subscriber_ids_are_monotonic() {
        let room = spawn_room(auction(60, 0), quiet_config());
        let first = room.subscribe().await.unwrap();
        let second = room.subscribe().await.unwrap();
        assert!(second.id > first.id);
    }
}

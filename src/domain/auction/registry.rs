//! Process-wide registry of auction descriptors and live rooms.
//!
//! The registry is the only shared-memory structure in the core: descriptor
//! and room maps behind a readers-writer lock. Rooms are created lazily on
//! first subscription and live for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use super::descriptor::{Auction, CreateAuctionParams};
use super::room::{spawn_room, RoomConfig, RoomHandle};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("auction {0} is already registered")]
    Duplicate(String),
}

/// Holds auctions and lazily creates one room per auction.
pub struct AuctionRegistry {
    auctions: RwLock<HashMap<String, Arc<Auction>>>,
    rooms: RwLock<HashMap<String, RoomHandle>>,
    room_config: RoomConfig,
}

impl AuctionRegistry {
    pub fn new(room_config: RoomConfig) -> Self {
        Self {
            auctions: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            room_config,
        }
    }

    /// Registers a descriptor; fails if the id is already taken.
    pub async fn register(&self, auction: Auction) -> Result<Arc<Auction>, RegistryError> {
        let mut auctions = self.auctions.write().await;
        if auctions.contains_key(&auction.id) {
            return Err(RegistryError::Duplicate(auction.id));
        }
        let auction = Arc::new(auction);
        auctions.insert(auction.id.clone(), auction.clone());
        Ok(auction)
    }

    /// Builds a descriptor from creation parameters and registers it.
    ///
    /// The unix-seconds-plus-random id scheme can collide under load, so a
    /// colliding id is simply regenerated.
    pub async fn create(&self, params: CreateAuctionParams) -> Arc<Auction> {
        loop {
            match self.register(Auction::from_params(params.clone())).await {
                Ok(auction) => {
                    tracing::info!(auction_id = %auction.id, title = %auction.title, "auction created");
                    return auction;
                }
                Err(RegistryError::Duplicate(id)) => {
                    tracing::debug!(auction_id = %id, "auction id collision, regenerating");
                }
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Auction>> {
        self.auctions.read().await.get(id).cloned()
    }

    /// Lists all descriptors, newest first.
    pub async fn list(&self) -> Vec<Arc<Auction>> {
        let mut auctions: Vec<_> = self.auctions.read().await.values().cloned().collect();
        auctions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        auctions
    }

    /// Returns the live room for an auction, creating it on first use.
    ///
    /// Returns `None` for an unknown auction id. Creation is idempotent under
    /// concurrent calls: the write lock is re-checked before inserting, so at
    /// most one writer task exists per auction.
    pub async fn room_for(&self, id: &str) -> Option<RoomHandle> {
        if let Some(room) = self.rooms.read().await.get(id) {
            return Some(room.clone());
        }

        let auction = self.get(id).await?;
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(id) {
            return Some(room.clone());
        }
        let room = spawn_room(auction, self.room_config.clone());
        rooms.insert(id.to_string(), room.clone());
        Some(room)
    }
}

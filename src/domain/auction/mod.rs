//! Auction domain: descriptors, the room engine, and the registry that
//! connects them.

mod descriptor;
mod events;
pub mod money;
mod registry;
mod room;

pub use descriptor::{Auction, CreateAuctionParams, User};
pub use events::{
    BidAcceptedPayload, BidRejectedPayload, BidView, ParticipantView, PresencePayload,
    RejectReason, RoomEvent, RoomStateView, ServerMessage,
};
pub use registry::{AuctionRegistry, RegistryError};
pub use room::{spawn_room, RoomClosed, RoomConfig, RoomHandle, SubscriberId, Subscription};

//! RTB Server - Real-Time Bidding over WebSocket and WebRTC
//!
//! Hosts live auctions, admits many concurrent participants per auction, and
//! serializes bids into a single authoritative price timeline per auction
//! through a single-writer room engine.

pub mod adapters;
pub mod config;
pub mod domain;

//! Adapters - HTTP CRUD surface and the two streaming transports.

pub mod http;
pub mod realtime;

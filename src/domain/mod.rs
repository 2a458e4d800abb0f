//! Domain layer - auction state and the rules that govern it.

pub mod auction;

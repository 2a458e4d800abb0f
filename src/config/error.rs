//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Queue capacity must be greater than zero")]
    InvalidQueueCapacity,

    #[error("Tick interval must be greater than zero")]
    InvalidTickInterval,

    #[error("Read deadline must be greater than the keepalive interval")]
    InvalidReadDeadline,

    #[error("At least one STUN server is required")]
    NoStunServers,
}

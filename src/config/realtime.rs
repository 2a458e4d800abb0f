//! Realtime transport and room engine configuration

use std::time::Duration;

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::auction::RoomConfig;

/// Tuning for the room engine and both streaming transports
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Capacity of each room's inbound event queue. A full queue
    /// back-pressures the submitting transport.
    #[serde(default = "default_input_queue_capacity")]
    pub input_queue_capacity: usize,

    /// Capacity of each subscriber's outbound queue.
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,

    /// Milliseconds between periodic room state broadcasts.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Seconds between WebSocket keepalive pings.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Seconds a connection may stay silent before it is closed.
    #[serde(default = "default_read_deadline_secs")]
    pub read_deadline_secs: u64,

    /// STUN servers offered during WebRTC negotiation.
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    /// Seconds the signaling socket is held open after the answer is sent.
    #[serde(default = "default_signal_linger_secs")]
    pub signal_linger_secs: u64,
}

impl RealtimeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    pub fn signal_linger(&self) -> Duration {
        Duration::from_secs(self.signal_linger_secs)
    }

    /// Room engine view of this configuration.
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            input_queue_capacity: self.input_queue_capacity,
            subscriber_queue_capacity: self.subscriber_queue_capacity,
            tick_interval: self.tick_interval(),
        }
    }

    /// Validate realtime configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.input_queue_capacity == 0 || self.subscriber_queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        if self.tick_interval_ms == 0 {
            return Err(ValidationError::InvalidTickInterval);
        }
        if self.read_deadline_secs <= self.keepalive_secs {
            return Err(ValidationError::InvalidReadDeadline);
        }
        if self.stun_servers.is_empty() {
            return Err(ValidationError::NoStunServers);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            input_queue_capacity: default_input_queue_capacity(),
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
            tick_interval_ms: default_tick_interval_ms(),
            keepalive_secs: default_keepalive_secs(),
            read_deadline_secs: default_read_deadline_secs(),
            stun_servers: default_stun_servers(),
            signal_linger_secs: default_signal_linger_secs(),
        }
    }
}

fn default_input_queue_capacity() -> usize {
    4096
}

fn default_subscriber_queue_capacity() -> usize {
    256
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_keepalive_secs() -> u64 {
    30
}

fn default_read_deadline_secs() -> u64 {
    60
}

fn default_stun_servers() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

fn default_signal_linger_secs() -> u64 {
    5
}

//! Network layer configuration.

use crate::NwkError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NwkConfig {
    /// Number of frame buffers shared by all pipelines
    pub buffers: usize,
    /// Number of routing table slots
    pub route_table_size: usize,
    /// Health score of fresh or confirmed routes
    pub route_default_score: u8,
    /// How long the originator waits for a network ACK per attempt (ms)
    pub ack_wait_ms: u64,
    /// Transmissions per frame before a terminal failure
    pub tx_attempts: u8,
    /// Relay frames for other nodes and maintain routes
    pub routing: bool,
    /// Number of sources tracked for duplicate rejection
    pub duplicate_table_size: usize,
    /// How long a duplicate rejection entry stays valid (ms)
    pub duplicate_ttl_ms: u64,
}

impl Default for NwkConfig {
    fn default() -> Self {
        Self {
            buffers: 5,
            route_table_size: 10,
            route_default_score: nwk_routing::DEFAULT_SCORE,
            ack_wait_ms: 100,
            tx_attempts: 3,
            routing: true,
            duplicate_table_size: 10,
            duplicate_ttl_ms: 1000,
        }
    }
}

impl NwkConfig {
    /// ACK wait per attempt
    pub fn ack_wait(&self) -> Duration {
        Duration::from_millis(self.ack_wait_ms)
    }

    /// Duplicate rejection entry lifetime
    pub fn duplicate_ttl(&self) -> Duration {
        Duration::from_millis(self.duplicate_ttl_ms)
    }

    /// Reject configurations the pipelines cannot operate with
    pub fn validate(&self) -> Result<(), NwkError> {
        if self.buffers == 0 || self.buffers > u8::MAX as usize {
            return Err(NwkError::Config(format!(
                "buffers must be within 1..=255, got {}",
                self.buffers
            )));
        }
        if self.route_table_size == 0 {
            return Err(NwkError::Config("route_table_size must be nonzero".into()));
        }
        if self.route_default_score == 0 {
            return Err(NwkError::Config(
                "route_default_score must be nonzero".into(),
            ));
        }
        if self.tx_attempts == 0 {
            return Err(NwkError::Config("tx_attempts must be nonzero".into()));
        }
        if self.duplicate_table_size == 0 {
            return Err(NwkError::Config(
                "duplicate_table_size must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

//! Routing decisions and statistics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing decision for a received frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Deliver locally (we are the destination)
    Local,
    /// Network broadcast: deliver locally, relay a copy when `relay` is set
    Broadcast {
        /// Whether the frame may be relayed past this hop
        relay: bool,
    },
    /// Forward towards the destination through `next_hop`
    Forward {
        /// Link address of the next hop
        next_hop: u16,
    },
    /// Do not deliver or forward
    Drop(DropReason),
}

/// Reason for not forwarding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    /// No route to destination
    NoRoute,
    /// Frame is restricted to a single hop
    LinkLocal,
    /// Link-layer broadcast for another node's network address
    Overheard,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NoRoute => write!(f, "no route to destination"),
            DropReason::LinkLocal => write!(f, "link-local frame"),
            DropReason::Overheard => write!(f, "overheard broadcast"),
        }
    }
}

/// Routing table statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Records created from observed traffic
    pub learned: u64,
    /// Existing records switched to a better next hop
    pub updated: u64,
    /// Records evicted by failures, route errors, or slot reuse
    pub evicted: u64,
    /// Frames resolved to a next hop for forwarding
    pub forwarded: u64,
    /// Forwarding attempts with no route
    pub no_route: u64,
}

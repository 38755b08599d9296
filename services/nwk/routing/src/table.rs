//! Adaptive routing table
//!
//! A small fixed array of records mapping a destination to the neighbour that
//! last delivered its traffic with the best link quality. Records are learned
//! from received frames, reinforced by successful routed sends, decay on
//! failures and are evicted when their score reaches zero. Position in the
//! array is a priority: successful records drift one slot towards the front
//! per outcome, and new records reuse the first empty slot or, when the table
//! is full, the last one.

use crate::router::{DropReason, RouterStats, RoutingDecision};
use nwk_wire::{FrameHeader, BROADCAST_ADDR, BROADCAST_PAN_ID};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Destination value marking an empty record; also the "no route" answer
pub const ROUTE_UNKNOWN: u16 = BROADCAST_ADDR;

/// Addresses with this bit set belong to nodes that never relay traffic
pub const TRANSIT_MASK: u16 = 0x8000;

/// Score given to fresh and freshly confirmed records
pub const DEFAULT_SCORE: u8 = 3;

/// A single routing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    /// Final destination
    pub dst: u16,
    /// Neighbour to hand frames for `dst` to
    pub next_hop: u16,
    /// Decaying health score
    pub score: u8,
    /// Link quality of the last frame that refreshed this record
    pub lqi: u8,
}

impl RouteRecord {
    /// An unused slot
    pub const EMPTY: RouteRecord = RouteRecord {
        dst: ROUTE_UNKNOWN,
        next_hop: ROUTE_UNKNOWN,
        score: 0,
        lqi: 0,
    };

    /// Whether the slot holds no route
    pub fn is_empty(&self) -> bool {
        self.dst == ROUTE_UNKNOWN
    }
}

/// Fixed-capacity adaptive routing table
#[derive(Debug, Clone)]
pub struct RoutingTable {
    records: Vec<RouteRecord>,
    default_score: u8,
    stats: RouterStats,
}

impl RoutingTable {
    /// Create a table with `size` slots (at least one) and the given default score
    pub fn new(size: usize, default_score: u8) -> Self {
        Self {
            records: vec![RouteRecord::EMPTY; size.max(1)],
            default_score: default_score.max(1),
            stats: RouterStats::default(),
        }
    }

    /// Slot holding `dst`; for [`ROUTE_UNKNOWN`] the first empty slot, or the
    /// last slot when the table is full
    fn find(&self, dst: u16) -> Option<usize> {
        match self.records.iter().position(|rec| rec.dst == dst) {
            Some(index) => Some(index),
            None if dst == ROUTE_UNKNOWN => Some(self.records.len() - 1),
            None => None,
        }
    }

    /// Next hop for `dst`, or `None` when unknown; broadcast never routes
    pub fn next_hop(&self, dst: u16) -> Option<u16> {
        if dst == BROADCAST_ADDR {
            return None;
        }

        self.records
            .iter()
            .find(|rec| rec.dst == dst)
            .map(|rec| rec.next_hop)
    }

    /// Next hop for a frame about to be forwarded, counted in the statistics
    pub fn resolve(&mut self, dst: u16) -> Option<u16> {
        let next_hop = self.next_hop(dst);
        match next_hop {
            Some(_) => self.stats.forwarded += 1,
            None => self.stats.no_route += 1,
        }
        next_hop
    }

    /// Next hop of the front-most populated record
    pub fn default_next_hop(&self) -> Option<u16> {
        self.records
            .iter()
            .find(|rec| !rec.is_empty())
            .map(|rec| rec.next_hop)
    }

    /// Learn from an accepted inbound frame received with link quality `lqi`
    pub fn learn(&mut self, header: &FrameHeader, lqi: u8) {
        let mac_src = header.mac.src_addr;
        let nwk_src = header.nwk.src_addr;

        if mac_src & TRANSIT_MASK != 0 && mac_src != nwk_src {
            debug!(
                "Ignoring frame from {:#06x} relayed by non-routing node {:#06x}",
                nwk_src, mac_src
            );
            return;
        }

        if header.mac.dst_pan_id == BROADCAST_PAN_ID || nwk_src == ROUTE_UNKNOWN {
            return;
        }

        let default_score = self.default_score;
        let index = match self.find(nwk_src) {
            Some(index) => {
                let rec = &mut self.records[index];
                if rec.next_hop != mac_src && lqi > rec.lqi {
                    debug!(
                        "Route to {:#06x} switched from {:#06x} to {:#06x} (lqi {} > {})",
                        nwk_src, rec.next_hop, mac_src, lqi, rec.lqi
                    );
                    rec.next_hop = mac_src;
                    rec.score = default_score;
                    self.stats.updated += 1;
                }
                index
            }
            None => {
                let index = self.records.len() - 1;
                let index = self.find(ROUTE_UNKNOWN).unwrap_or(index);
                let rec = &mut self.records[index];
                if !rec.is_empty() {
                    info!(
                        "Routing table full, replacing route to {:#06x} with {:#06x}",
                        rec.dst, nwk_src
                    );
                    self.stats.evicted += 1;
                }
                *rec = RouteRecord {
                    dst: nwk_src,
                    next_hop: mac_src,
                    score: default_score,
                    lqi,
                };
                self.stats.learned += 1;
                debug!("Learned route to {:#06x} via {:#06x}", nwk_src, mac_src);
                index
            }
        };

        self.records[index].lqi = lqi;
    }

    /// Account for the outcome of a routed transmission towards `dst`
    pub fn on_send_outcome(&mut self, dst: u16, success: bool) {
        if dst == ROUTE_UNKNOWN {
            return;
        }
        let Some(index) = self.find(dst) else {
            return;
        };

        let default_score = self.default_score;
        let rec = &mut self.records[index];
        if success {
            rec.score = default_score;
        } else {
            rec.score = rec.score.saturating_sub(1);
            if rec.score == 0 {
                info!(
                    "Route to {:#06x} via {:#06x} evicted after repeated failures",
                    rec.dst, rec.next_hop
                );
                rec.dst = ROUTE_UNKNOWN;
                self.stats.evicted += 1;
                return;
            }
        }

        if index > 0 {
            self.records.swap(index - 1, index);
        }
    }

    /// Drop any route to `dst`
    pub fn remove(&mut self, dst: u16) {
        if dst == ROUTE_UNKNOWN {
            return;
        }
        if let Some(index) = self.find(dst) {
            debug!("Removed route to {:#06x}", dst);
            self.records[index].dst = ROUTE_UNKNOWN;
            self.stats.evicted += 1;
        }
    }

    /// Classify a received frame relative to the local address
    pub fn decide(&self, header: &FrameHeader, local_addr: u16) -> RoutingDecision {
        let nwk = &header.nwk;

        if nwk.dst_addr == local_addr {
            return RoutingDecision::Local;
        }

        if nwk.is_broadcast() {
            return RoutingDecision::Broadcast {
                relay: !nwk.flags.contains(nwk_wire::NwkFlags::LINK_LOCAL),
            };
        }

        if nwk.flags.contains(nwk_wire::NwkFlags::LINK_LOCAL) {
            return RoutingDecision::Drop(DropReason::LinkLocal);
        }

        if header.mac.is_broadcast() {
            return RoutingDecision::Drop(DropReason::Overheard);
        }

        match self.next_hop(nwk.dst_addr) {
            Some(next_hop) => RoutingDecision::Forward { next_hop },
            None => RoutingDecision::Drop(DropReason::NoRoute),
        }
    }

    /// All slots in priority order, empty ones included
    pub fn records(&self) -> &[RouteRecord] {
        &self.records
    }

    /// Populated records in priority order
    pub fn routes(&self) -> impl Iterator<Item = &RouteRecord> {
        self.records.iter().filter(|rec| !rec.is_empty())
    }

    /// Routing statistics
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}

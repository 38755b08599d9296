//! Adaptive reactive routing for the low-power wireless network layer.
//!
//! This crate provides the fixed-capacity routing table that maps a final
//! destination to the neighbour used to reach it. Routes are never discovered
//! explicitly; they are learned from overheard traffic, reinforced or decayed
//! by the outcome of routed transmissions, and dropped on route errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod router;
pub mod table;

pub use router::*;
pub use table::*;

//! Common types used throughout `cocochain`.
//!
//! This crate provides the identifiers and the simulated clock shared by the
//! consensus core and the simulator that drives it.

mod id;
mod time;

pub use id::{NodeId, TransactionId};
pub use time::SimTime;

/// Default dimensionality of a concept vector in the reference scenario.
pub const DEFAULT_CONCEPT_DIMENSIONALITY: usize = 10;

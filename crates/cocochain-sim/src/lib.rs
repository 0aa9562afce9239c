//! # CoCoChain Simulator
//!
//! Deterministic discrete-event simulation of vehicles and roadside units
//! running the CoCoChain protocol on a straight highway.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    SimulationRunner                      │
//! │                                                          │
//! │  ScenarioConfig ──► nodes (RSUs 0..R, vehicles R..R+V)   │
//! │                                                          │
//! │  event queue (time, sequence)                            │
//! │     ├── Deliver ──► Node::handle_wire ──► actions        │
//! │     ├── Timer   ──► Node::handle_timer ──► actions       │
//! │     └── Flush   ──► per-node MetricsAggregator           │
//! │                                                          │
//! │  actions ──► Network (latency + jitter, FIFO per link)   │
//! │          ──► SimulationMetrics (Prometheus)              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every random draw comes from a stream derived from the scenario seed, so
//! two runs of the same scenario produce identical reports.

mod error;
pub mod mobility;
pub mod network;
pub mod observability;
pub mod runner;
pub mod scenario;

pub use error::{Result, SimError};
pub use mobility::{kmh_to_mps, Highway, Trajectory};
pub use network::Network;
pub use runner::{SimulationReport, SimulationRunner};
pub use scenario::{ScenarioConfig, ENV_PREFIX};

//! # Observability Module
//!
//! - **Structured Logging**: pretty or JSON `tracing` output
//! - **Prometheus Metrics**: protocol events and latencies from every node

mod logging;
mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::{EventLabels, SimulationMetrics, ROLE_RSU, ROLE_VEHICLE};

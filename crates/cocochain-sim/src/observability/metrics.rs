//! Prometheus metrics collection.
//!
//! Mirrors every node's metric samples into a `prometheus-client` registry,
//! labelled by node role.

use cocochain_consensus::MetricSample;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

/// Event counter labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    /// Node role (vehicle, rsu).
    pub role: String,
    /// Event name.
    pub event: String,
}

/// Role label values.
pub const ROLE_VEHICLE: &str = "vehicle";
/// Role label values.
pub const ROLE_RSU: &str = "rsu";

/// Metrics state container.
#[derive(Debug)]
pub struct SimulationMetrics {
    /// Prometheus registry.
    pub registry: Registry,
    /// Protocol events by role.
    pub events_total: Family<EventLabels, Counter>,
    /// End-to-end transaction latency (seconds).
    pub end_to_end_latency_seconds: Histogram,
    /// Handover authentication latency (seconds).
    pub authentication_latency_seconds: Histogram,
    /// Transactions still awaiting a decision, summed over nodes.
    pub unresolved_transactions: Gauge,
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationMetrics {
    /// Create a new metrics state with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let events_total = Family::<EventLabels, Counter>::default();
        registry.register(
            "cocochain_events",
            "Protocol events recorded by nodes",
            events_total.clone(),
        );

        let end_to_end_latency_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 16));
        registry.register(
            "cocochain_end_to_end_latency_seconds",
            "Transaction creation to finalization latency in seconds",
            end_to_end_latency_seconds.clone(),
        );

        let authentication_latency_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 12));
        registry.register(
            "cocochain_authentication_latency_seconds",
            "Handover request to result latency in seconds",
            authentication_latency_seconds.clone(),
        );

        let unresolved_transactions = Gauge::default();
        registry.register(
            "cocochain_unresolved_transactions",
            "Transactions awaiting a decision",
            unresolved_transactions.clone(),
        );

        Self {
            registry,
            events_total,
            end_to_end_latency_seconds,
            authentication_latency_seconds,
            unresolved_transactions,
        }
    }

    /// Record a sample emitted by a node with the given role.
    pub fn observe(&self, role: &str, sample: &MetricSample) {
        match sample {
            MetricSample::EndToEndLatency(latency) => {
                self.end_to_end_latency_seconds.observe(latency.as_secs_f64())
            }
            MetricSample::AuthenticationLatency(latency) => {
                self.authentication_latency_seconds.observe(latency.as_secs_f64())
            }
            other => {
                let labels = EventLabels {
                    role: role.to_string(),
                    event: event_name(other).to_string(),
                };
                self.events_total.get_or_create(&labels).inc();
            }
        }
    }

    /// Encode metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

fn event_name(sample: &MetricSample) -> &'static str {
    match sample {
        MetricSample::MessageReceived => "message_received",
        MetricSample::MalformedMessage => "malformed_message",
        MetricSample::MalformedDetected => "malformed_detected",
        MetricSample::FalsePositive => "false_positive",
        MetricSample::ValidTransaction => "valid_transaction",
        MetricSample::UndetectedCorruption => "undetected_corruption",
        MetricSample::TransactionCreated { corrupted: false } => "transaction_created",
        MetricSample::TransactionCreated { corrupted: true } => "corrupted_transaction_created",
        MetricSample::TransactionFinalized => "transaction_finalized",
        MetricSample::TransactionRejected => "transaction_rejected",
        MetricSample::TransactionStale => "transaction_stale",
        MetricSample::TransactionExpired => "transaction_expired",
        MetricSample::HandoverAttempt => "handover_attempt",
        MetricSample::HandoverSucceeded => "handover_succeeded",
        MetricSample::HandoverFailed => "handover_failed",
        MetricSample::EndToEndLatency(_) => "end_to_end_latency",
        MetricSample::AuthenticationLatency(_) => "authentication_latency",
    }
}

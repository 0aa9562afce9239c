//! Per-node metric aggregation.
//!
//! Nodes emit [`MetricSample`]s; the aggregator turns them into cumulative
//! counters, latency summaries and periodic [`MetricsReport`]s.

use cocochain_types::SimTime;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::time::Duration;

/// A single observation emitted by a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricSample {
    /// Any message was received.
    MessageReceived,
    /// A message failed to decode or was internally inconsistent.
    MalformedMessage,
    /// A corrupted transaction was rejected by the verifier.
    MalformedDetected,
    /// A clean transaction was rejected by the verifier.
    FalsePositive,
    /// A clean transaction was accepted by the verifier.
    ValidTransaction,
    /// A corrupted transaction was accepted by the verifier.
    UndetectedCorruption,
    /// A transaction was created.
    TransactionCreated {
        /// Whether an adversarial transform was applied.
        corrupted: bool,
    },
    /// The quorum finalized a transaction.
    TransactionFinalized,
    /// The quorum rejected a transaction.
    TransactionRejected,
    /// A transaction arrived too old to vote on.
    TransactionStale,
    /// A pending transaction aged out.
    TransactionExpired,
    /// A handover request was sent.
    HandoverAttempt,
    /// A handover completed.
    HandoverSucceeded,
    /// A handover was refused or timed out.
    HandoverFailed,
    /// Creation-to-finalization latency of an originated transaction.
    EndToEndLatency(Duration),
    /// Request-to-result latency of a handover.
    AuthenticationLatency(Duration),
}

/// Cumulative counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCounters {
    /// Messages received.
    pub messages_received: u64,
    /// Messages dropped as undecodable or inconsistent.
    pub malformed_messages: u64,
    /// Corrupted transactions rejected.
    pub malformed_detected: u64,
    /// Clean transactions rejected.
    pub false_positives: u64,
    /// Clean transactions accepted.
    pub valid_transactions: u64,
    /// Corrupted transactions accepted.
    pub undetected_corruptions: u64,
    /// Transactions created.
    pub transactions_created: u64,
    /// Transactions created with an adversarial transform.
    pub corrupted_created: u64,
    /// Transactions finalized.
    pub transactions_finalized: u64,
    /// Transactions rejected.
    pub transactions_rejected: u64,
    /// Transactions discarded as stale.
    pub transactions_stale: u64,
    /// Pending transactions that aged out.
    pub transactions_expired: u64,
    /// Handover requests sent.
    pub handover_attempts: u64,
    /// Handovers completed.
    pub handover_successes: u64,
    /// Handovers refused or timed out.
    pub handover_failures: u64,
}

impl AddAssign for MetricCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.messages_received += rhs.messages_received;
        self.malformed_messages += rhs.malformed_messages;
        self.malformed_detected += rhs.malformed_detected;
        self.false_positives += rhs.false_positives;
        self.valid_transactions += rhs.valid_transactions;
        self.undetected_corruptions += rhs.undetected_corruptions;
        self.transactions_created += rhs.transactions_created;
        self.corrupted_created += rhs.corrupted_created;
        self.transactions_finalized += rhs.transactions_finalized;
        self.transactions_rejected += rhs.transactions_rejected;
        self.transactions_stale += rhs.transactions_stale;
        self.transactions_expired += rhs.transactions_expired;
        self.handover_attempts += rhs.handover_attempts;
        self.handover_successes += rhs.handover_successes;
        self.handover_failures += rhs.handover_failures;
    }
}

impl MetricCounters {
    /// `fp / (valid + fp)`, or zero when no clean transaction was judged.
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.valid_transactions + self.false_positives)
    }

    /// `successes / attempts`, or zero without attempts.
    pub fn handover_success_rate(&self) -> f64 {
        ratio(self.handover_successes, self.handover_attempts)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Summary statistics over latency samples, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    /// Number of samples.
    pub count: usize,
    /// Mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
}

impl LatencySummary {
    /// Summarizes samples given in seconds. Empty input yields all zeros.
    pub fn from_secs(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
        Self {
            count: samples.len(),
            mean,
            std_dev: variance.sqrt(),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Snapshot produced at each flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Flush time.
    pub at: SimTime,
    /// Messages per second since the previous flush.
    pub throughput: f64,
    /// Cumulative counters.
    pub counters: MetricCounters,
    /// Cumulative false-positive rate.
    pub false_positive_rate: f64,
    /// Cumulative handover success rate.
    pub handover_success_rate: f64,
    /// End-to-end latency so far.
    pub end_to_end_latency: LatencySummary,
    /// Authentication latency so far.
    pub authentication_latency: LatencySummary,
}

/// Accumulates samples for one node.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    flush_interval: Duration,
    last_flush: SimTime,
    messages_since_flush: u64,
    counters: MetricCounters,
    end_to_end: Vec<f64>,
    authentication: Vec<f64>,
    history: Vec<MetricsReport>,
}

impl MetricsAggregator {
    /// Creates an aggregator that reports every `flush_interval`.
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            flush_interval,
            last_flush: SimTime::ZERO,
            messages_since_flush: 0,
            counters: MetricCounters::default(),
            end_to_end: Vec::new(),
            authentication: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Records one sample.
    pub fn record(&mut self, sample: MetricSample) {
        let c = &mut self.counters;
        match sample {
            MetricSample::MessageReceived => {
                c.messages_received += 1;
                self.messages_since_flush += 1;
            }
            MetricSample::MalformedMessage => c.malformed_messages += 1,
            MetricSample::MalformedDetected => c.malformed_detected += 1,
            MetricSample::FalsePositive => c.false_positives += 1,
            MetricSample::ValidTransaction => c.valid_transactions += 1,
            MetricSample::UndetectedCorruption => c.undetected_corruptions += 1,
            MetricSample::TransactionCreated { corrupted } => {
                c.transactions_created += 1;
                if corrupted {
                    c.corrupted_created += 1;
                }
            }
            MetricSample::TransactionFinalized => c.transactions_finalized += 1,
            MetricSample::TransactionRejected => c.transactions_rejected += 1,
            MetricSample::TransactionStale => c.transactions_stale += 1,
            MetricSample::TransactionExpired => c.transactions_expired += 1,
            MetricSample::HandoverAttempt => c.handover_attempts += 1,
            MetricSample::HandoverSucceeded => c.handover_successes += 1,
            MetricSample::HandoverFailed => c.handover_failures += 1,
            MetricSample::EndToEndLatency(latency) => self.end_to_end.push(latency.as_secs_f64()),
            MetricSample::AuthenticationLatency(latency) => {
                self.authentication.push(latency.as_secs_f64())
            }
        }
    }

    /// Flushes if a full interval has passed since the previous flush.
    pub fn maybe_flush(&mut self, now: SimTime) -> Option<&MetricsReport> {
        if now - self.last_flush < self.flush_interval {
            return None;
        }
        self.flush(now);
        self.history.last()
    }

    /// Produces a report and starts a new throughput window.
    pub fn flush(&mut self, now: SimTime) -> MetricsReport {
        let elapsed = (now - self.last_flush).as_secs_f64();
        let throughput = if elapsed > 0.0 {
            self.messages_since_flush as f64 / elapsed
        } else {
            0.0
        };
        let report = MetricsReport {
            at: now,
            throughput,
            counters: self.counters,
            false_positive_rate: self.false_positive_rate(),
            handover_success_rate: self.handover_success_rate(),
            end_to_end_latency: self.end_to_end_latency(),
            authentication_latency: self.authentication_latency(),
        };
        self.last_flush = now;
        self.messages_since_flush = 0;
        self.history.push(report.clone());
        report
    }

    /// Folds another aggregator's counters and latency samples into this one.
    pub fn absorb(&mut self, other: &MetricsAggregator) {
        self.counters += other.counters;
        self.end_to_end.extend_from_slice(&other.end_to_end);
        self.authentication.extend_from_slice(&other.authentication);
    }

    /// Cumulative counters.
    pub fn counters(&self) -> &MetricCounters {
        &self.counters
    }

    /// Reports produced so far, oldest first.
    pub fn history(&self) -> &[MetricsReport] {
        &self.history
    }

    /// See [`MetricCounters::false_positive_rate`].
    pub fn false_positive_rate(&self) -> f64 {
        self.counters.false_positive_rate()
    }

    /// See [`MetricCounters::handover_success_rate`].
    pub fn handover_success_rate(&self) -> f64 {
        self.counters.handover_success_rate()
    }

    /// Summary of end-to-end latencies.
    pub fn end_to_end_latency(&self) -> LatencySummary {
        LatencySummary::from_secs(&self.end_to_end)
    }

    /// Summary of authentication latencies.
    pub fn authentication_latency(&self) -> LatencySummary {
        LatencySummary::from_secs(&self.authentication)
    }
}

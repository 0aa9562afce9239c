//! Handover between coverage providers.
//!
//! A vehicle keeps at most one handover in flight. It asks the nearest
//! provider to take over, the provider range-checks and authenticates after a
//! short delay, and the vehicle adopts the provider when the matching result
//! arrives. Results from any other provider are ignored.

use crate::adversary::chance;
use crate::config::ProtocolConfig;
use crate::message::{HandoverRequest, HandoverResult};
use cocochain_types::{NodeId, SimTime};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Progress of a handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoverState {
    /// Request issued, not yet dispatched.
    Requested,
    /// Waiting for the provider to authenticate.
    Authenticating,
    /// The provider accepted.
    Completed,
    /// The provider refused or never answered.
    Failed,
}

/// A handover in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoverContext {
    /// Vehicle being handed over.
    pub vehicle_id: NodeId,
    /// Provider the vehicle is leaving, if any.
    pub source_provider_id: Option<NodeId>,
    /// Provider asked to take over.
    pub target_provider_id: NodeId,
    /// When the request was issued.
    pub requested_at: SimTime,
    /// Current state.
    pub state: HandoverState,
}

impl HandoverContext {
    fn from_request(request: &HandoverRequest, state: HandoverState) -> Self {
        Self {
            vehicle_id: request.vehicle_id,
            source_provider_id: request.source_provider_id,
            target_provider_id: request.target_provider_id,
            requested_at: request.requested_at,
            state,
        }
    }
}

/// Positions of coverage providers along the road.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMap {
    providers: Vec<(NodeId, f64)>,
    radius: f64,
}

impl CoverageMap {
    /// Creates a map of `(provider, position)` pairs covering `radius` meters each.
    pub fn new(providers: Vec<(NodeId, f64)>, radius: f64) -> Self {
        Self { providers, radius }
    }

    /// The provider closest to `position`, or `None` when every provider is
    /// farther than the coverage radius. Ties go to the provider listed first.
    pub fn nearest(&self, position: f64) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for &(id, at) in &self.providers {
            let distance = (position - at).abs();
            if distance > self.radius {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the map has no providers.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Coverage radius in meters.
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

/// What happened to a vehicle's handover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoverOutcome {
    /// The event did not match the handover in flight.
    Ignored,
    /// The target accepted; it is now the current provider.
    Completed {
        /// New provider.
        provider: NodeId,
        /// Time from request to result.
        latency: Duration,
    },
    /// The target refused.
    Failed {
        /// Refusing provider.
        provider: NodeId,
        /// Time from request to result.
        latency: Duration,
    },
    /// No answer within the handover timeout.
    TimedOut {
        /// Provider that never answered.
        provider: NodeId,
        /// Time waited.
        waited: Duration,
    },
}

/// Vehicle-side handover state machine.
#[derive(Debug, Clone)]
pub struct HandoverMachine {
    vehicle_id: NodeId,
    current: Option<NodeId>,
    context: Option<HandoverContext>,
}

impl HandoverMachine {
    /// Creates a machine attached to `current`.
    pub fn new(vehicle_id: NodeId, current: Option<NodeId>) -> Self {
        Self {
            vehicle_id,
            current,
            context: None,
        }
    }

    /// The provider currently serving the vehicle.
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// The handover in flight, if any.
    pub fn context(&self) -> Option<&HandoverContext> {
        self.context.as_ref()
    }

    /// Starts a handover when `nearest` differs from the current provider.
    ///
    /// Returns `None` if a handover is already in flight, the vehicle is out
    /// of coverage, or it is already attached to `nearest`.
    pub fn evaluate(&mut self, nearest: Option<NodeId>, now: SimTime) -> Option<HandoverRequest> {
        if self.context.is_some() {
            return None;
        }
        let target = nearest?;
        if self.current == Some(target) {
            return None;
        }

        let request = HandoverRequest {
            vehicle_id: self.vehicle_id,
            source_provider_id: self.current,
            target_provider_id: target,
            requested_at: now,
        };
        self.context = Some(HandoverContext::from_request(&request, HandoverState::Requested));
        Some(request)
    }

    /// Moves a requested handover to `Authenticating`. Returns false if
    /// there was nothing to advance.
    pub fn mark_authenticating(&mut self) -> bool {
        match &mut self.context {
            Some(ctx) if ctx.state == HandoverState::Requested => {
                ctx.state = HandoverState::Authenticating;
                true
            }
            _ => false,
        }
    }

    /// Applies a result from `provider_id`.
    pub fn complete(&mut self, provider_id: NodeId, success: bool, now: SimTime) -> HandoverOutcome {
        let Some(ctx) = self.context else {
            return HandoverOutcome::Ignored;
        };
        if ctx.target_provider_id != provider_id {
            tracing::debug!(
                vehicle = %self.vehicle_id,
                from = %provider_id,
                expected = %ctx.target_provider_id,
                "ignored handover result from unexpected provider"
            );
            return HandoverOutcome::Ignored;
        }

        self.context = None;
        let latency = now - ctx.requested_at;
        if success {
            self.current = Some(provider_id);
            tracing::info!(
                vehicle = %self.vehicle_id,
                provider = %provider_id,
                latency_secs = latency.as_secs_f64(),
                "handover completed"
            );
            HandoverOutcome::Completed {
                provider: provider_id,
                latency,
            }
        } else {
            tracing::info!(vehicle = %self.vehicle_id, provider = %provider_id, "handover refused");
            HandoverOutcome::Failed {
                provider: provider_id,
                latency,
            }
        }
    }

    /// Fails the handover in flight if it has waited at least `timeout`.
    pub fn expire(&mut self, now: SimTime, timeout: Duration) -> Option<HandoverOutcome> {
        let ctx = self.context?;
        let waited = now - ctx.requested_at;
        if waited < timeout {
            return None;
        }
        self.context = None;
        tracing::info!(
            vehicle = %self.vehicle_id,
            provider = %ctx.target_provider_id,
            waited_secs = waited.as_secs_f64(),
            "handover timed out"
        );
        Some(HandoverOutcome::TimedOut {
            provider: ctx.target_provider_id,
            waited,
        })
    }
}

/// What a provider does with a handover request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Range check passed; authentication completes after `delay`.
    Authenticate {
        /// Authentication delay.
        delay: Duration,
    },
    /// Range check failed; answer immediately.
    Refused(HandoverResult),
    /// The request names another provider.
    Misrouted,
    /// The vehicle already has a handover in progress here.
    InProgress,
}

/// Provider-side handover parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthorityConfig {
    /// Probability that the range check passes.
    pub range_check_pass_rate: f64,
    /// Minimum authentication delay.
    pub auth_delay_min: Duration,
    /// Maximum authentication delay.
    pub auth_delay_max: Duration,
}

impl From<&ProtocolConfig> for AuthorityConfig {
    fn from(config: &ProtocolConfig) -> Self {
        Self {
            range_check_pass_rate: config.range_check_pass_rate,
            auth_delay_min: config.auth_delay_min,
            auth_delay_max: config.auth_delay_max,
        }
    }
}

/// Provider-side handover handling.
#[derive(Debug, Clone)]
pub struct HandoverAuthority {
    provider_id: NodeId,
    config: AuthorityConfig,
    contexts: HashMap<NodeId, HandoverContext>,
}

impl HandoverAuthority {
    /// Creates an authority for `provider_id`.
    pub fn new(provider_id: NodeId, config: AuthorityConfig) -> Self {
        Self {
            provider_id,
            config,
            contexts: HashMap::new(),
        }
    }

    /// Handles an incoming request.
    pub fn on_request<R: Rng + ?Sized>(
        &mut self,
        request: &HandoverRequest,
        now: SimTime,
        rng: &mut R,
    ) -> AuthDecision {
        if request.target_provider_id != self.provider_id {
            return AuthDecision::Misrouted;
        }
        if self.contexts.contains_key(&request.vehicle_id) {
            return AuthDecision::InProgress;
        }

        if !chance(rng, self.config.range_check_pass_rate) {
            tracing::debug!(
                provider = %self.provider_id,
                vehicle = %request.vehicle_id,
                "handover range check failed"
            );
            return AuthDecision::Refused(HandoverResult {
                vehicle_id: request.vehicle_id,
                provider_id: self.provider_id,
                success: false,
            });
        }

        let delay = self.sample_delay(rng);
        tracing::debug!(
            provider = %self.provider_id,
            vehicle = %request.vehicle_id,
            at = %now,
            delay_secs = delay.as_secs_f64(),
            "authenticating handover"
        );
        let ctx = HandoverContext::from_request(request, HandoverState::Authenticating);
        self.contexts.insert(request.vehicle_id, ctx);
        AuthDecision::Authenticate { delay }
    }

    fn sample_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let lo = self.config.auth_delay_min.as_micros() as u64;
        let hi = self.config.auth_delay_max.as_micros() as u64;
        if hi <= lo {
            return self.config.auth_delay_min;
        }
        Duration::from_micros(rng.gen_range(lo..=hi))
    }

    /// Completes authentication for `vehicle`.
    ///
    /// Returns the result to send and the time since the request, or `None`
    /// if no authentication was pending.
    pub fn on_authenticated(&mut self, vehicle: NodeId, now: SimTime) -> Option<(HandoverResult, Duration)> {
        let ctx = self.contexts.remove(&vehicle)?;
        let result = HandoverResult {
            vehicle_id: vehicle,
            provider_id: self.provider_id,
            success: true,
        };
        Some((result, now - ctx.requested_at))
    }

    /// Number of authentications in progress.
    pub fn in_flight(&self) -> usize {
        self.contexts.len()
    }
}

//! The loop controller — one budget tracker and one convergence detector per
//! session behind a single `advise()` entry point.
//!
//! The budget is always consulted first: it is synchronous and cheap, so an
//! exhausted session never pays for a similarity-oracle round-trip.

use loopguard_budget::{Budget, BudgetStop, BudgetTracker, UsageSnapshot};
use loopguard_convergence::{ConvergenceAnalysis, ConvergenceConfig, ConvergenceDetector};
use loopguard_core::{LoopEvent, SimilarityOracle, ValidationError};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ContinuationDecision {
    /// Keep iterating.
    Continue,
    /// A budget check failed.
    StopBudget(BudgetStop),
    /// The detector judged the responses converged.
    StopConverged,
}

impl ContinuationDecision {
    pub fn is_stop(&self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// Human-readable reason for a stop, `None` for `Continue`.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Continue => None,
            Self::StopBudget(stop) => Some(&stop.reason),
            Self::StopConverged => Some(CONVERGED_REASON),
        }
    }
}

const CONVERGED_REASON: &str = "responses converged";

/// Per-session loop termination controller.
pub struct LoopController {
    budget: Budget,
    tracker: BudgetTracker,
    detector: ConvergenceDetector,
}

impl LoopController {
    /// Create a controller. Both configurations are validated.
    pub fn new(budget: Budget, convergence: ConvergenceConfig) -> Result<Self, ValidationError> {
        let budget = budget.validated()?;
        let detector = ConvergenceDetector::new(convergence)?;
        Ok(Self {
            budget,
            tracker: BudgetTracker::new(),
            detector,
        })
    }

    /// Attach the similarity oracle used by the detector.
    pub fn with_oracle(mut self, oracle: Arc<dyn SimilarityOracle>) -> Self {
        self.detector = self.detector.with_oracle(oracle);
        self
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    pub fn tracker(&self) -> &BudgetTracker {
        &self.tracker
    }

    pub fn detector(&self) -> &ConvergenceDetector {
        &self.detector
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        self.tracker.snapshot()
    }

    // ── Recording ──

    pub fn record_tool_call(&mut self, name: &str) {
        self.tracker.record_tool_call(name);
    }

    /// Record a generated response in both the detector and the tracker.
    ///
    /// Invalid input is rejected before either component changes.
    pub fn record_response(
        &mut self,
        text: impl Into<String>,
        confidence: f64,
    ) -> Result<Uuid, ValidationError> {
        let text = text.into();
        let id = self
            .detector
            .add_response(text.clone(), confidence, serde_json::Map::new())?;
        self.tracker.record_response(text, confidence);
        Ok(id)
    }

    pub fn record_tokens(&mut self, input: u64, output: u64) {
        self.tracker.record_tokens(input, output);
    }

    pub fn enter_depth(&mut self) {
        self.tracker.enter_depth();
    }

    pub fn exit_depth(&mut self) {
        self.tracker.exit_depth();
    }

    // ── Decisions ──

    /// Budget checks only.
    pub fn should_stop(&self) -> Option<BudgetStop> {
        self.tracker.should_stop(&self.budget)
    }

    /// Convergence check only.
    pub async fn has_converged(&mut self, force_check: bool) -> bool {
        self.detector.has_converged(force_check).await
    }

    /// Budget first, then convergence.
    pub async fn advise(&mut self) -> ContinuationDecision {
        self.advise_with(false).await
    }

    /// [`Self::advise`], optionally bypassing the detector's rate limit.
    pub async fn advise_with(&mut self, force_check: bool) -> ContinuationDecision {
        if let Some(stop) = self.should_stop() {
            info!(
                limit = %stop.limit,
                reason = %stop.reason,
                tool_calls = self.tracker.tool_calls_made(),
                "Budget stop"
            );
            return ContinuationDecision::StopBudget(stop);
        }

        if self.detector.has_converged(force_check).await {
            info!(
                responses = self.detector.response_count(),
                tool_calls = self.tracker.tool_calls_made(),
                "Convergence stop"
            );
            return ContinuationDecision::StopConverged;
        }

        debug!(
            tool_calls = self.tracker.tool_calls_made(),
            depth = self.tracker.current_depth(),
            responses = self.detector.response_count(),
            "Continue"
        );
        ContinuationDecision::Continue
    }

    pub async fn analysis(&mut self) -> ConvergenceAnalysis {
        self.detector.get_convergence_analysis().await
    }

    /// Start a fresh session with the same configuration and oracle.
    pub fn reset(&mut self) {
        self.tracker = BudgetTracker::new();
        self.detector.reset();
    }

    // ── Events ──

    /// The stream event announcing a stop decision.
    pub fn event_for(&self, decision: &ContinuationDecision) -> Option<LoopEvent> {
        match decision {
            ContinuationDecision::Continue => None,
            ContinuationDecision::StopBudget(stop) => Some(LoopEvent::BudgetExceeded {
                reason: stop.reason.clone(),
                tool_calls_made: self.tracker.tool_calls_made(),
                elapsed_ms: self.tracker.elapsed_time().as_millis() as u64,
            }),
            ContinuationDecision::StopConverged => {
                let config = self.detector.config();
                Some(LoopEvent::Converged {
                    reason: CONVERGED_REASON.into(),
                    similarity_threshold: config.similarity_threshold,
                    responses_analyzed: self.detector.last_window_len(),
                })
            }
        }
    }

    /// The closing `done` event.
    pub fn finish(&self, summary: impl Into<String>) -> LoopEvent {
        LoopEvent::Done {
            summary: summary.into(),
        }
    }
}

//! The guarded agent loop — drives iterations through a [`LoopController`].
//!
//! Each pass: pull an iteration from the source, record its tool calls,
//! tokens and response, then ask the controller whether to go on. Stop
//! decisions are published on the event bus, and every run ends with a
//! `done` event.

use crate::controller::{ContinuationDecision, LoopController};
use crate::transcript::Iteration;
use async_trait::async_trait;
use loopguard_budget::UsageSnapshot;
use loopguard_core::event::{EventBus, LoopEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the agent's iterations (a live model, a replayed transcript, ...).
#[async_trait]
pub trait IterationSource: Send {
    /// The next iteration, or `None` when the agent has nothing more to do.
    async fn next_iteration(&mut self) -> loopguard_core::Result<Option<Iteration>>;
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCause {
    Budget,
    Converged,
    /// The source ran out of iterations.
    SourceExhausted,
    /// The hard iteration cap was hit.
    IterationLimit,
}

impl std::fmt::Display for StopCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Budget => write!(f, "budget exceeded"),
            Self::Converged => write!(f, "converged"),
            Self::SourceExhausted => write!(f, "source exhausted"),
            Self::IterationLimit => write!(f, "iteration limit reached"),
        }
    }
}

/// Result of [`GuardedLoop::run`].
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The last decision the controller made.
    pub decision: ContinuationDecision,
    pub cause: StopCause,
    pub iterations: u32,
    pub summary: String,
    pub usage: UsageSnapshot,
}

/// A tool-calling loop gated by a [`LoopController`].
pub struct GuardedLoop {
    controller: LoopController,
    event_bus: Arc<EventBus>,
    max_iterations: u32,
    force_convergence_checks: bool,
}

impl GuardedLoop {
    pub fn new(controller: LoopController, event_bus: Arc<EventBus>) -> Self {
        Self {
            controller,
            event_bus,
            max_iterations: 25,
            force_convergence_checks: false,
        }
    }

    /// Set the hard cap on iterations per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Bypass the detector's rate limit on every iteration. Meant for
    /// replays, where iterations arrive faster than the stability window.
    pub fn with_forced_convergence_checks(mut self, force: bool) -> Self {
        self.force_convergence_checks = force;
        self
    }

    pub fn controller(&self) -> &LoopController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut LoopController {
        &mut self.controller
    }

    pub fn into_controller(self) -> LoopController {
        self.controller
    }

    /// Run until the controller stops the loop, the source is exhausted, or
    /// the iteration cap is hit. Source errors abort the run.
    pub async fn run(
        &mut self,
        source: &mut dyn IterationSource,
    ) -> loopguard_core::Result<LoopOutcome> {
        let mut iterations = 0u32;
        let mut decision = ContinuationDecision::Continue;

        let cause = loop {
            if iterations >= self.max_iterations {
                warn!(iterations, "Max iterations reached, ending loop");
                break StopCause::IterationLimit;
            }

            let Some(iteration) = source.next_iteration().await? else {
                debug!(iterations, "Iteration source exhausted");
                break StopCause::SourceExhausted;
            };
            iterations += 1;

            self.apply(&iteration);

            decision = self
                .controller
                .advise_with(self.force_convergence_checks)
                .await;
            if let Some(event) = self.controller.event_for(&decision) {
                self.event_bus.publish(event);
                break match decision {
                    ContinuationDecision::StopConverged => StopCause::Converged,
                    _ => StopCause::Budget,
                };
            }
        };

        let usage = self.controller.snapshot();
        let summary = format!(
            "{cause} after {iterations} iteration(s): {} tool call(s), {:.1}s",
            usage.tool_calls_made,
            usage.elapsed_ms as f64 / 1000.0
        );
        info!(%cause, iterations, tool_calls = usage.tool_calls_made, "Loop finished");
        self.event_bus.publish(self.controller.finish(summary.clone()));

        Ok(LoopOutcome {
            decision,
            cause,
            iterations,
            summary,
            usage,
        })
    }

    /// Feed one iteration into the controller.
    fn apply(&mut self, iteration: &Iteration) {
        for tool in &iteration.tool_calls {
            self.controller.record_tool_call(tool);
        }
        self.controller
            .record_tokens(iteration.input_tokens, iteration.output_tokens);

        if let Some(text) = &iteration.response {
            if let Err(e) = self.controller.record_response(text.as_str(), iteration.confidence) {
                warn!(error = %e, "Skipping invalid response");
            }
        }
    }
}

/// Collect every event currently buffered on a subscription.
pub fn drain_events(
    receiver: &mut tokio::sync::broadcast::Receiver<Arc<LoopEvent>>,
) -> Vec<LoopEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push((*event).clone());
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;
    use loopguard_budget::Budget;
    use loopguard_convergence::ConvergenceConfig;

    fn guarded(budget: Budget) -> (GuardedLoop, Arc<EventBus>) {
        let convergence = ConvergenceConfig {
            similarity_threshold: 0.5,
            convergence_ratio: 0.5,
            ..ConvergenceConfig::lexical()
        };
        let controller = LoopController::new(budget, convergence).unwrap();
        let bus = Arc::new(EventBus::default());
        (GuardedLoop::new(controller, bus.clone()), bus)
    }

    fn no_light_check() -> Budget {
        Budget {
            convergence_threshold: 1.0,
            ..Budget::default()
        }
    }

    /// Source that fails on its first call.
    struct BrokenSource;

    #[async_trait]
    impl IterationSource for BrokenSource {
        async fn next_iteration(&mut self) -> loopguard_core::Result<Option<Iteration>> {
            Err(loopguard_core::Error::Internal("model unavailable".into()))
        }
    }

    #[tokio::test]
    async fn converging_transcript_stops_early() {
        let (mut guarded, bus) = guarded(no_light_check());
        let mut events = bus.subscribe();

        let mut source = Transcript::new(vec![
            Iteration::responding("auth system uses JWT tokens", 0.8).with_tool("search_code"),
            Iteration::responding("auth system uses JWT tokens for security", 0.8)
                .with_tool("qa_codebase"),
            Iteration::responding("JWT tokens auth system security", 0.8),
            Iteration::responding("never reached", 0.8),
        ])
        .into_source();

        let outcome = guarded.run(&mut source).await.unwrap();
        assert_eq!(outcome.cause, StopCause::Converged);
        assert_eq!(outcome.decision, ContinuationDecision::StopConverged);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.usage.tool_calls_made, 2);
        assert_eq!(source.remaining(), 2);

        let events = drain_events(&mut events);
        let kinds: Vec<_> = events.iter().map(LoopEvent::event_type).collect();
        assert_eq!(kinds, vec!["converged", "done"]);
    }

    #[tokio::test]
    async fn tool_budget_stops_loop() {
        let (mut guarded, bus) = guarded(Budget {
            max_tool_calls: 4,
            max_depth: 2,
            ..no_light_check()
        });
        let mut events = bus.subscribe();

        let iterations = (0..10)
            .map(|i| {
                Iteration::responding(format!("finding number {i} about module {i}"), 0.8)
                    .with_tool("search_code")
                    .with_tool("find_entities")
            })
            .collect();
        let outcome = guarded
            .run(&mut Transcript::new(iterations).into_source())
            .await
            .unwrap();

        assert_eq!(outcome.cause, StopCause::Budget);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.summary.contains("budget exceeded"));

        let events = drain_events(&mut events);
        match &events[0] {
            LoopEvent::BudgetExceeded {
                reason,
                tool_calls_made,
                ..
            } => {
                assert!(reason.contains("max tool calls"));
                assert_eq!(*tool_calls_made, 4);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(events[1].is_terminal());
    }

    #[tokio::test]
    async fn exhausted_source_still_emits_done() {
        let (mut guarded, bus) = guarded(no_light_check());
        let mut events = bus.subscribe();

        let mut source = Transcript::new(vec![Iteration::responding("one answer", 0.9)]).into_source();
        let outcome = guarded.run(&mut source).await.unwrap();

        assert_eq!(outcome.cause, StopCause::SourceExhausted);
        assert_eq!(outcome.decision, ContinuationDecision::Continue);
        assert_eq!(outcome.iterations, 1);

        let events = drain_events(&mut events);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "done");
    }

    #[tokio::test]
    async fn iteration_cap_is_enforced() {
        let (guarded, _bus) = guarded(no_light_check());
        let mut guarded = guarded.with_max_iterations(3);

        let iterations = (0..10)
            .map(|i| Iteration::responding(format!("distinct observation {i}"), 0.9))
            .collect();
        let outcome = guarded
            .run(&mut Transcript::new(iterations).into_source())
            .await
            .unwrap();

        assert_eq!(outcome.cause, StopCause::IterationLimit);
        assert_eq!(outcome.iterations, 3);
    }

    #[tokio::test]
    async fn forced_checks_bypass_rate_limit() {
        let transcript = Transcript::new(vec![
            Iteration::responding("the scheduler uses a binary heap", 0.9),
            Iteration::responding("requests are retried three times", 0.9),
            Iteration::responding("requests are retried three times with backoff", 0.9),
            Iteration::responding("requests are retried three times with jitter", 0.9),
        ]);

        // Unforced: the second iteration's evaluation rate-limits the rest.
        let (mut unforced, _bus) = guarded(no_light_check());
        let outcome = unforced.run(&mut transcript.clone().into_source()).await.unwrap();
        assert_eq!(outcome.cause, StopCause::SourceExhausted);

        let (forced, _bus) = guarded(no_light_check());
        let mut forced = forced.with_forced_convergence_checks(true);
        let outcome = forced.run(&mut transcript.into_source()).await.unwrap();
        assert_eq!(outcome.cause, StopCause::Converged);
        assert_eq!(outcome.iterations, 4);
    }

    #[tokio::test]
    async fn invalid_responses_are_skipped() {
        let (mut guarded, _bus) = guarded(no_light_check());
        let mut source = Transcript::new(vec![
            Iteration::responding("", 0.9),
            Iteration::responding("valid", 1.7),
            Iteration::responding("a real answer", 0.9),
        ])
        .into_source();

        let outcome = guarded.run(&mut source).await.unwrap();
        assert_eq!(outcome.iterations, 3);
        assert_eq!(guarded.controller().detector().response_count(), 1);
    }

    #[tokio::test]
    async fn source_errors_propagate() {
        let (mut guarded, _bus) = guarded(Budget::default());
        let err = guarded.run(&mut BrokenSource).await.unwrap_err();
        assert!(err.to_string().contains("model unavailable"));
    }

    #[tokio::test]
    async fn tokens_are_recorded() {
        let (mut guarded, _bus) = guarded(Budget {
            max_output_tokens: 100,
            ..no_light_check()
        });
        let iterations = (0..5)
            .map(|i| Iteration::responding(format!("step {i} notes"), 0.9).with_tokens(500, 60))
            .collect();
        let outcome = guarded
            .run(&mut Transcript::new(iterations).into_source())
            .await
            .unwrap();

        assert_eq!(outcome.cause, StopCause::Budget);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.usage.output_tokens_used, 120);
    }
}

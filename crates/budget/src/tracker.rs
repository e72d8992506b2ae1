//! Budget tracker — per-session counters and the cheap stop checks.
//!
//! Everything here is synchronous and in-memory, so the controller can ask
//! it before paying for anything that might touch the network.

use crate::model::*;
use loopguard_core::{BoundedWindow, jaccard_similarity};
use std::time::{Duration, Instant};
use tracing::debug;

/// How many recent responses the tracker remembers.
pub const RECENT_RESPONSE_CAPACITY: usize = 10;

/// A response as the tracker remembers it.
#[derive(Debug, Clone)]
struct RecordedResponse {
    text: String,
    confidence: f64,
}

/// Mutable resource counters for one agent session.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    tool_calls_made: u32,
    current_depth: u32,
    input_tokens_used: u64,
    output_tokens_used: u64,
    search_calls_made: u32,
    qa_calls_made: u32,
    entity_calls_made: u32,
    start_time: Instant,
    recent_responses: BoundedWindow<RecordedResponse>,
}

impl BudgetTracker {
    /// Create a tracker whose clock starts now.
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    /// Create a tracker with an explicit start instant.
    pub fn started_at(start_time: Instant) -> Self {
        Self {
            tool_calls_made: 0,
            current_depth: 0,
            input_tokens_used: 0,
            output_tokens_used: 0,
            search_calls_made: 0,
            qa_calls_made: 0,
            entity_calls_made: 0,
            start_time,
            recent_responses: BoundedWindow::new(RECENT_RESPONSE_CAPACITY),
        }
    }

    // ── Recording ─────────────────────────────────────────────────────

    /// Count a completed tool invocation.
    pub fn record_tool_call(&mut self, name: &str) {
        self.tool_calls_made += 1;
        match ToolCategory::from_tool_name(name) {
            Some(ToolCategory::Search) => self.search_calls_made += 1,
            Some(ToolCategory::Qa) => self.qa_calls_made += 1,
            Some(ToolCategory::Entity) => self.entity_calls_made += 1,
            None => {}
        }
        debug!(tool = name, total = self.tool_calls_made, "Recorded tool call");
    }

    /// Remember a generated response, evicting the oldest past capacity.
    pub fn record_response(&mut self, text: impl Into<String>, confidence: f64) {
        self.recent_responses.push(RecordedResponse {
            text: text.into(),
            confidence,
        });
    }

    /// Accumulate token usage reported by the model.
    pub fn record_tokens(&mut self, input: u64, output: u64) {
        self.input_tokens_used = self.input_tokens_used.saturating_add(input);
        self.output_tokens_used = self.output_tokens_used.saturating_add(output);
    }

    /// Descend into a nested sub-task.
    pub fn enter_depth(&mut self) {
        self.current_depth += 1;
    }

    /// Return from a nested sub-task.
    pub fn exit_depth(&mut self) {
        self.current_depth = self.current_depth.saturating_sub(1);
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Wall-clock time since the tracker was created.
    pub fn elapsed_time(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn tool_calls_made(&self) -> u32 {
        self.tool_calls_made
    }

    pub fn current_depth(&self) -> u32 {
        self.current_depth
    }

    pub fn recent_response_count(&self) -> usize {
        self.recent_responses.len()
    }

    /// Serializable view of every counter.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            tool_calls_made: self.tool_calls_made,
            current_depth: self.current_depth,
            input_tokens_used: self.input_tokens_used,
            output_tokens_used: self.output_tokens_used,
            search_calls_made: self.search_calls_made,
            qa_calls_made: self.qa_calls_made,
            entity_calls_made: self.entity_calls_made,
            elapsed_ms: self.elapsed_time().as_millis() as u64,
            responses_recorded: self.recent_responses.len(),
        }
    }

    /// Evaluate every budget check in priority order and return the first
    /// violation, or `None` to continue.
    pub fn should_stop(&self, budget: &Budget) -> Option<BudgetStop> {
        if self.tool_calls_made >= budget.max_tool_calls {
            return Some(BudgetStop::new(
                BudgetLimit::ToolCalls,
                format!(
                    "max tool calls reached ({}/{})",
                    self.tool_calls_made, budget.max_tool_calls
                ),
            ));
        }

        if self.current_depth >= budget.max_depth {
            return Some(BudgetStop::new(
                BudgetLimit::Depth,
                format!(
                    "max depth reached ({}/{})",
                    self.current_depth, budget.max_depth
                ),
            ));
        }

        let elapsed = self.elapsed_time();
        if elapsed >= budget.time_budget {
            return Some(BudgetStop::new(
                BudgetLimit::Time,
                format!(
                    "time budget exhausted ({:.1}s/{:.1}s)",
                    elapsed.as_secs_f64(),
                    budget.time_budget.as_secs_f64()
                ),
            ));
        }

        if self.input_tokens_used >= budget.max_input_tokens {
            return Some(BudgetStop::new(
                BudgetLimit::InputTokens,
                format!(
                    "input token limit reached ({}/{})",
                    self.input_tokens_used, budget.max_input_tokens
                ),
            ));
        }

        if self.output_tokens_used >= budget.max_output_tokens {
            return Some(BudgetStop::new(
                BudgetLimit::OutputTokens,
                format!(
                    "output token limit reached ({}/{})",
                    self.output_tokens_used, budget.max_output_tokens
                ),
            ));
        }

        if self.search_calls_made >= budget.max_search_calls {
            return Some(BudgetStop::new(
                BudgetLimit::SearchCalls,
                format!(
                    "search calls limit reached ({}/{})",
                    self.search_calls_made, budget.max_search_calls
                ),
            ));
        }

        if self.qa_calls_made >= budget.max_qa_calls {
            return Some(BudgetStop::new(
                BudgetLimit::QaCalls,
                format!(
                    "QA calls limit reached ({}/{})",
                    self.qa_calls_made, budget.max_qa_calls
                ),
            ));
        }

        if self.entity_calls_made >= budget.max_entity_calls {
            return Some(BudgetStop::new(
                BudgetLimit::EntityCalls,
                format!(
                    "entity calls limit reached ({}/{})",
                    self.entity_calls_made, budget.max_entity_calls
                ),
            ));
        }

        if let Some(avg) = self.average_recent_confidence(budget.convergence_window) {
            if avg < budget.min_confidence {
                return Some(BudgetStop::new(
                    BudgetLimit::LowConfidence,
                    format!(
                        "Confidence below threshold ({avg:.2} < {:.2})",
                        budget.min_confidence
                    ),
                ));
            }
        }

        if let Some(similarity) = self.light_convergence(budget) {
            return Some(BudgetStop::new(
                BudgetLimit::Converged,
                format!(
                    "converged (average word overlap {similarity:.2} >= {:.2})",
                    budget.convergence_threshold
                ),
            ));
        }

        None
    }

    /// Word-set Jaccard overlap of two texts.
    pub fn calculate_similarity(a: &str, b: &str) -> f64 {
        jaccard_similarity(a, b)
    }

    /// Mean confidence of the last `min(len, window)` responses.
    fn average_recent_confidence(&self, window: usize) -> Option<f64> {
        if self.recent_responses.is_empty() {
            return None;
        }
        let count = self.recent_responses.len().min(window.max(1));
        let sum: f64 = self
            .recent_responses
            .last_n(count)
            .map(|r| r.confidence)
            .sum();
        Some(sum / count as f64)
    }

    /// Average pairwise word overlap over the convergence window, if it
    /// reaches the budget's threshold.
    fn light_convergence(&self, budget: &Budget) -> Option<f64> {
        if self.recent_responses.len() < 2 {
            return None;
        }

        let window: Vec<&RecordedResponse> = self
            .recent_responses
            .last_n(budget.convergence_window)
            .collect();
        if window.len() < 2 {
            return None;
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, a) in window.iter().enumerate() {
            for b in &window[i + 1..] {
                total += Self::calculate_similarity(&a.text, &b.text);
                pairs += 1;
            }
        }

        let average = total / pairs as f64;
        (average >= budget.convergence_threshold).then_some(average)
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::new()
    }
}

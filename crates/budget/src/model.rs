//! Data model for budgets, stop reasons, and usage snapshots.

use loopguard_core::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Budget ────────────────────────────────────────────────────────────────

/// Fixed resource and iteration limits for one agent session.
///
/// Build with struct-update syntax over [`Budget::default`] and call
/// [`Budget::validated`] before handing it to a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Budget {
    /// Total tool invocations allowed.
    pub max_tool_calls: u32,
    /// Maximum nesting depth of sub-tasks.
    pub max_depth: u32,
    /// Wall-clock allowance for the whole session.
    pub time_budget: Duration,
    /// Prompt tokens allowed.
    pub max_input_tokens: u64,
    /// Completion tokens allowed.
    pub max_output_tokens: u64,
    /// Mean confidence below which the session is abandoned.
    pub min_confidence: f64,
    /// Cap on `search_code` calls.
    pub max_search_calls: u32,
    /// Cap on `qa_codebase` calls.
    pub max_qa_calls: u32,
    /// Cap on `find_entities` calls.
    pub max_entity_calls: u32,
    /// Average word overlap at which the light convergence check fires.
    pub convergence_threshold: f64,
    /// Number of recent responses the light checks look at.
    pub convergence_window: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_tool_calls: 20,
            max_depth: 5,
            time_budget: Duration::from_secs(300),
            max_input_tokens: 100_000,
            max_output_tokens: 20_000,
            min_confidence: 0.3,
            max_search_calls: 10,
            max_qa_calls: 5,
            max_entity_calls: 10,
            convergence_threshold: 0.85,
            convergence_window: 3,
        }
    }
}

impl Budget {
    /// Check every invariant of the budget.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_tool_calls < 2 {
            return Err(ValidationError::config("max_tool_calls", "must be at least 2"));
        }
        if self.max_depth < 2 {
            return Err(ValidationError::config("max_depth", "must be at least 2"));
        }
        if self.max_tool_calls < self.max_depth {
            return Err(ValidationError::config(
                "max_tool_calls",
                format!(
                    "must be >= max_depth ({} < {})",
                    self.max_tool_calls, self.max_depth
                ),
            ));
        }
        if self.time_budget < Duration::from_secs(1) {
            return Err(ValidationError::config("time_budget", "must be at least 1s"));
        }
        if self.max_input_tokens == 0 {
            return Err(ValidationError::config("max_input_tokens", "must be positive"));
        }
        if self.max_output_tokens == 0 {
            return Err(ValidationError::config("max_output_tokens", "must be positive"));
        }
        if self.max_search_calls == 0 || self.max_qa_calls == 0 || self.max_entity_calls == 0 {
            return Err(ValidationError::config(
                "category caps",
                "max_search_calls, max_qa_calls and max_entity_calls must be positive",
            ));
        }
        check_unit("min_confidence", self.min_confidence)?;
        check_unit("convergence_threshold", self.convergence_threshold)?;
        if self.convergence_window < 2 {
            return Err(ValidationError::config("convergence_window", "must be at least 2"));
        }
        Ok(())
    }

    /// Validate and return the budget.
    pub fn validated(self) -> Result<Self, ValidationError> {
        self.validate()?;
        Ok(self)
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::config(
            field,
            format!("must be within [0, 1], got {value}"),
        ))
    }
}

// ── Tool categories ──────────────────────────────────────────────────────

/// Tool families with their own call caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Search,
    Qa,
    Entity,
}

impl ToolCategory {
    /// Map a tool name to its capped category, if any.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        match name {
            "search_code" => Some(Self::Search),
            "qa_codebase" => Some(Self::Qa),
            "find_entities" => Some(Self::Entity),
            _ => None,
        }
    }
}

// ── Stop reasons ─────────────────────────────────────────────────────────

/// Which budget check fired, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLimit {
    ToolCalls,
    Depth,
    Time,
    InputTokens,
    OutputTokens,
    SearchCalls,
    QaCalls,
    EntityCalls,
    LowConfidence,
    Converged,
}

impl std::fmt::Display for BudgetLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ToolCalls => "tool_calls",
            Self::Depth => "depth",
            Self::Time => "time",
            Self::InputTokens => "input_tokens",
            Self::OutputTokens => "output_tokens",
            Self::SearchCalls => "search_calls",
            Self::QaCalls => "qa_calls",
            Self::EntityCalls => "entity_calls",
            Self::LowConfidence => "low_confidence",
            Self::Converged => "converged",
        };
        f.write_str(name)
    }
}

/// A stop verdict from the budget tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStop {
    pub limit: BudgetLimit,
    pub reason: String,
}

impl BudgetStop {
    pub fn new(limit: BudgetLimit, reason: impl Into<String>) -> Self {
        Self {
            limit,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for BudgetStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reason)
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────────

/// Point-in-time view of every tracker counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub tool_calls_made: u32,
    pub current_depth: u32,
    pub input_tokens_used: u64,
    pub output_tokens_used: u64,
    pub search_calls_made: u32,
    pub qa_calls_made: u32,
    pub entity_calls_made: u32,
    pub elapsed_ms: u64,
    pub responses_recorded: usize,
}

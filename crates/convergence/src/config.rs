//! Convergence detector configuration.

use loopguard_core::ValidationError;
use std::time::Duration;

/// Immutable tuning for a [`crate::ConvergenceDetector`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceConfig {
    /// Most recent responses considered per check (2–10).
    pub window_size: usize,
    /// Responses required before any check can succeed (2–5).
    pub min_responses: usize,
    /// Pairwise similarity at which a pair counts as "similar" (0.5–1.0).
    pub similarity_threshold: f64,
    /// Fraction of similar pairs required to converge (0.5–1.0).
    pub convergence_ratio: f64,
    /// Confidence floor used by the confidence and quality signals.
    pub min_confidence: f64,
    /// Reserved decay factor for aging confidences; not applied to scoring.
    pub confidence_decay: f64,
    /// Responses older than this are ignored by checks.
    pub max_age: Duration,
    /// Minimum spacing between checks, and the span considered fully stable.
    pub stability_window: Duration,
    /// Consult the attached similarity oracle when computing pair scores.
    pub use_critic_model: bool,
    /// Weight of the oracle's similarity against the lexical baseline.
    pub critic_weight: f64,
    /// Upper bound on a single oracle round-trip.
    pub critic_timeout: Duration,
    /// Texts sent to the oracle are truncated to this many characters.
    pub critic_max_chars: usize,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            min_responses: 2,
            similarity_threshold: 0.7,
            convergence_ratio: 0.6,
            min_confidence: 0.3,
            confidence_decay: 0.1,
            max_age: Duration::from_secs(30 * 60),
            stability_window: Duration::from_secs(10),
            use_critic_model: true,
            critic_weight: 0.7,
            critic_timeout: Duration::from_secs(10),
            critic_max_chars: 1000,
        }
    }
}

impl ConvergenceConfig {
    /// Check every range and cross-field invariant.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(2..=10).contains(&self.window_size) {
            return Err(ValidationError::config(
                "window_size",
                format!("must be within 2..=10, got {}", self.window_size),
            ));
        }
        if !(2..=5).contains(&self.min_responses) {
            return Err(ValidationError::config(
                "min_responses",
                format!("must be within 2..=5, got {}", self.min_responses),
            ));
        }
        if self.window_size < self.min_responses {
            return Err(ValidationError::config(
                "window_size",
                format!(
                    "must be >= min_responses ({} < {})",
                    self.window_size, self.min_responses
                ),
            ));
        }
        check_range("similarity_threshold", self.similarity_threshold, 0.5, 1.0)?;
        check_range("convergence_ratio", self.convergence_ratio, 0.5, 1.0)?;
        check_range("min_confidence", self.min_confidence, 0.0, 1.0)?;
        check_range("confidence_decay", self.confidence_decay, 0.0, 1.0)?;
        check_range("critic_weight", self.critic_weight, 0.0, 1.0)?;
        if self.max_age.is_zero() {
            return Err(ValidationError::config("max_age", "must be positive"));
        }
        if self.stability_window.is_zero() {
            return Err(ValidationError::config("stability_window", "must be positive"));
        }
        if self.critic_timeout.is_zero() {
            return Err(ValidationError::config("critic_timeout", "must be positive"));
        }
        if self.critic_max_chars == 0 {
            return Err(ValidationError::config("critic_max_chars", "must be positive"));
        }
        Ok(())
    }

    /// Validate and return the configuration.
    pub fn validated(self) -> Result<Self, ValidationError> {
        self.validate()?;
        Ok(self)
    }

    /// Lexical-only configuration (oracle never consulted).
    pub fn lexical() -> Self {
        Self {
            use_critic_model: false,
            ..Self::default()
        }
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::config(
            field,
            format!("must be within [{min}, {max}], got {value}"),
        ))
    }
}

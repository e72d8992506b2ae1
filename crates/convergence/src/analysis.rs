//! Diagnostic report produced by [`crate::ConvergenceDetector::get_convergence_analysis`].

use crate::signals::ConvergenceSignals;
use serde::{Deserialize, Serialize};

/// Whether the detector had enough recent data to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    InsufficientData,
    Analyzed,
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "insufficient_data"),
            Self::Analyzed => write!(f, "analyzed"),
        }
    }
}

/// How pairwise similarity is being computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OracleStatus {
    /// `use_critic_model` is off.
    Disabled,
    /// Enabled, but no oracle was attached to this detector.
    Detached,
    /// Every oracle call so far succeeded.
    Healthy { name: String, calls: u64 },
    /// At least one call failed or timed out and fell back to lexical scoring.
    Degraded {
        name: String,
        calls: u64,
        failures: u64,
        last_error: String,
    },
}

impl OracleStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Thresholds the decision was evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisThresholds {
    pub similarity_threshold: f64,
    pub convergence_ratio: f64,
    pub min_weighted_score: f64,
    pub min_confidence: f64,
}

/// Full convergence breakdown for observability and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceAnalysis {
    pub status: AnalysisStatus,
    pub total_responses: usize,
    pub recent_responses: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signals: Option<ConvergenceSignals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted_score: Option<f64>,
    /// Decision a forced check would return right now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    pub thresholds: AnalysisThresholds,
    pub oracle: OracleStatus,
    pub history: Vec<bool>,
}

//! The four convergence sub-signals and their fixed weighting.
//!
//! Every signal lies in `[0, 1]`. They are pure functions of the window so
//! the detector can share them between decisions and diagnostics.

use serde::{Deserialize, Serialize};

/// Weight of each signal in the combined score.
pub const SIMILARITY_WEIGHT: f64 = 0.4;
pub const CONFIDENCE_WEIGHT: f64 = 0.25;
pub const STABILITY_WEIGHT: f64 = 0.2;
pub const QUALITY_WEIGHT: f64 = 0.15;

/// Combined score required (alongside the similarity ratio) to converge.
pub const MIN_WEIGHTED_SCORE: f64 = 0.6;

/// Confidence at which a response counts towards the quality bonus.
const HIGH_CONFIDENCE: f64 = 0.8;
const QUALITY_BONUS: f64 = 0.2;
const VARIANCE_PENALTY: f64 = 10.0;

/// Signal breakdown for one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceSignals {
    pub similarity: f64,
    pub confidence: f64,
    pub stability: f64,
    pub quality: f64,
}

impl ConvergenceSignals {
    pub fn weighted_score(&self) -> f64 {
        self.similarity * SIMILARITY_WEIGHT
            + self.confidence * CONFIDENCE_WEIGHT
            + self.stability * STABILITY_WEIGHT
            + self.quality * QUALITY_WEIGHT
    }

    /// Both conditions must hold: a high combined score and enough
    /// similar pairs.
    pub fn is_converged(&self, convergence_ratio: f64) -> bool {
        self.weighted_score() >= MIN_WEIGHTED_SCORE && self.similarity >= convergence_ratio
    }
}

/// Fraction of pair scores at or above `threshold`.
pub fn similarity_signal(pair_scores: &[f64], threshold: f64) -> f64 {
    if pair_scores.is_empty() {
        return 0.0;
    }
    let similar = pair_scores.iter().filter(|&&s| s >= threshold).count();
    similar as f64 / pair_scores.len() as f64
}

/// High when confidences are both adequate and consistent.
pub fn confidence_signal(confidences: &[f64], min_confidence: f64) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let n = confidences.len() as f64;
    let mean = confidences.iter().sum::<f64>() / n;
    if mean < min_confidence {
        return 0.0;
    }
    let variance = confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    (1.0 - VARIANCE_PENALTY * variance).max(0.0)
}

/// 1.0 while the window spans at most `stability_window_secs`, then a
/// linear decay reaching zero at three times the window.
pub fn stability_signal(span_secs: f64, stability_window_secs: f64) -> f64 {
    if span_secs <= stability_window_secs {
        return 1.0;
    }
    (1.0 - (span_secs - stability_window_secs) / (2.0 * stability_window_secs)).max(0.0)
}

/// Share of adequate responses plus a bonus for highly confident ones.
pub fn quality_signal(confidences: &[f64], min_confidence: f64) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let n = confidences.len() as f64;
    let adequate = confidences.iter().filter(|&&c| c >= min_confidence).count() as f64 / n;
    let high = confidences.iter().filter(|&&c| c >= HIGH_CONFIDENCE).count() as f64 / n;
    (adequate + QUALITY_BONUS * high).min(1.0)
}

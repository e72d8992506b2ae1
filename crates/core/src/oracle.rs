//! Similarity oracle — the narrow seam to an external semantic judge.
//!
//! The convergence detector only depends on this trait. Implementations may
//! call a remote critic model, run a local embedding model, or be a stub.

use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A semantic judgment of two texts. All values lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMetrics {
    pub similarity: f64,
    pub confidence: f64,
    pub stability: f64,
    pub quality: f64,
}

impl SimilarityMetrics {
    /// Build metrics, clamping every value into `[0, 1]`.
    ///
    /// NaN collapses to 0.0.
    pub fn clamped(similarity: f64, confidence: f64, stability: f64, quality: f64) -> Self {
        Self {
            similarity: clamp_unit(similarity),
            confidence: clamp_unit(confidence),
            stability: clamp_unit(stability),
            quality: clamp_unit(quality),
        }
    }

    /// Return a copy with every value clamped into `[0, 1]`.
    pub fn normalized(self) -> Self {
        Self::clamped(self.similarity, self.confidence, self.stability, self.quality)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// An external semantic-similarity judge.
///
/// Failures are soft: callers fall back to lexical similarity.
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    /// A human-readable name for diagnostics (e.g. "critic:openrouter").
    fn name(&self) -> &str;

    /// Judge how similar two texts are.
    async fn estimate_similarity(
        &self,
        text_a: &str,
        text_b: &str,
    ) -> std::result::Result<SimilarityMetrics, OracleError>;
}

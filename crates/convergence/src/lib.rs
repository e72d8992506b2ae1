//! # LoopGuard Convergence
//!
//! Decides whether an agent's recent responses have settled on a stable
//! answer. Each check scores a rolling window of responses on four signals
//! (pairwise similarity, confidence consistency, temporal stability and
//! response quality) and requires both a high weighted score and a high
//! share of similar pairs.
//!
//! Pair similarity is word-set Jaccard overlap, optionally blended with a
//! [`loopguard_core::SimilarityOracle`] and always discounted by the lower
//! of the two confidences.

pub mod analysis;
pub mod config;
pub mod detector;
pub mod entry;
pub mod signals;

pub use analysis::{AnalysisStatus, AnalysisThresholds, ConvergenceAnalysis, OracleStatus};
pub use config::ConvergenceConfig;
pub use detector::ConvergenceDetector;
pub use entry::{PairKey, ResponseEntry};
pub use signals::{ConvergenceSignals, MIN_WEIGHTED_SCORE};

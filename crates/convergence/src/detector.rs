//! The convergence detector — a rolling window of responses scored by four
//! weighted signals, optionally refined by a semantic-similarity oracle.
//!
//! The oracle is a soft dependency: errors and timeouts are absorbed here,
//! logged, counted, and replaced by the lexical baseline.

use crate::analysis::{AnalysisStatus, AnalysisThresholds, ConvergenceAnalysis, OracleStatus};
use crate::config::ConvergenceConfig;
use crate::entry::{PairKey, ResponseEntry};
use crate::signals::{self, ConvergenceSignals, MIN_WEIGHTED_SCORE};
use chrono::{DateTime, Utc};
use loopguard_core::{
    BoundedWindow, OracleError, SimilarityOracle, ValidationError, jaccard_similarity,
    truncate_chars,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Number of past decisions kept for diagnostics.
pub const HISTORY_CAPACITY: usize = 10;

/// Stale responses are swept on every Nth addition.
pub const CLEANUP_INTERVAL: u64 = 5;

/// Confidence assigned by [`ConvergenceDetector::add_text`].
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Per-session convergence state.
pub struct ConvergenceDetector {
    config: ConvergenceConfig,
    oracle: Option<Arc<dyn SimilarityOracle>>,
    responses: Vec<ResponseEntry>,
    similarity_cache: HashMap<PairKey, f64>,
    last_check_time: Option<DateTime<Utc>>,
    convergence_history: BoundedWindow<bool>,
    last_window_len: usize,
    additions: u64,
    oracle_calls: u64,
    oracle_failures: u64,
    last_oracle_error: Option<String>,
}

impl ConvergenceDetector {
    /// Create a detector. Fails if the configuration is out of range.
    pub fn new(config: ConvergenceConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            config,
            oracle: None,
            responses: Vec::new(),
            similarity_cache: HashMap::new(),
            last_check_time: None,
            convergence_history: BoundedWindow::new(HISTORY_CAPACITY),
            last_window_len: 0,
            additions: 0,
            oracle_calls: 0,
            oracle_failures: 0,
            last_oracle_error: None,
        })
    }

    /// Attach a similarity oracle (consulted only when `use_critic_model` is set).
    pub fn with_oracle(mut self, oracle: Arc<dyn SimilarityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &ConvergenceConfig {
        &self.config
    }

    /// All retained responses, oldest first.
    pub fn responses(&self) -> &[ResponseEntry] {
        &self.responses
    }

    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    /// Number of cached pair scores.
    pub fn cache_len(&self) -> usize {
        self.similarity_cache.len()
    }

    /// Recent decisions, oldest first.
    pub fn history(&self) -> Vec<bool> {
        self.convergence_history.iter().copied().collect()
    }

    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.last_check_time
    }

    /// Size of the window the last evaluation judged, after the `max_age`
    /// filter. Zero before the first evaluation.
    pub fn last_window_len(&self) -> usize {
        self.last_window_len
    }

    // ── Ingestion ─────────────────────────────────────────────────────

    /// Validate and append a response.
    pub fn add_response(
        &mut self,
        content: impl Into<String>,
        confidence: f64,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Uuid, ValidationError> {
        let entry = ResponseEntry::new(content, confidence, metadata)?;
        Ok(self.push_entry(entry))
    }

    /// Append a response with the default confidence and no metadata.
    pub fn add_text(&mut self, content: impl Into<String>) -> Result<Uuid, ValidationError> {
        self.add_response(content, DEFAULT_CONFIDENCE, serde_json::Map::new())
    }

    /// Append a pre-built entry (e.g. with a replayed timestamp).
    pub fn push_entry(&mut self, entry: ResponseEntry) -> Uuid {
        let id = entry.id();
        self.responses.push(entry);
        self.additions += 1;
        if self.additions % CLEANUP_INTERVAL == 0 {
            self.cleanup_old_responses();
        }
        id
    }

    /// Evict responses older than twice `max_age`. Any eviction clears the
    /// similarity cache. Returns the number of evicted entries.
    pub fn cleanup_old_responses(&mut self) -> usize {
        let now = Utc::now();
        let cutoff_secs = 2.0 * self.config.max_age.as_secs_f64();
        let before = self.responses.len();
        self.responses.retain(|entry| entry.age_secs(now) <= cutoff_secs);

        let removed = before - self.responses.len();
        if removed > 0 {
            self.similarity_cache.clear();
            debug!(
                removed,
                remaining = self.responses.len(),
                "Evicted stale responses, similarity cache cleared"
            );
        }
        removed
    }

    // ── Decisions ─────────────────────────────────────────────────────

    /// Decide whether the recent responses have converged.
    ///
    /// Without `force_check`, a call within `stability_window` of the
    /// previous evaluation returns `false` without looking at the data.
    /// Calls that bail out for lack of responses do not start the window.
    pub async fn has_converged(&mut self, force_check: bool) -> bool {
        let now = Utc::now();

        if !force_check {
            if let Some(last) = self.last_check_time {
                let since_secs = (now - last).num_milliseconds() as f64 / 1000.0;
                if since_secs < self.config.stability_window.as_secs_f64() {
                    debug!(since_secs, "Convergence check rate-limited");
                    return false;
                }
            }
        }
        if self.responses.len() < self.config.min_responses {
            return false;
        }

        let window = self.recent_window(now);
        if window.len() < self.config.min_responses {
            debug!(
                recent = window.len(),
                required = self.config.min_responses,
                "Not enough recent responses to judge convergence"
            );
            return false;
        }

        // Only evaluations count towards rate limiting.
        self.last_check_time = Some(now);
        self.last_window_len = window.len();
        let signals = self.compute_signals(&window).await;
        let weighted_score = signals.weighted_score();
        let converged = signals.is_converged(self.config.convergence_ratio);
        self.convergence_history.push(converged);

        if converged {
            info!(
                weighted_score,
                similarity = signals.similarity,
                responses = window.len(),
                "Responses converged"
            );
        } else {
            debug!(
                weighted_score,
                similarity = signals.similarity,
                confidence = signals.confidence,
                stability = signals.stability,
                quality = signals.quality,
                "Responses not converged"
            );
        }
        converged
    }

    /// Signal breakdown for the current window. Not rate-limited and not
    /// recorded in the history.
    pub async fn get_convergence_analysis(&mut self) -> ConvergenceAnalysis {
        let now = Utc::now();
        let window = self.recent_window(now);
        let thresholds = AnalysisThresholds {
            similarity_threshold: self.config.similarity_threshold,
            convergence_ratio: self.config.convergence_ratio,
            min_weighted_score: MIN_WEIGHTED_SCORE,
            min_confidence: self.config.min_confidence,
        };

        if window.len() < 2 {
            return ConvergenceAnalysis {
                status: AnalysisStatus::InsufficientData,
                total_responses: self.responses.len(),
                recent_responses: window.len(),
                signals: None,
                weighted_score: None,
                converged: None,
                thresholds,
                oracle: self.oracle_status(),
                history: self.history(),
            };
        }

        let signals = self.compute_signals(&window).await;
        let enough = self.responses.len() >= self.config.min_responses
            && window.len() >= self.config.min_responses;

        ConvergenceAnalysis {
            status: AnalysisStatus::Analyzed,
            total_responses: self.responses.len(),
            recent_responses: window.len(),
            signals: Some(signals),
            weighted_score: Some(signals.weighted_score()),
            converged: Some(enough && signals.is_converged(self.config.convergence_ratio)),
            thresholds,
            oracle: self.oracle_status(),
            history: self.history(),
        }
    }

    /// Clear all session state: responses, cache, history, rate limiter and
    /// oracle counters.
    pub fn reset(&mut self) {
        self.responses.clear();
        self.similarity_cache.clear();
        self.convergence_history.clear();
        self.last_check_time = None;
        self.last_window_len = 0;
        self.additions = 0;
        self.oracle_calls = 0;
        self.oracle_failures = 0;
        self.last_oracle_error = None;
    }

    // ── Similarity ────────────────────────────────────────────────────

    /// Confidence-discounted pairwise similarity, cached per unordered pair.
    pub async fn calculate_similarity(&mut self, a: &ResponseEntry, b: &ResponseEntry) -> f64 {
        let key = PairKey::new(a.id(), b.id());
        if let Some(&cached) = self.similarity_cache.get(&key) {
            return cached;
        }

        let lexical = jaccard_similarity(a.content(), b.content());
        let combined = match self.critic_similarity(a.content(), b.content()).await {
            Some(critic) => {
                let weight = self.config.critic_weight;
                lexical * (1.0 - weight) + critic * weight
            }
            None => lexical,
        };

        let score = combined * a.confidence().min(b.confidence());
        self.similarity_cache.insert(key, score);
        score
    }

    /// Ask the oracle, if enabled and attached. `None` means "use lexical".
    async fn critic_similarity(&mut self, a: &str, b: &str) -> Option<f64> {
        if !self.config.use_critic_model {
            return None;
        }
        let oracle = self.oracle.clone()?;
        let max_chars = self.config.critic_max_chars;
        let timeout = self.config.critic_timeout;

        self.oracle_calls += 1;
        let outcome = tokio::time::timeout(
            timeout,
            oracle.estimate_similarity(truncate_chars(a, max_chars), truncate_chars(b, max_chars)),
        )
        .await;

        match outcome {
            Ok(Ok(metrics)) => Some(metrics.normalized().similarity),
            Ok(Err(e)) => {
                self.record_oracle_failure(oracle.name(), e);
                None
            }
            Err(_) => {
                self.record_oracle_failure(
                    oracle.name(),
                    OracleError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                );
                None
            }
        }
    }

    fn record_oracle_failure(&mut self, name: &str, error: OracleError) {
        self.oracle_failures += 1;
        warn!(
            oracle = name,
            error = %error,
            failures = self.oracle_failures,
            "Similarity oracle failed, using lexical similarity"
        );
        self.last_oracle_error = Some(error.to_string());
    }

    /// How pair scores are currently being produced.
    pub fn oracle_status(&self) -> OracleStatus {
        if !self.config.use_critic_model {
            return OracleStatus::Disabled;
        }
        let Some(oracle) = &self.oracle else {
            return OracleStatus::Detached;
        };
        let name = oracle.name().to_string();
        match &self.last_oracle_error {
            Some(last_error) if self.oracle_failures > 0 => OracleStatus::Degraded {
                name,
                calls: self.oracle_calls,
                failures: self.oracle_failures,
                last_error: last_error.clone(),
            },
            _ => OracleStatus::Healthy {
                name,
                calls: self.oracle_calls,
            },
        }
    }

    // ── Internals ─────────────────────────────────────────────────────

    /// The newest `window_size` responses, most recent first, minus any
    /// older than `max_age`.
    fn recent_window(&self, now: DateTime<Utc>) -> Vec<ResponseEntry> {
        let max_age_secs = self.config.max_age.as_secs_f64();
        self.responses
            .iter()
            .rev()
            .take(self.config.window_size)
            .filter(|entry| entry.age_secs(now) <= max_age_secs)
            .cloned()
            .collect()
    }

    async fn compute_signals(&mut self, window: &[ResponseEntry]) -> ConvergenceSignals {
        let mut pair_scores = Vec::with_capacity(window.len() * window.len().saturating_sub(1) / 2);
        for (i, a) in window.iter().enumerate() {
            for b in &window[i + 1..] {
                pair_scores.push(self.calculate_similarity(a, b).await);
            }
        }

        let confidences: Vec<f64> = window.iter().map(ResponseEntry::confidence).collect();
        let newest = window.iter().map(ResponseEntry::timestamp).max();
        let oldest = window.iter().map(ResponseEntry::timestamp).min();
        let span_secs = match (oldest, newest) {
            (Some(oldest), Some(newest)) => (newest - oldest).num_milliseconds() as f64 / 1000.0,
            _ => 0.0,
        };

        ConvergenceSignals {
            similarity: signals::similarity_signal(&pair_scores, self.config.similarity_threshold),
            confidence: signals::confidence_signal(&confidences, self.config.min_confidence),
            stability: signals::stability_signal(
                span_secs,
                self.config.stability_window.as_secs_f64(),
            ),
            quality: signals::quality_signal(&confidences, self.config.min_confidence),
        }
    }
}

impl std::fmt::Debug for ConvergenceDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergenceDetector")
            .field("config", &self.config)
            .field("oracle", &self.oracle.as_ref().map(|o| o.name().to_string()))
            .field("responses", &self.responses.len())
            .field("cached_pairs", &self.similarity_cache.len())
            .field("history", &self.history())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loopguard_core::SimilarityMetrics;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // ── Test oracles ──

    /// Returns a fixed similarity and counts calls.
    struct CountingOracle {
        similarity: f64,
        calls: AtomicUsize,
    }

    impl CountingOracle {
        fn new(similarity: f64) -> Self {
            Self {
                similarity,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SimilarityOracle for CountingOracle {
        fn name(&self) -> &str {
            "counting"
        }

        async fn estimate_similarity(
            &self,
            _a: &str,
            _b: &str,
        ) -> Result<SimilarityMetrics, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SimilarityMetrics::clamped(self.similarity, 0.9, 0.9, 0.9))
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl SimilarityOracle for FailingOracle {
        fn name(&self) -> &str {
            "failing"
        }

        async fn estimate_similarity(
            &self,
            _a: &str,
            _b: &str,
        ) -> Result<SimilarityMetrics, OracleError> {
            Err(OracleError::Unavailable("connection refused".into()))
        }
    }

    struct SlowOracle;

    #[async_trait]
    impl SimilarityOracle for SlowOracle {
        fn name(&self) -> &str {
            "slow"
        }

        async fn estimate_similarity(
            &self,
            _a: &str,
            _b: &str,
        ) -> Result<SimilarityMetrics, OracleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(SimilarityMetrics::clamped(1.0, 1.0, 1.0, 1.0))
        }
    }

    /// Records the character length of every text it receives.
    #[derive(Default)]
    struct RecordingOracle {
        lengths: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl SimilarityOracle for RecordingOracle {
        fn name(&self) -> &str {
            "recording"
        }

        async fn estimate_similarity(
            &self,
            a: &str,
            b: &str,
        ) -> Result<SimilarityMetrics, OracleError> {
            let mut lengths = self.lengths.lock().unwrap();
            lengths.push(a.chars().count());
            lengths.push(b.chars().count());
            Ok(SimilarityMetrics::clamped(0.5, 0.5, 0.5, 0.5))
        }
    }

    // ── Helpers ──

    fn scenario_config() -> ConvergenceConfig {
        ConvergenceConfig {
            similarity_threshold: 0.5,
            convergence_ratio: 0.5,
            min_responses: 2,
            use_critic_model: false,
            ..ConvergenceConfig::default()
        }
    }

    fn add_jwt_responses(detector: &mut ConvergenceDetector) {
        detector.add_text("auth system uses JWT tokens").unwrap();
        detector.add_text("auth system uses JWT tokens for security").unwrap();
        detector.add_text("JWT tokens auth system security").unwrap();
    }

    fn entry_at(content: &str, confidence: f64, age: chrono::Duration) -> ResponseEntry {
        ResponseEntry::new(content, confidence, serde_json::Map::new())
            .unwrap()
            .with_timestamp(Utc::now() - age)
    }

    // ── Scenarios ──

    #[tokio::test]
    async fn similar_responses_converge() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        add_jwt_responses(&mut detector);
        assert!(detector.has_converged(false).await);
        assert_eq!(detector.history(), vec![true]);
    }

    #[tokio::test]
    async fn unrelated_responses_do_not_converge() {
        let config = ConvergenceConfig {
            similarity_threshold: 0.7,
            use_critic_model: false,
            ..ConvergenceConfig::default()
        };
        let mut detector = ConvergenceDetector::new(config).unwrap();
        detector.add_text("system uses authentication").unwrap();
        detector.add_text("database connections are pooled").unwrap();
        detector.add_text("frontend uses React components").unwrap();
        assert!(!detector.has_converged(false).await);
    }

    #[tokio::test]
    async fn high_score_without_similarity_ratio_is_not_converged() {
        let config = ConvergenceConfig {
            similarity_threshold: 0.5,
            convergence_ratio: 0.6,
            use_critic_model: false,
            ..ConvergenceConfig::default()
        };
        let mut detector = ConvergenceDetector::new(config).unwrap();
        detector.add_text("alpha beta gamma").unwrap();
        detector.add_text("alpha beta gamma").unwrap();
        detector.add_text("delta epsilon zeta").unwrap();

        let analysis = detector.get_convergence_analysis().await;
        let signals = analysis.signals.unwrap();
        assert!(analysis.weighted_score.unwrap() >= MIN_WEIGHTED_SCORE);
        assert!((signals.similarity - 1.0 / 3.0).abs() < 1e-9);
        assert!(!detector.has_converged(true).await);
    }

    #[tokio::test]
    async fn too_few_responses_never_converge() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        detector.add_text("only one response").unwrap();
        assert!(!detector.has_converged(true).await);
        assert!(detector.history().is_empty());
    }

    // ── Rate limiting & history ──

    #[tokio::test]
    async fn checks_within_stability_window_are_rate_limited() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        add_jwt_responses(&mut detector);

        assert!(detector.has_converged(false).await);
        assert!(!detector.has_converged(false).await);
        assert!(detector.has_converged(true).await);
        assert_eq!(detector.history(), vec![true, true]);
    }

    #[tokio::test]
    async fn insufficient_data_does_not_start_rate_limit() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        detector.add_text("auth system uses JWT tokens").unwrap();
        assert!(!detector.has_converged(false).await);
        assert!(detector.last_check_time().is_none());

        detector.add_text("auth system uses JWT tokens for security").unwrap();
        assert!(detector.has_converged(false).await);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        add_jwt_responses(&mut detector);
        for _ in 0..(HISTORY_CAPACITY + 5) {
            detector.has_converged(true).await;
        }
        assert_eq!(detector.history().len(), HISTORY_CAPACITY);
    }

    // ── Similarity & cache ──

    #[tokio::test]
    async fn cached_similarity_is_symmetric() {
        let oracle = Arc::new(CountingOracle::new(0.9));
        let config = ConvergenceConfig {
            use_critic_model: true,
            ..ConvergenceConfig::default()
        };
        let mut detector = ConvergenceDetector::new(config).unwrap().with_oracle(oracle.clone());

        let e1 = ResponseEntry::new("tokens expire hourly", 0.9, serde_json::Map::new()).unwrap();
        let e2 = ResponseEntry::new("tokens expire daily", 0.7, serde_json::Map::new()).unwrap();

        let forward = detector.calculate_similarity(&e1, &e2).await;
        let backward = detector.calculate_similarity(&e2, &e1).await;
        assert_eq!(forward, backward);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(detector.cache_len(), 1);
    }

    #[tokio::test]
    async fn critic_score_is_blended_and_discounted() {
        let oracle = Arc::new(CountingOracle::new(1.0));
        let config = ConvergenceConfig {
            use_critic_model: true,
            critic_weight: 0.7,
            ..ConvergenceConfig::default()
        };
        let mut detector = ConvergenceDetector::new(config).unwrap().with_oracle(oracle);

        let a = ResponseEntry::new("a b", 1.0, serde_json::Map::new()).unwrap();
        let b = ResponseEntry::new("a c", 0.5, serde_json::Map::new()).unwrap();
        // jaccard 1/3 → 1/3 * 0.3 + 1.0 * 0.7 = 0.8, discounted by min confidence 0.5
        let score = detector.calculate_similarity(&a, &b).await;
        assert!((score - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disabled_critic_is_never_called() {
        let oracle = Arc::new(CountingOracle::new(1.0));
        let mut detector = ConvergenceDetector::new(scenario_config())
            .unwrap()
            .with_oracle(oracle.clone());
        add_jwt_responses(&mut detector);
        assert!(detector.has_converged(true).await);
        assert_eq!(oracle.calls(), 0);
        assert_eq!(detector.oracle_status(), OracleStatus::Disabled);
    }

    #[tokio::test]
    async fn oracle_failure_falls_back_to_lexical() {
        let config = ConvergenceConfig {
            use_critic_model: true,
            ..scenario_config()
        };
        let mut detector = ConvergenceDetector::new(config)
            .unwrap()
            .with_oracle(Arc::new(FailingOracle));
        add_jwt_responses(&mut detector);

        assert!(detector.has_converged(true).await);

        let analysis = detector.get_convergence_analysis().await;
        match analysis.oracle {
            OracleStatus::Degraded {
                failures,
                last_error,
                ..
            } => {
                assert_eq!(failures, 3);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("expected degraded oracle, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn oracle_timeout_falls_back_to_lexical() {
        let config = ConvergenceConfig {
            use_critic_model: true,
            critic_timeout: Duration::from_millis(50),
            ..scenario_config()
        };
        let mut detector = ConvergenceDetector::new(config)
            .unwrap()
            .with_oracle(Arc::new(SlowOracle));
        add_jwt_responses(&mut detector);

        assert!(detector.has_converged(true).await);
        assert!(detector.oracle_status().is_degraded());
    }

    #[tokio::test]
    async fn oracle_inputs_are_truncated() {
        let oracle = Arc::new(RecordingOracle::default());
        let config = ConvergenceConfig {
            use_critic_model: true,
            critic_max_chars: 1000,
            ..ConvergenceConfig::default()
        };
        let mut detector = ConvergenceDetector::new(config).unwrap().with_oracle(oracle.clone());

        let long = "word ".repeat(400);
        let a = ResponseEntry::new(long.clone(), 0.8, serde_json::Map::new()).unwrap();
        let b = ResponseEntry::new("short answer", 0.8, serde_json::Map::new()).unwrap();
        detector.calculate_similarity(&a, &b).await;

        let lengths = oracle.lengths.lock().unwrap().clone();
        assert_eq!(lengths, vec![1000, 12]);
    }

    #[tokio::test]
    async fn detached_oracle_is_reported() {
        let config = ConvergenceConfig {
            use_critic_model: true,
            ..ConvergenceConfig::default()
        };
        let detector = ConvergenceDetector::new(config).unwrap();
        assert_eq!(detector.oracle_status(), OracleStatus::Detached);
    }

    // ── Aging & eviction ──

    #[tokio::test]
    async fn eviction_clears_similarity_cache() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        let old_a = entry_at("stale answer one", 0.8, chrono::Duration::hours(2));
        let old_b = entry_at("stale answer two", 0.8, chrono::Duration::hours(2));
        detector.push_entry(old_a.clone());
        detector.push_entry(old_b.clone());
        detector.calculate_similarity(&old_a, &old_b).await;
        assert_eq!(detector.cache_len(), 1);

        detector.add_text("fresh answer").unwrap();
        let removed = detector.cleanup_old_responses();
        assert_eq!(removed, 2);
        assert_eq!(detector.cache_len(), 0);
        assert_eq!(detector.response_count(), 1);
    }

    #[tokio::test]
    async fn cleanup_without_eviction_keeps_cache() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        add_jwt_responses(&mut detector);
        detector.has_converged(true).await;
        let cached = detector.cache_len();
        assert!(cached > 0);
        assert_eq!(detector.cleanup_old_responses(), 0);
        assert_eq!(detector.cache_len(), cached);
    }

    #[test]
    fn every_fifth_addition_sweeps_stale_entries() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        for i in 0..4 {
            detector.push_entry(entry_at(&format!("old {i}"), 0.8, chrono::Duration::hours(3)));
        }
        assert_eq!(detector.response_count(), 4);

        detector.add_text("fifth addition").unwrap();
        assert_eq!(detector.response_count(), 1);
    }

    #[tokio::test]
    async fn responses_older_than_max_age_are_ignored() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        detector.push_entry(entry_at("auth system uses JWT tokens", 0.8, chrono::Duration::minutes(40)));
        detector.push_entry(entry_at("auth system uses JWT tokens", 0.8, chrono::Duration::minutes(40)));
        detector.add_text("auth system uses JWT tokens").unwrap();

        assert!(!detector.has_converged(true).await);
        let analysis = detector.get_convergence_analysis().await;
        assert_eq!(analysis.status, AnalysisStatus::InsufficientData);
        assert_eq!(analysis.total_responses, 3);
        assert_eq!(analysis.recent_responses, 1);
    }

    #[tokio::test]
    async fn evaluated_window_excludes_stale_responses() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        detector.push_entry(entry_at("sessions stored in redis", 0.8, chrono::Duration::minutes(40)));
        detector.add_text("sessions stored in redis").unwrap();
        detector.add_text("sessions stored in redis").unwrap();
        assert_eq!(detector.last_window_len(), 0);

        assert!(detector.has_converged(true).await);
        assert_eq!(detector.response_count(), 3);
        assert_eq!(detector.last_window_len(), 2);

        detector.reset();
        assert_eq!(detector.last_window_len(), 0);
    }

    #[tokio::test]
    async fn spread_out_responses_lose_stability() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        detector.push_entry(entry_at("cache invalidated on write", 0.8, chrono::Duration::seconds(60)));
        detector.push_entry(entry_at("cache invalidated on write", 0.8, chrono::Duration::seconds(0)));

        let analysis = detector.get_convergence_analysis().await;
        let signals = analysis.signals.unwrap();
        assert_eq!(signals.stability, 0.0);
        assert_eq!(signals.similarity, 1.0);
    }

    // ── Diagnostics & lifecycle ──

    #[tokio::test]
    async fn analysis_reports_insufficient_data() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        detector.add_text("lonely").unwrap();
        let analysis = detector.get_convergence_analysis().await;
        assert_eq!(analysis.status, AnalysisStatus::InsufficientData);
        assert!(analysis.signals.is_none());
    }

    #[tokio::test]
    async fn analysis_does_not_touch_history() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        add_jwt_responses(&mut detector);
        let analysis = detector.get_convergence_analysis().await;
        assert_eq!(analysis.status, AnalysisStatus::Analyzed);
        assert_eq!(analysis.converged, Some(true));
        assert!(detector.history().is_empty());
        assert!(detector.last_check_time().is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        add_jwt_responses(&mut detector);
        detector.has_converged(true).await;

        detector.reset();
        assert_eq!(detector.response_count(), 0);
        assert_eq!(detector.cache_len(), 0);
        assert!(detector.history().is_empty());
        assert!(detector.last_check_time().is_none());

        // Rate limiter is cleared too: the next unforced check evaluates.
        add_jwt_responses(&mut detector);
        assert!(detector.has_converged(false).await);
    }

    #[test]
    fn invalid_responses_are_rejected() {
        let mut detector = ConvergenceDetector::new(scenario_config()).unwrap();
        assert_eq!(detector.add_text("").unwrap_err(), ValidationError::EmptyContent);
        assert!(matches!(
            detector.add_response("text", 1.5, serde_json::Map::new()),
            Err(ValidationError::ConfidenceOutOfRange(_))
        ));
        assert_eq!(detector.response_count(), 0);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ConvergenceConfig {
            window_size: 2,
            min_responses: 3,
            ..ConvergenceConfig::default()
        };
        assert!(ConvergenceDetector::new(config).is_err());
    }
}

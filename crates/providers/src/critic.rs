//! Critic oracle — a [`SimilarityOracle`] backed by any LLM [`Provider`].
//!
//! The critic is asked to compare two responses and answer with a single
//! JSON object holding four metrics in `[0, 1]`. The first JSON object in the
//! reply is parsed; surrounding prose or code fences are ignored.

use async_trait::async_trait;
use loopguard_core::{
    Message, OracleError, Provider, ProviderRequest, SimilarityMetrics, SimilarityOracle,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You compare two answers produced by an AI agent while it \
investigates the same question. Judge whether they say the same thing. Reply with only a \
JSON object of the form {\"similarity\": s, \"confidence\": c, \"stability\": t, \
\"quality\": q}, every value a number between 0 and 1. similarity: how much the answers \
agree in substance. confidence: how sure you are of that judgment. stability: whether the \
second answer settles rather than changes the first. quality: how complete and specific \
the answers are.";

/// Similarity oracle that delegates to an LLM critic.
pub struct ProviderCritic {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    name: String,
}

impl ProviderCritic {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let name = format!("critic:{}", provider.name());
        Self {
            provider,
            model: model.into(),
            max_tokens: 200,
            name,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, text_a: &str, text_b: &str) -> ProviderRequest {
        let prompt = format!("Answer A:\n{text_a}\n\nAnswer B:\n{text_b}");
        ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)],
            temperature: 0.0,
            max_tokens: Some(self.max_tokens),
        }
    }
}

#[async_trait]
impl SimilarityOracle for ProviderCritic {
    fn name(&self) -> &str {
        &self.name
    }

    async fn estimate_similarity(
        &self,
        text_a: &str,
        text_b: &str,
    ) -> Result<SimilarityMetrics, OracleError> {
        let request = self.build_request(text_a, text_b);
        let response = self.provider.complete(request).await?;
        let metrics = parse_metrics(&response.message.content)?;
        debug!(
            critic = %self.name,
            similarity = metrics.similarity,
            confidence = metrics.confidence,
            "Critic judged similarity"
        );
        Ok(metrics)
    }
}

#[derive(Debug, Deserialize)]
struct RawMetrics {
    similarity: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    stability: f64,
    #[serde(default)]
    quality: f64,
}

/// Extract the first JSON object from `reply` and read the metrics from it.
/// Values are clamped into `[0, 1]`.
pub fn parse_metrics(reply: &str) -> Result<SimilarityMetrics, OracleError> {
    let start = reply
        .find('{')
        .ok_or_else(|| OracleError::InvalidResponse("no JSON object in critic reply".into()))?;

    let value = serde_json::Deserializer::from_str(&reply[start..])
        .into_iter::<serde_json::Value>()
        .next()
        .ok_or_else(|| OracleError::InvalidResponse("empty critic reply".into()))?
        .map_err(|e| OracleError::InvalidResponse(format!("malformed JSON: {e}")))?;

    let raw: RawMetrics = serde_json::from_value(value)
        .map_err(|e| OracleError::InvalidResponse(format!("missing metrics: {e}")))?;

    Ok(SimilarityMetrics::clamped(
        raw.similarity,
        raw.confidence,
        raw.stability,
        raw.quality,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopguard_core::{ProviderError, ProviderResponse};
    use std::sync::Mutex;

    /// Provider returning a canned reply and capturing the last request.
    struct ScriptedProvider {
        reply: Result<String, ProviderError>,
        last_request: Mutex<Option<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.into()),
                last_request: Mutex::new(None),
            }
        }

        fn failing(error: ProviderError) -> Self {
            Self {
                reply: Err(error),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            *self.last_request.lock().unwrap() = Some(request.clone());
            let text = self.reply.clone()?;
            Ok(ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn parses_plain_json() {
        let m = parse_metrics(
            r#"{"similarity": 0.9, "confidence": 0.8, "stability": 0.7, "quality": 0.6}"#,
        )
        .unwrap();
        assert_eq!(m.similarity, 0.9);
        assert_eq!(m.quality, 0.6);
    }

    #[test]
    fn parses_json_inside_prose_and_fences() {
        let reply = "Sure! Here is my judgment:\n```json\n{\"similarity\": 0.75, \"confidence\": 0.9}\n```\nThe {answers} agree.";
        let m = parse_metrics(reply).unwrap();
        assert_eq!(m.similarity, 0.75);
        assert_eq!(m.confidence, 0.9);
        assert_eq!(m.stability, 0.0);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let m = parse_metrics(r#"{"similarity": 1.4, "confidence": -0.2}"#).unwrap();
        assert_eq!(m.similarity, 1.0);
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn rejects_replies_without_metrics() {
        assert!(matches!(
            parse_metrics("they look the same to me"),
            Err(OracleError::InvalidResponse(_))
        ));
        assert!(parse_metrics(r#"{"verdict": "same"}"#).is_err());
        assert!(parse_metrics("{\"similarity\": ").is_err());
    }

    #[tokio::test]
    async fn critic_sends_both_texts_deterministically() {
        let provider = Arc::new(ScriptedProvider::replying(r#"{"similarity": 0.8}"#));
        let critic = ProviderCritic::new(provider.clone(), "openai/gpt-4o-mini").with_max_tokens(64);
        assert_eq!(critic.name(), "critic:scripted");

        let m = critic
            .estimate_similarity("tokens expire hourly", "tokens expire every hour")
            .await
            .unwrap();
        assert_eq!(m.similarity, 0.8);

        let request = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.model, "openai/gpt-4o-mini");
        let prompt = &request.messages[1].content;
        assert!(prompt.contains("tokens expire hourly"));
        assert!(prompt.contains("tokens expire every hour"));
    }

    #[tokio::test]
    async fn provider_failure_becomes_oracle_error() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::RateLimited {
            retry_after_secs: 5,
        }));
        let critic = ProviderCritic::new(provider, "m");
        let err = critic.estimate_similarity("a", "b").await.unwrap_err();
        assert!(matches!(err, OracleError::Provider(ProviderError::RateLimited { .. })));
    }
}

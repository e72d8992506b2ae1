//! Recorded agent iterations and a source that replays them.

use crate::loop_runner::IterationSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

fn default_confidence() -> f64 {
    0.8
}

/// One pass of the agent's tool-calling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// Tools invoked during this iteration, in order
    #[serde(default)]
    pub tool_calls: Vec<String>,

    /// The text the model produced, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// The model's self-reported confidence in `response`
    #[serde(default = "default_confidence")]
    pub confidence: f64,

    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,
}

impl Iteration {
    /// An iteration that produced a response and called the given tools.
    pub fn responding(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            tool_calls: Vec::new(),
            response: Some(text.into()),
            confidence,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tool_calls.push(name.into());
        self
    }

    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }
}

/// A recorded session: `{"iterations": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub iterations: Vec<Iteration>,
}

impl Transcript {
    pub fn new(iterations: Vec<Iteration>) -> Self {
        Self { iterations }
    }

    pub fn from_json(json: &str) -> loopguard_core::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Replay this transcript one iteration at a time.
    pub fn into_source(self) -> TranscriptSource {
        TranscriptSource {
            remaining: self.iterations.into(),
        }
    }
}

/// [`IterationSource`] over a recorded transcript.
#[derive(Debug, Clone)]
pub struct TranscriptSource {
    remaining: VecDeque<Iteration>,
}

impl TranscriptSource {
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }
}

#[async_trait]
impl IterationSource for TranscriptSource {
    async fn next_iteration(&mut self) -> loopguard_core::Result<Option<Iteration>> {
        Ok(self.remaining.pop_front())
    }
}

//! Loop control for LoopGuard — where budgets and convergence meet the
//! agent's tool-calling loop.
//!
//! The agent follows an **Act → Record → Advise** cycle:
//!
//! 1. **Act**: the agent calls tools and produces a response
//! 2. **Record**: tool calls, token usage and the response go to the controller
//! 3. **Advise**: the controller checks the budget, then convergence
//! 4. **Stop** on a budget violation or convergence, otherwise loop back to 1
//!
//! [`LoopController`] is the per-session decision point; [`GuardedLoop`] is
//! a reference driver that runs an [`IterationSource`] through it and
//! publishes `LoopEvent`s on an event bus.

pub mod controller;
pub mod loop_runner;
pub mod transcript;

pub use controller::{ContinuationDecision, LoopController};
pub use loop_runner::{GuardedLoop, IterationSource, LoopOutcome, StopCause, drain_events};
pub use transcript::{Iteration, Transcript, TranscriptSource};

//! Budget tracking for LoopGuard sessions.
//!
//! A [`BudgetTracker`] counts tool calls, depth, tokens and elapsed time for
//! one session and answers "should we stop?" against a fixed [`Budget`]
//! without any I/O. It also carries a lightweight word-overlap convergence
//! check, independent of the richer detector in `loopguard-convergence`.

pub mod model;
pub mod tracker;

pub use model::{Budget, BudgetLimit, BudgetStop, ToolCategory, UsageSnapshot};
pub use tracker::{BudgetTracker, RECENT_RESPONSE_CAPACITY};

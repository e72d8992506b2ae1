//! LLM provider implementations and the critic oracle for LoopGuard.
//!
//! Providers implement the `loopguard_core::Provider` trait. The critic wraps
//! a provider as a `loopguard_core::SimilarityOracle`.

pub mod critic;
pub mod openai_compat;
pub mod router;

pub use critic::ProviderCritic;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_critic, build_provider, default_base_url};

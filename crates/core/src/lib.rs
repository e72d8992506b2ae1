//! # LoopGuard Core
//!
//! Domain types, traits, and error definitions for the LoopGuard loop
//! termination controller. Everything here is framework-free: the budget,
//! convergence and agent crates implement against these definitions.
//!
//! ## Design Philosophy
//!
//! External collaborators (the semantic-similarity oracle, critic LLM
//! providers, the streaming layer) are described as traits and plain event
//! types here. Implementations live in their respective crates, which keeps
//! the controller testable with stubs.

pub mod error;
pub mod event;
pub mod message;
pub mod oracle;
pub mod provider;
pub mod text;
pub mod window;

// Re-export key types at crate root for ergonomics
pub use error::{Error, OracleError, ProviderError, Result, ValidationError};
pub use event::{EventBus, LoopEvent};
pub use message::{Message, Role};
pub use oracle::{SimilarityMetrics, SimilarityOracle};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use text::{jaccard_similarity, truncate_chars};
pub use window::BoundedWindow;

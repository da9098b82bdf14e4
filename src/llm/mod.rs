//! LLM provider seam.
//!
//! Generation, query rewriting, title generation, intent classification and
//! embeddings all go through the `LlmProvider` trait so tests can substitute
//! deterministic fakes.

mod openai;
mod provider;
mod types;

pub use openai::OpenAiCompatProvider;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ChatRequest};

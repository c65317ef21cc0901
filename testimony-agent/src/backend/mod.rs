//! LLM Backend abstraction layer.
//!
//! Provides a trait-based interface over text-generation backends:
//! - OpenAI-compatible (OpenAI, vLLM, Ollama)
//! - Scripted mock backend for testing
//!
//! `Generator` sits on top and is what the pipeline stages call.

pub mod generator;
pub mod mock;
pub mod openai;
pub mod traits;

pub use generator::{Generator, GeneratorConfig};
pub use mock::{MockBackend, MockReply};
pub use openai::OpenAiBackend;
pub use traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};

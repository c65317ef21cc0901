//! Testimony Agent - survey parsing and staged testimonial generation
//!
//! Turns a pretty-printed survey submission into a stored set of customer
//! testimonials:
//! - Question-catalog driven answer extraction
//! - A dependent, transcript-threaded stage chain (acknowledge, recur-extract, summarize)
//! - Three independent length-constrained synthesis calls
//! - Result sink with recorded delivery state and a supervised retrying worker
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────┐   ┌────────────┐
//! │  extract()   │──►│ StageOrchestrator│──►│ Synthesizer │──►│ ResultSink │
//! │ (catalog)    │   │  (Transcript)    │   │ short/med/  │   │ store +    │
//! └──────────────┘   └──────────────────┘   │ long        │   │ notifier   │
//!                             │             └─────────────┘   └────────────┘
//!                             ▼
//!                    ┌──────────────────┐
//!                    │ Generator        │
//!                    │ (LlmBackend)     │
//!                    └──────────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod notifier;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;
pub mod sentiment;
pub mod sink;
pub mod store;
pub mod survey;
pub mod synthesizer;
pub mod testimonial;
pub mod transcript;
pub mod worker;

// Re-export main types for convenience
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use backend::{Generator, GeneratorConfig};
pub use error::{ErrorKind, GenerationError, NotifyError, ParseError, PipelineError, StoreError, ValidationError};
pub use notifier::{LogNotifier, Notification, Notifier};
pub use orchestrator::{Stage, StageOrchestrator, StageOutput, StageState};
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use store::{MemoryStore, SubmissionStore};
pub use survey::*;
pub use synthesizer::{SynthesisFields, SynthesisOutcome, Synthesizer, TestimonialLength};
pub use testimonial::{Completion, TestimonialSet, VariantFailure};
pub use transcript::{SerializedTurn, Transcript, Turn, TurnRole};
pub use worker::{
    recover_pending_runs, spawn_recovery_task, spawn_redelivery_task, PipelineTask, PipelineWorker, RunClaim, RunGuard,
    WorkerConfig,
};

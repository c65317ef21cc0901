//! Stage Orchestrator
//!
//! Drives the dependent generation chain for one submission:
//!
//! ```text
//! Acknowledge ──► RecurExtract ──► Summarize ──► Completed
//!      │               │               │
//!      └───────────────┴───────────────┴──────► Failed(stage)
//! ```
//!
//! Acknowledge and RecurExtract read the transcript-so-far and append their
//! human input and generated reply. Summarize uses its own system role, gets
//! the transcript as a literal value and appends nothing. Any call failure
//! halts the run; later stages are never entered.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::backend::Generator;
use crate::error::{GenerationError, PipelineError};
use crate::prompts;
use crate::survey::{DocumentId, SurveyAnswers};
use crate::transcript::{Transcript, TurnRole};

/// One step of the dependent sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Acknowledge,
    RecurExtract,
    Summarize,
}

impl Stage {
    pub const FIRST: Stage = Stage::Acknowledge;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acknowledge => "acknowledge",
            Self::RecurExtract => "recur-extract",
            Self::Summarize => "summarize",
        }
    }

    /// Successor stage; `None` after Summarize.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Acknowledge => Some(Self::RecurExtract),
            Self::RecurExtract => Some(Self::Summarize),
            Self::Summarize => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Running(Stage),
    Completed,
    Failed(Stage),
}

/// What the chain needs from a submission.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub document_id: &'a DocumentId,
    pub answers: &'a SurveyAnswers,
    /// Reference testimonials for RecurExtract
    pub corpus: &'a [String],
}

/// Result of a completed chain.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub transcript: Transcript,
    pub summary: String,
    /// States visited, in order, ending with `Completed`
    pub trace: Vec<StageState>,
}

/// Runs the three dependent stages against the stage generator.
#[derive(Clone)]
pub struct StageOrchestrator {
    generator: Generator,
}

impl StageOrchestrator {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub async fn run(&self, input: StageInput<'_>) -> Result<StageOutput, PipelineError> {
        let mut transcript = Transcript::new();
        let mut trace = Vec::with_capacity(4);
        let mut summary = None;
        let mut state = StageState::Running(Stage::FIRST);

        while let StageState::Running(stage) = state {
            trace.push(state);
            debug!(document_id = %input.document_id, stage = %stage, "entering stage");

            let result = match stage {
                Stage::Acknowledge => self.acknowledge(&input, &mut transcript).await,
                Stage::RecurExtract => self.recur_extract(&input, &mut transcript).await,
                Stage::Summarize => self.summarize(&transcript).await.map(|s| {
                    summary = Some(s);
                }),
            };

            state = match result {
                Ok(()) => match stage.next() {
                    Some(next) => StageState::Running(next),
                    None => StageState::Completed,
                },
                Err(source) => {
                    warn!(
                        document_id = %input.document_id,
                        stage = %stage,
                        error = %source,
                        "stage failed, halting run"
                    );
                    return Err(PipelineError::Stage { stage, source });
                }
            };
        }
        trace.push(state);

        let summary = summary.ok_or(PipelineError::Stage {
            stage: Stage::Summarize,
            source: GenerationError::EmptyOutput,
        })?;

        info!(
            document_id = %input.document_id,
            turns = transcript.len(),
            "stage chain completed"
        );

        Ok(StageOutput {
            transcript,
            summary,
            trace,
        })
    }

    async fn acknowledge(
        &self,
        input: &StageInput<'_>,
        transcript: &mut Transcript,
    ) -> Result<(), GenerationError> {
        let prompt = prompts::fill(
            prompts::ACKNOWLEDGE_TEMPLATE,
            &[
                ("document_id", input.document_id.as_str()),
                ("responses", &input.answers.to_prompt_literal()),
            ],
        );
        self.exchange(transcript, prompt).await
    }

    async fn recur_extract(
        &self,
        input: &StageInput<'_>,
        transcript: &mut Transcript,
    ) -> Result<(), GenerationError> {
        let corpus = render_corpus(input.corpus);
        let prompt = prompts::fill(prompts::RECUR_EXTRACT_TEMPLATE, &[("corpus", &corpus)]);
        self.exchange(transcript, prompt).await
    }

    async fn summarize(&self, transcript: &Transcript) -> Result<String, GenerationError> {
        let prompt = prompts::fill(
            prompts::SUMMARIZE_TEMPLATE,
            &[("history", &transcript.to_prompt_literal())],
        );
        self.generator
            .generate(prompts::SUMMARIZE_SYSTEM, &[], &prompt)
            .await
    }

    /// One call over the shared transcript. Both turns are appended only on success.
    async fn exchange(
        &self,
        transcript: &mut Transcript,
        prompt: String,
    ) -> Result<(), GenerationError> {
        let reply = self
            .generator
            .generate(prompts::STAGE_SYSTEM, transcript.snapshot(), &prompt)
            .await?;
        transcript.append(TurnRole::Human, prompt);
        transcript.append(TurnRole::Generated, reply);
        Ok(())
    }
}

fn render_corpus(corpus: &[String]) -> String {
    if corpus.is_empty() {
        return prompts::EMPTY_CORPUS.to_string();
    }
    serde_json::to_string(corpus).unwrap_or_else(|_| prompts::EMPTY_CORPUS.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GeneratorConfig, MockBackend, MockReply};
    use std::sync::Arc;

    fn answers() -> SurveyAnswers {
        let mut answers = SurveyAnswers::default();
        answers.insert("How would you rate...", "Easy");
        answers
    }

    fn orchestrator(backend: Arc<MockBackend>) -> StageOrchestrator {
        StageOrchestrator::new(Generator::new(backend, GeneratorConfig::stage()))
    }

    #[test]
    fn test_stage_sequence_is_fixed() {
        assert_eq!(Stage::FIRST.next(), Some(Stage::RecurExtract));
        assert_eq!(Stage::RecurExtract.next(), Some(Stage::Summarize));
        assert_eq!(Stage::Summarize.next(), None);
        assert_eq!(
            serde_json::to_value(Stage::RecurExtract).unwrap(),
            serde_json::json!("recur-extract")
        );
    }

    #[tokio::test]
    async fn test_full_chain_builds_transcript_and_summary() {
        let backend = Arc::new(
            MockBackend::default()
                .on("conversation_history", MockReply::Text("the summary".into()))
                .on("Historical Documents", MockReply::Text("recurring: great".into()))
                .on("Survey response", MockReply::Text("ack".into())),
        );
        let id = DocumentId::new("doc-1");
        let answers = answers();
        let corpus = vec!["Great service".to_string()];

        let output = orchestrator(backend.clone())
            .run(StageInput {
                document_id: &id,
                answers: &answers,
                corpus: &corpus,
            })
            .await
            .unwrap();

        assert_eq!(output.summary, "the summary");
        let roles: Vec<TurnRole> = output.transcript.snapshot().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            [TurnRole::Human, TurnRole::Generated, TurnRole::Human, TurnRole::Generated]
        );
        assert_eq!(output.transcript.snapshot()[1].text, "ack");
        assert_eq!(output.transcript.snapshot()[3].text, "recurring: great");
        assert_eq!(
            output.trace,
            vec![
                StageState::Running(Stage::Acknowledge),
                StageState::Running(Stage::RecurExtract),
                StageState::Running(Stage::Summarize),
                StageState::Completed,
            ]
        );

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        // RecurExtract sees the acknowledge exchange as history
        assert_eq!(requests[1].messages.len(), 3);
        assert!(requests[1].messages[2].content.contains("Great service"));
        // Summarize gets no shared history, only the literal
        assert_eq!(requests[2].messages.len(), 1);
        assert_eq!(
            requests[2].system_prompt.as_deref(),
            Some(prompts::SUMMARIZE_SYSTEM)
        );
        assert!(requests[2].messages[0].content.contains("\"type\":\"ai\""));
    }

    #[tokio::test]
    async fn test_failure_halts_later_stages() {
        let backend = Arc::new(
            MockBackend::default()
                .on("Survey response", MockReply::Text("ack".into()))
                .on("Historical Documents", MockReply::Fail("overloaded".into())),
        );
        let id = DocumentId::new("doc-2");
        let answers = answers();

        let err = orchestrator(backend.clone())
            .run(StageInput {
                document_id: &id,
                answers: &answers,
                corpus: &[],
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Stage {
                stage: Stage::RecurExtract,
                ..
            }
        ));
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_stated() {
        let backend = Arc::new(MockBackend::default().with_response("ok"));
        let id = DocumentId::new("doc-3");
        let answers = answers();

        orchestrator(backend.clone())
            .run(StageInput {
                document_id: &id,
                answers: &answers,
                corpus: &[],
            })
            .await
            .unwrap();

        let recur = &backend.requests()[1];
        assert!(recur
            .last_user_content()
            .unwrap()
            .contains(prompts::EMPTY_CORPUS));
    }
}

//! Pipeline facade
//!
//! Wires the extractor, stage orchestrator, sentiment probe, synthesizer and
//! result sink over injected collaborators, and records every run's outcome
//! as status on the submission.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::backend::Generator;
use crate::error::PipelineError;
use crate::notifier::Notifier;
use crate::orchestrator::{StageInput, StageOrchestrator};
use crate::sentiment::SentimentProbe;
use crate::sink::{ResultSink, DEFAULT_MAX_DELIVERY_ATTEMPTS};
use crate::store::SubmissionStore;
use crate::survey::{
    extract, DeliveryStatus, DocumentId, NewSubmission, QuestionCatalog, Submission,
    SubmissionForm, SubmissionStatus,
};
use crate::synthesizer::{SynthesisFields, Synthesizer, TestimonialLength};
use crate::testimonial::{Completion, TestimonialSet};
use crate::transcript::{SerializedTurn, Transcript};
use crate::worker::RunGuard;

/// Tunables for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How many stored testimonials feed the Recur-Extract corpus
    pub corpus_limit: usize,
    /// Fixed reference testimonials appended to the stored ones
    pub seed_corpus: Vec<String>,
    pub sentiment_enabled: bool,
    pub notify_timeout: Duration,
    /// Notification attempts before delivery is abandoned
    pub max_delivery_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            corpus_limit: 20,
            seed_corpus: Vec::new(),
            sentiment_enabled: true,
            notify_timeout: Duration::from_secs(10),
            max_delivery_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub document_id: DocumentId,
    pub submission_id: String,
    pub completion: Completion,
    pub failed_variants: Vec<TestimonialLength>,
    pub delivery: DeliveryStatus,
    pub sentiment: Option<f64>,
}

pub struct Pipeline {
    catalog: Arc<QuestionCatalog>,
    store: Arc<dyn SubmissionStore>,
    orchestrator: StageOrchestrator,
    sentiment: Option<SentimentProbe>,
    synthesizer: Synthesizer,
    sink: ResultSink,
    runs: RunGuard,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<QuestionCatalog>,
        store: Arc<dyn SubmissionStore>,
        notifier: Arc<dyn Notifier>,
        stage_generator: Generator,
        synthesis_generator: Generator,
        config: PipelineConfig,
    ) -> Self {
        let sentiment = config
            .sentiment_enabled
            .then(|| SentimentProbe::new(stage_generator.clone()));

        Self {
            catalog,
            sink: ResultSink::new(store.clone(), notifier, config.notify_timeout)
                .with_max_delivery_attempts(config.max_delivery_attempts),
            store,
            orchestrator: StageOrchestrator::new(stage_generator),
            sentiment,
            synthesizer: Synthesizer::new(synthesis_generator),
            runs: RunGuard::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn SubmissionStore> {
        &self.store
    }

    pub fn catalog(&self) -> &QuestionCatalog {
        &self.catalog
    }

    pub fn run_guard(&self) -> &RunGuard {
        &self.runs
    }

    /// Validate, extract and persist a webhook submission.
    ///
    /// Parse failures abort before anything is stored.
    pub async fn ingest(&self, form: &SubmissionForm) -> Result<Submission, PipelineError> {
        form.validate()?;
        let extraction = extract(&form.pretty, &self.catalog)?;

        let submission = self
            .store
            .insert_submission(NewSubmission {
                submission_id: form.submission_id.trim().to_string(),
                form_id: form.form_id.trim().to_string(),
                webhook_url: form.webhook_url.trim().to_string(),
                contact: extraction.contact,
                answers: extraction.answers,
            })
            .await?;

        info!(
            submission_id = %submission.submission_id,
            document_id = %submission.document_id,
            answers = submission.answers.len(),
            "submission ingested"
        );
        Ok(submission)
    }

    /// Full run: stage chain, sentiment, synthesis, sink.
    pub async fn run(&self, document_id: &DocumentId) -> Result<RunReport, PipelineError> {
        let submission = self.store.load_submission(document_id).await?;
        let _claim = self
            .runs
            .try_claim(&submission.submission_id)
            .ok_or_else(|| PipelineError::AlreadyRunning(submission.submission_id.clone()))?;

        self.store
            .set_status(document_id, SubmissionStatus::Running)
            .await?;
        info!(
            submission_id = %submission.submission_id,
            document_id = %document_id,
            retry_count = submission.retry_count,
            "pipeline run started"
        );

        let result = self.execute(&submission).await;
        self.finish(&submission, result).await
    }

    /// Synthesis and sink from an externally produced summary and transcript.
    pub async fn resume_from_summary(
        &self,
        document_id: &DocumentId,
        summary: String,
        history: &[SerializedTurn],
    ) -> Result<RunReport, PipelineError> {
        let submission = self.store.load_submission(document_id).await?;
        let _claim = self
            .runs
            .try_claim(&submission.submission_id)
            .ok_or_else(|| PipelineError::AlreadyRunning(submission.submission_id.clone()))?;

        self.store
            .set_status(document_id, SubmissionStatus::Running)
            .await?;
        let transcript = Transcript::from_serialized(history);

        let result = self
            .synthesize_and_commit(&submission, summary, &transcript, None)
            .await;
        self.finish(&submission, result).await
    }

    /// Retry undelivered notifications. Returns how many went through.
    ///
    /// Submissions past `max_delivery_attempts` come back `abandoned` and
    /// drop out of later sweeps.
    pub async fn redeliver_pending(&self) -> Result<usize, PipelineError> {
        let pending = self.store.pending_deliveries().await?;
        let mut delivered = 0;

        for submission in pending {
            if self.runs.is_running(&submission.submission_id) {
                continue;
            }
            let state = self.sink.deliver(&submission).await;
            if state.status == DeliveryStatus::Delivered {
                delivered += 1;
            }
        }

        if delivered > 0 {
            info!(delivered, "redelivered pending notifications");
        }
        Ok(delivered)
    }

    async fn execute(&self, submission: &Submission) -> Result<RunReport, PipelineError> {
        let corpus = self.corpus(&submission.submission_id).await?;
        let output = self
            .orchestrator
            .run(StageInput {
                document_id: &submission.document_id,
                answers: &submission.answers,
                corpus: &corpus,
            })
            .await?;

        let sentiment = match &self.sentiment {
            Some(probe) => probe.score(&submission.document_id, &output.transcript).await,
            None => None,
        };

        self.synthesize_and_commit(submission, output.summary, &output.transcript, sentiment)
            .await
    }

    async fn synthesize_and_commit(
        &self,
        submission: &Submission,
        summary: String,
        transcript: &Transcript,
        sentiment: Option<f64>,
    ) -> Result<RunReport, PipelineError> {
        let fields = SynthesisFields::from_answers(&submission.answers, &self.catalog);
        let outcome = self.synthesizer.synthesize(&summary, &fields).await;

        let set = TestimonialSet::assemble(
            submission.submission_id.clone(),
            submission.document_id.clone(),
            summary,
            transcript,
            outcome,
            sentiment,
        )?;
        let delivery = self.sink.commit(submission, &set).await?;

        Ok(RunReport {
            document_id: submission.document_id.clone(),
            submission_id: submission.submission_id.clone(),
            completion: set.completion,
            failed_variants: set.failed_lengths(),
            delivery: delivery.status,
            sentiment: set.sentiment,
        })
    }

    /// Record a failed run's status before handing the result back.
    async fn finish(
        &self,
        submission: &Submission,
        result: Result<RunReport, PipelineError>,
    ) -> Result<RunReport, PipelineError> {
        match &result {
            Ok(report) => info!(
                submission_id = %report.submission_id,
                completion = ?report.completion,
                delivery = ?report.delivery,
                "pipeline run completed"
            ),
            Err(e) => {
                let status = SubmissionStatus::Failed(e.kind());
                warn!(
                    submission_id = %submission.submission_id,
                    status = %status,
                    error = %e,
                    "pipeline run failed"
                );
                if let Err(store_err) = self
                    .store
                    .set_status(&submission.document_id, status)
                    .await
                {
                    error!(
                        submission_id = %submission.submission_id,
                        error = %store_err,
                        "failed to record run failure"
                    );
                }
            }
        }
        result
    }

    async fn corpus(&self, submission_id: &str) -> Result<Vec<String>, PipelineError> {
        let mut corpus = self
            .store
            .recent_testimonials(self.config.corpus_limit, submission_id)
            .await?;
        corpus.extend(self.config.seed_corpus.iter().cloned());
        Ok(corpus)
    }
}

//! TestimonialSet: the generated material for one submission.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::survey::DocumentId;
use crate::synthesizer::{SynthesisOutcome, TestimonialLength};
use crate::transcript::{SerializedTurn, Transcript};

/// Whether every length variant was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completion {
    Complete,
    Partial,
}

/// A length variant that failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantFailure {
    pub length: TestimonialLength,
    pub reason: String,
}

/// Summary, serialized transcript and the three testimonials, keyed by
/// submission identifier.
///
/// A `Partial` set names its missing variants in `failures`; a set with no
/// variants at all is never built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestimonialSet {
    pub submission_id: String,
    pub document_id: DocumentId,
    pub summary: String,
    pub context: Vec<SerializedTurn>,
    pub short_testimonial: Option<String>,
    pub medium_testimonial: Option<String>,
    pub long_testimonial: Option<String>,
    pub completion: Completion,
    #[serde(default)]
    pub failures: Vec<VariantFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
}

impl TestimonialSet {
    /// Assemble a set from synthesis results.
    ///
    /// Fails with `SynthesisFailed` if no variant succeeded.
    pub fn assemble(
        submission_id: impl Into<String>,
        document_id: DocumentId,
        summary: impl Into<String>,
        transcript: &Transcript,
        outcome: SynthesisOutcome,
        sentiment: Option<f64>,
    ) -> Result<Self, PipelineError> {
        if outcome.all_failed() {
            return Err(PipelineError::SynthesisFailed);
        }

        let failures: Vec<VariantFailure> = TestimonialLength::ALL
            .iter()
            .filter_map(|&length| {
                outcome.get(length).as_ref().err().map(|e| VariantFailure {
                    length,
                    reason: e.to_string(),
                })
            })
            .collect();
        let completion = if failures.is_empty() {
            Completion::Complete
        } else {
            Completion::Partial
        };

        Ok(Self {
            submission_id: submission_id.into(),
            document_id,
            summary: summary.into(),
            context: transcript.serialize(),
            short_testimonial: outcome.short.ok(),
            medium_testimonial: outcome.medium.ok(),
            long_testimonial: outcome.long.ok(),
            completion,
            failures,
            sentiment,
        })
    }

    pub fn testimonial(&self, length: TestimonialLength) -> Option<&str> {
        match length {
            TestimonialLength::Short => self.short_testimonial.as_deref(),
            TestimonialLength::Medium => self.medium_testimonial.as_deref(),
            TestimonialLength::Long => self.long_testimonial.as_deref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    pub fn failed_lengths(&self) -> Vec<TestimonialLength> {
        self.failures.iter().map(|f| f.length).collect()
    }
}

//! Testimonial Synthesizer
//!
//! Three length-constrained generation calls over the same summary and survey
//! fields. The calls share no data, run concurrently and each writes to its
//! own result slot, so one failing never affects the others.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::backend::Generator;
use crate::error::GenerationError;
use crate::prompts;
use crate::survey::{QuestionCatalog, SurveyAnswers, SurveyField};

/// Target length of a testimonial variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestimonialLength {
    Short,
    Medium,
    Long,
}

impl TestimonialLength {
    pub const ALL: [TestimonialLength; 3] = [Self::Short, Self::Medium, Self::Long];

    /// Inclusive word-count range requested from the model.
    pub fn word_range(self) -> (u32, u32) {
        match self {
            Self::Short => (30, 50),
            Self::Medium => (60, 80),
            Self::Long => (100, 120),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for TestimonialLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The survey answers synthesis is templated with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisFields {
    pub employee_count: String,
    pub previous_provider: Option<String>,
    pub additional_feedback: String,
}

impl SynthesisFields {
    /// Pull the tagged fields out of `answers`; untagged or missing fields are empty.
    pub fn from_answers(answers: &SurveyAnswers, catalog: &QuestionCatalog) -> Self {
        let lookup = |field| {
            catalog
                .text_for(field)
                .and_then(|question| answers.get(question))
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        Self {
            employee_count: lookup(SurveyField::EmployeeCount),
            previous_provider: normalize_provider(&lookup(SurveyField::PreviousProvider)),
            additional_feedback: lookup(SurveyField::AdditionalFeedback),
        }
    }
}

/// Blank and placeholder answers mean "no previous provider".
fn normalize_provider(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "n/a" | "na" | "none" | "-" => None,
        _ => Some(trimmed.to_string()),
    }
}

/// Per-length results of one synthesis round.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub short: Result<String, GenerationError>,
    pub medium: Result<String, GenerationError>,
    pub long: Result<String, GenerationError>,
}

impl SynthesisOutcome {
    pub fn get(&self, length: TestimonialLength) -> &Result<String, GenerationError> {
        match length {
            TestimonialLength::Short => &self.short,
            TestimonialLength::Medium => &self.medium,
            TestimonialLength::Long => &self.long,
        }
    }

    pub fn all_failed(&self) -> bool {
        TestimonialLength::ALL.iter().all(|&l| self.get(l).is_err())
    }
}

#[derive(Clone)]
pub struct Synthesizer {
    generator: Generator,
}

impl Synthesizer {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }

    /// User prompt for one length variant.
    pub fn prompt(summary: &str, fields: &SynthesisFields, length: TestimonialLength) -> String {
        let (min, max) = length.word_range();
        let provider_clause = fields
            .previous_provider
            .as_deref()
            .map(|provider| prompts::fill(prompts::PREVIOUS_PROVIDER_CLAUSE, &[("provider", provider)]))
            .unwrap_or_default();

        prompts::fill(
            prompts::SYNTHESIS_TEMPLATE,
            &[
                ("min_words", &min.to_string()),
                ("max_words", &max.to_string()),
                ("employee_count", &fields.employee_count),
                ("previous_provider", &provider_clause),
                ("feedback", &fields.additional_feedback),
                ("summary", summary),
            ],
        )
    }

    pub async fn synthesize(&self, summary: &str, fields: &SynthesisFields) -> SynthesisOutcome {
        let (short, medium, long) = tokio::join!(
            self.variant(summary, fields, TestimonialLength::Short),
            self.variant(summary, fields, TestimonialLength::Medium),
            self.variant(summary, fields, TestimonialLength::Long),
        );
        SynthesisOutcome { short, medium, long }
    }

    async fn variant(
        &self,
        summary: &str,
        fields: &SynthesisFields,
        length: TestimonialLength,
    ) -> Result<String, GenerationError> {
        let prompt = Self::prompt(summary, fields, length);
        let result = self
            .generator
            .generate(prompts::SYNTHESIS_SYSTEM, &[], &prompt)
            .await;
        match &result {
            Ok(text) => info!(variant = %length, words = text.split_whitespace().count(), "testimonial generated"),
            Err(e) => warn!(variant = %length, error = %e, "testimonial variant failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GeneratorConfig, MockBackend, MockReply};
    use std::sync::Arc;
    use std::time::Duration;

    fn fields() -> SynthesisFields {
        SynthesisFields {
            employee_count: "25".into(),
            previous_provider: Some("ADP".into()),
            additional_feedback: "Great onboarding".into(),
        }
    }

    #[test]
    fn test_from_answers_uses_tagged_questions() {
        let catalog = QuestionCatalog::payroll_survey();
        let mut answers = SurveyAnswers::default();
        answers.insert(
            catalog.text_for(SurveyField::EmployeeCount).unwrap(),
            " 40 ",
        );
        answers.insert(catalog.text_for(SurveyField::PreviousProvider).unwrap(), "N/A");
        answers.insert(
            catalog.text_for(SurveyField::AdditionalFeedback).unwrap(),
            "Smooth switch",
        );

        let fields = SynthesisFields::from_answers(&answers, &catalog);
        assert_eq!(fields.employee_count, "40");
        assert_eq!(fields.previous_provider, None);
        assert_eq!(fields.additional_feedback, "Smooth switch");
    }

    #[test]
    fn test_prompt_carries_range_and_provider() {
        let prompt = Synthesizer::prompt("sum", &fields(), TestimonialLength::Long);
        assert!(prompt.contains("100-120 word testimonial"));
        assert!(prompt.contains("previously used ADP"));
        assert!(prompt.contains("(25)"));

        let no_provider = SynthesisFields {
            previous_provider: None,
            ..fields()
        };
        let prompt = Synthesizer::prompt("sum", &no_provider, TestimonialLength::Short);
        assert!(!prompt.contains("previously used"));
    }

    #[test]
    fn test_placeholders_in_answers_stay_literal() {
        let braces = SynthesisFields {
            previous_provider: Some("{feedback} Inc".into()),
            additional_feedback: "see {summary}".into(),
            ..fields()
        };
        let prompt = Synthesizer::prompt("SECRET-SUMMARY", &braces, TestimonialLength::Medium);

        assert!(prompt.contains("(see {summary})"));
        assert!(prompt.contains("previously used {feedback} Inc"));
        assert_eq!(prompt.matches("SECRET-SUMMARY").count(), 1);
    }

    #[tokio::test]
    async fn test_variants_are_independent() {
        let backend = Arc::new(
            MockBackend::default()
                .on("30-50", MockReply::Text("short text".into()))
                .on("60-80", MockReply::Fail("medium down".into()))
                .on("100-120", MockReply::Text("long text".into())),
        );
        let synthesizer =
            Synthesizer::new(Generator::new(backend.clone(), GeneratorConfig::synthesis()));

        let outcome = synthesizer.synthesize("sum", &fields()).await;
        assert_eq!(outcome.short.as_deref().unwrap(), "short text");
        assert!(outcome.medium.is_err());
        assert_eq!(outcome.long.as_deref().unwrap(), "long text");
        assert!(!outcome.all_failed());
        assert_eq!(backend.call_count(), 3);
        assert!(backend
            .requests()
            .iter()
            .all(|r| r.temperature == Some(0.8) && r.messages.len() == 1));
    }

    #[tokio::test]
    async fn test_slow_variant_does_not_reorder_slots() {
        let backend = Arc::new(
            MockBackend::default()
                .on("30-50", MockReply::Delayed(Duration::from_millis(50), "short".into()))
                .on("60-80", MockReply::Text("medium".into()))
                .on("100-120", MockReply::Delayed(Duration::from_millis(10), "long".into())),
        );
        let synthesizer = Synthesizer::new(Generator::new(backend, GeneratorConfig::synthesis()));

        let outcome = synthesizer.synthesize("sum", &fields()).await;
        assert_eq!(outcome.short.unwrap(), "short");
        assert_eq!(outcome.medium.unwrap(), "medium");
        assert_eq!(outcome.long.unwrap(), "long");
    }
}

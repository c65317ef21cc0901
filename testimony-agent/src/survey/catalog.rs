//! Ordered catalog of known survey question texts.
//!
//! The catalog doubles as the delimiter set for answer extraction, so the
//! order of entries must match the order the form renders them in. Entry 0
//! is always the contact-identifier question.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::ParseError;

/// Survey fields the testimonial synthesizer consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyField {
    EmployeeCount,
    PreviousProvider,
    AdditionalFeedback,
}

/// One known question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogQuestion {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<SurveyField>,
}

impl CatalogQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            field: None,
        }
    }

    pub fn tagged(text: impl Into<String>, field: SurveyField) -> Self {
        Self {
            text: text.into(),
            field: Some(field),
        }
    }
}

/// Non-empty ordered list of question texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionCatalog {
    questions: Vec<CatalogQuestion>,
}

impl QuestionCatalog {
    /// Build a catalog, rejecting empty lists, blank texts and duplicates.
    pub fn new(questions: Vec<CatalogQuestion>) -> Result<Self, ParseError> {
        if questions.is_empty() {
            return Err(ParseError::InvalidCatalog("catalog is empty".into()));
        }

        let mut seen = HashSet::new();
        for question in &questions {
            let text = question.text.trim();
            if text.is_empty() {
                return Err(ParseError::InvalidCatalog("blank question text".into()));
            }
            if !seen.insert(text) {
                return Err(ParseError::InvalidCatalog(format!(
                    "duplicate question: {:?}",
                    text
                )));
            }
        }

        Ok(Self { questions })
    }

    /// Convenience constructor from plain texts.
    pub fn from_texts<I, S>(texts: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(CatalogQuestion::new).collect())
    }

    /// Load a catalog from a JSON array of `{"text", "field"}` objects.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ParseError::InvalidCatalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ParseError> {
        let questions: Vec<CatalogQuestion> = serde_json::from_str(raw)
            .map_err(|e| ParseError::InvalidCatalog(e.to_string()))?;
        Self::new(questions)
    }

    /// The built-in payroll customer survey.
    pub fn payroll_survey() -> Self {
        Self {
            questions: vec![
                CatalogQuestion::new("Please Enter your Email Address"),
                CatalogQuestion::new(
                    "How would you rate the ease of transitioning your payroll to TPC?",
                ),
                CatalogQuestion::new(
                    "How satisfied are you with the support you received from Grant Stuart and TPC?",
                ),
                CatalogQuestion::new("How likely are you to recommend TPC to a colleague?"),
                CatalogQuestion::tagged(
                    "How many employees does your company currently process payroll for?",
                    SurveyField::EmployeeCount,
                ),
                CatalogQuestion::tagged(
                    "Who was your previous Payroll Provider?",
                    SurveyField::PreviousProvider,
                ),
                CatalogQuestion::tagged(
                    "Please share your experience or any additional feedback you have regarding your experience with Grant Stuart and TPC.",
                    SurveyField::AdditionalFeedback,
                ),
            ],
        }
    }

    /// The contact-identifier question (entry 0).
    pub fn contact_question(&self) -> &CatalogQuestion {
        &self.questions[0]
    }

    /// Every entry after the contact question, in order.
    pub fn answer_questions(&self) -> &[CatalogQuestion] {
        &self.questions[1..]
    }

    pub fn questions(&self) -> &[CatalogQuestion] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Question text tagged with `field`, if any.
    pub fn text_for(&self, field: SurveyField) -> Option<&str> {
        self.questions
            .iter()
            .find(|q| q.field == Some(field))
            .map(|q| q.text.as_str())
    }
}

impl Default for QuestionCatalog {
    fn default() -> Self {
        Self::payroll_survey()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payroll_survey_shape() {
        let catalog = QuestionCatalog::payroll_survey();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.contact_question().text, "Please Enter your Email Address");
        assert_eq!(catalog.answer_questions().len(), 6);
        assert_eq!(
            catalog.text_for(SurveyField::PreviousProvider),
            Some("Who was your previous Payroll Provider?")
        );
    }

    #[test]
    fn test_rejects_empty_blank_and_duplicate() {
        assert!(QuestionCatalog::new(vec![]).is_err());
        assert!(QuestionCatalog::from_texts(["Email", "  "]).is_err());
        assert!(QuestionCatalog::from_texts(["Email", "Q1", "Q1"]).is_err());
    }

    #[test]
    fn test_from_json_reads_field_tags() {
        let catalog = QuestionCatalog::from_json(
            r#"[
                {"text": "Email"},
                {"text": "Headcount?", "field": "employee_count"}
            ]"#,
        )
        .unwrap();

        assert_eq!(catalog.text_for(SurveyField::EmployeeCount), Some("Headcount?"));
        assert_eq!(catalog.text_for(SurveyField::AdditionalFeedback), None);
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let err = QuestionCatalog::from_json("{not json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidCatalog(_)));
    }
}

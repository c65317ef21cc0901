//! Answer extraction from the pretty-printed survey blob.
//!
//! The blob is a flat run of `question: answer, question: answer, ...` with
//! no structural separators, so question texts themselves are the delimiters.
//! Precondition: every catalog question occurs in catalog order, and no answer
//! contains the literal text of a later question. Out-of-order labels are
//! detected; an answer quoting a later question's text is not.

use super::catalog::QuestionCatalog;
use super::submission::SurveyAnswers;
use crate::error::ParseError;

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Contact identifier (email), never part of `answers`
    pub contact: String,
    /// Non-contact answers in catalog order
    pub answers: SurveyAnswers,
}

const CONTACT_DELIMITER: char = ':';
const TOKEN_DELIMITER: char = ',';

/// Split `blob` into a contact identifier and per-question answers.
///
/// Fails without a partial mapping if any catalog question is missing.
pub fn extract(blob: &str, catalog: &QuestionCatalog) -> Result<Extraction, ParseError> {
    // Locate every label up front so a missing question fails before any span is cut.
    let mut located = Vec::with_capacity(catalog.len());
    for question in catalog.questions() {
        let start = blob
            .find(question.text.as_str())
            .ok_or_else(|| ParseError::MissingQuestion {
                question: question.text.clone(),
            })?;
        located.push((question.text.as_str(), start, start + question.text.len()));
    }

    // The contact label counts too: a first answer span running past it would swallow the email.
    for pair in located.windows(2) {
        let (question, _, end) = pair[0];
        let (next, next_start, _) = pair[1];
        if next_start < end {
            return Err(ParseError::OutOfOrder {
                question: question.to_string(),
                next: next.to_string(),
            });
        }
    }

    let (_, _, contact_end) = located[0];
    let contact = contact_token(&blob[contact_end..])?;

    let answer_labels = &located[1..];
    let mut answers = SurveyAnswers::default();
    for (i, &(question, _, end)) in answer_labels.iter().enumerate() {
        let span_end = answer_labels
            .get(i + 1)
            .map_or(blob.len(), |&(_, next_start, _)| next_start);
        answers.insert(question, clean_span(&blob[end..span_end]));
    }

    Ok(Extraction { contact, answers })
}

/// Text after the first `:` up to the first `,`.
fn contact_token(after_label: &str) -> Result<String, ParseError> {
    let rest = match after_label.split_once(CONTACT_DELIMITER) {
        Some((_, rest)) => rest,
        None => after_label,
    };
    let token = rest.split(TOKEN_DELIMITER).next().unwrap_or_default().trim();
    if token.is_empty() {
        return Err(ParseError::EmptyContact);
    }
    Ok(token.to_string())
}

fn clean_span(span: &str) -> String {
    span.trim_matches(|c: char| c == CONTACT_DELIMITER || c == TOKEN_DELIMITER || c.is_whitespace())
        .to_string()
}

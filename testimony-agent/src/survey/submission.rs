//! Submission records and their lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorKind, ValidationError};

/// Store-assigned unique document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four ingestion fields delivered by the form webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionForm {
    #[serde(rename = "formID", default)]
    pub form_id: String,
    #[serde(rename = "submissionID", default)]
    pub submission_id: String,
    #[serde(rename = "webhookURL", default)]
    pub webhook_url: String,
    #[serde(default)]
    pub pretty: String,
}

impl SubmissionForm {
    /// All four fields are required and must be non-blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("formID", &self.form_id),
            ("submissionID", &self.submission_id),
            ("webhookURL", &self.webhook_url),
            ("pretty", &self.pretty),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(name));
            }
        }
        Ok(())
    }
}

/// One extracted question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    pub question: String,
    pub answer: String,
}

/// Question → answer mapping kept in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurveyAnswers(Vec<SurveyAnswer>);

impl SurveyAnswers {
    /// Insert or replace the answer for `question`.
    pub fn insert(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        let question = question.into();
        let answer = answer.into();
        match self.0.iter_mut().find(|a| a.question == question) {
            Some(existing) => existing.answer = answer,
            None => self.0.push(SurveyAnswer { question, answer }),
        }
    }

    pub fn get(&self, question: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|a| a.question == question)
            .map(|a| a.answer.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SurveyAnswer> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object literal (`{"question": "answer", ...}`) for prompts.
    pub fn to_prompt_literal(&self) -> String {
        let body = self
            .0
            .iter()
            .map(|a| {
                format!(
                    "{}: {}",
                    serde_json::Value::String(a.question.clone()),
                    serde_json::Value::String(a.answer.clone())
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{}}}", body)
    }
}

/// Pipeline status recorded on a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionStatus {
    Pending,
    Running,
    Completed,
    Failed(ErrorKind),
}

impl SubmissionStatus {
    /// Whether the recovery sweep should re-dispatch this submission.
    pub fn is_unfinished(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Failed(kind) => write!(f, "failed:{}", kind),
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            other => other
                .strip_prefix("failed:")
                .and_then(ErrorKind::parse)
                .map(Self::Failed)
                .ok_or_else(|| format!("unknown submission status: {}", other)),
        }
    }
}

impl Serialize for SubmissionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SubmissionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Notifier outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    NotAttempted,
    Delivered,
    Pending,
    /// Gave up after the configured number of attempts
    Abandoned,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAttempted => "not_attempted",
            Self::Delivered => "delivered",
            Self::Pending => "pending",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Delivery bookkeeping so a retry sweep can find undelivered notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryState {
    pub status: DeliveryStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl DeliveryState {
    pub fn delivered(attempts: u32) -> Self {
        Self {
            status: DeliveryStatus::Delivered,
            attempts,
            last_error: None,
        }
    }

    pub fn pending(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Pending,
            attempts,
            last_error: Some(error.into()),
        }
    }

    pub fn abandoned(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Abandoned,
            attempts,
            last_error: Some(error.into()),
        }
    }
}

/// Parsed submission ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub submission_id: String,
    pub form_id: String,
    pub webhook_url: String,
    pub contact: String,
    pub answers: SurveyAnswers,
}

/// A stored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub document_id: DocumentId,
    pub submission_id: String,
    pub form_id: String,
    pub webhook_url: String,
    pub contact: String,
    pub answers: SurveyAnswers,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub delivery: DeliveryState,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Materialise a freshly inserted record.
    pub fn from_new(document_id: DocumentId, new: NewSubmission) -> Self {
        Self {
            document_id,
            submission_id: new.submission_id,
            form_id: new.form_id,
            webhook_url: new.webhook_url,
            contact: new.contact,
            answers: new.answers,
            status: SubmissionStatus::Pending,
            retry_count: 0,
            delivery: DeliveryState::default(),
            created_at: Utc::now(),
        }
    }
}

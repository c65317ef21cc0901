//! Survey model: question catalog, answer extraction and submission records.

pub mod catalog;
pub mod extract;
pub mod submission;

pub use catalog::{CatalogQuestion, QuestionCatalog, SurveyField};
pub use extract::{extract, Extraction};
pub use submission::{
    DeliveryState, DeliveryStatus, DocumentId, NewSubmission, Submission, SubmissionForm,
    SubmissionStatus, SurveyAnswer, SurveyAnswers,
};

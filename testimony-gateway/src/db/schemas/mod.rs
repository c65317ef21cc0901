//! Database schemas for the gateway
//!
//! MongoDB document structures for survey submissions and testimonial sets.

mod metadata;
mod submission;
mod testimonial;

pub use metadata::Metadata;
pub use submission::{SubmissionDoc, SUBMISSION_COLLECTION};
pub use testimonial::{TestimonialDoc, TESTIMONIAL_COLLECTION};

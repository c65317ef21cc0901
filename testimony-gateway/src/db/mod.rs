//! Database layer for the gateway
//!
//! MongoDB storage for submissions and testimonial sets.

pub mod mongo;
pub mod schemas;

pub use mongo::{MongoClient, MongoCollection};
pub use schemas::{Metadata, SubmissionDoc, TestimonialDoc};

//! Testimony gateway - survey webhook intake for the testimonial pipeline
//!
//! Hosts the pipeline from `testimony-agent` behind a small HTTP surface:
//!
//! - **Intake**: `POST /submit-form` parses and stores a survey submission,
//!   then queues its run
//! - **Stage endpoints**: `POST /process/stage1` and `/process/stage2` for
//!   re-driving a run or synthesizing from an external summary
//! - **Storage**: MongoDB collections for submissions and testimonial sets
//! - **Notifier**: HTTP POST downstream once a set is stored

pub mod config;
pub mod db;
pub mod notifier;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};

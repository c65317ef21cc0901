//! Configuration for the gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use testimony_agent::{PipelineConfig, WorkerConfig};

/// Testimony gateway - survey webhook intake and testimonial pipeline host
#[derive(Parser, Debug, Clone)]
#[command(name = "testimony-gateway")]
#[command(about = "Survey webhook gateway for the testimonial generation pipeline")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory store, API key optional)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "testimony")]
    pub mongodb_db: String,

    /// Base URL of an OpenAI-compatible chat completions API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// API key for the generation backend (required in production)
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Model used for every generation call
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-3.5-turbo")]
    pub openai_model: String,

    /// Sampling temperature for the stage chain
    #[arg(long, env = "STAGE_TEMPERATURE", default_value = "0.2")]
    pub stage_temperature: f32,

    /// Sampling temperature for testimonial synthesis
    #[arg(long, env = "SYNTHESIS_TEMPERATURE", default_value = "0.8")]
    pub synthesis_temperature: f32,

    /// Timeout for a single generation call in milliseconds
    #[arg(long, env = "GENERATION_TIMEOUT_MS", default_value = "60000")]
    pub generation_timeout_ms: u64,

    /// Downstream endpoint notified when a testimonial set is stored
    /// (logs instead when unset)
    #[arg(long, env = "NOTIFY_URL")]
    pub notify_url: Option<String>,

    /// Timeout for the downstream notification in milliseconds
    #[arg(long, env = "NOTIFY_TIMEOUT_MS", default_value = "10000")]
    pub notify_timeout_ms: u64,

    /// Notification attempts before a submission's delivery is abandoned
    #[arg(long, env = "MAX_DELIVERY_ATTEMPTS", default_value = "10")]
    pub max_delivery_attempts: u32,

    /// JSON file with the question catalog (array of `{text, field}`
    /// objects); built-in payroll survey when unset
    #[arg(long, env = "CATALOG_FILE")]
    pub catalog_file: Option<PathBuf>,

    /// JSON file with seed reference testimonials (array of strings)
    #[arg(long, env = "CORPUS_FILE")]
    pub corpus_file: Option<PathBuf>,

    /// How many stored testimonials feed the reference corpus
    #[arg(long, env = "CORPUS_LIMIT", default_value = "20")]
    pub corpus_limit: usize,

    /// Score transcript sentiment before synthesis
    #[arg(long, env = "SENTIMENT_ENABLED", default_value = "true", action = ArgAction::Set)]
    pub sentiment_enabled: bool,

    /// Pipeline runs allowed in flight at once
    #[arg(long, env = "WORKER_CONCURRENCY", default_value = "4")]
    pub worker_concurrency: usize,

    /// Attempts per submission, including the first
    #[arg(long, env = "MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    /// Delay before a failed run is retried, in milliseconds
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value = "5000")]
    pub retry_backoff_ms: u64,

    /// Interval between notification redelivery sweeps, in seconds
    #[arg(long, env = "REDELIVERY_INTERVAL_SECS", default_value = "300")]
    pub redelivery_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn redelivery_interval(&self) -> Duration {
        Duration::from_secs(self.redelivery_interval_secs)
    }

    /// API key, treating an empty value as unset
    pub fn api_key(&self) -> Option<String> {
        self.openai_api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// Pipeline tunables; `seed_corpus` comes from `CORPUS_FILE`
    pub fn pipeline_config(&self, seed_corpus: Vec<String>) -> PipelineConfig {
        PipelineConfig {
            corpus_limit: self.corpus_limit,
            seed_corpus,
            sentiment_enabled: self.sentiment_enabled,
            notify_timeout: self.notify_timeout(),
            max_delivery_attempts: self.max_delivery_attempts,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker_concurrency,
            max_attempts: self.max_attempts,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            ..WorkerConfig::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.api_key().is_none() {
            return Err("OPENAI_API_KEY is required in production mode".to_string());
        }

        if self.worker_concurrency == 0 {
            return Err("WORKER_CONCURRENCY must be at least 1".to_string());
        }

        if self.max_attempts == 0 {
            return Err("MAX_ATTEMPTS must be at least 1".to_string());
        }

        for (name, value) in [
            ("STAGE_TEMPERATURE", self.stage_temperature),
            ("SYNTHESIS_TEMPERATURE", self.synthesis_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(format!("{} must be between 0.0 and 2.0", name));
            }
        }

        if self.max_delivery_attempts == 0 {
            return Err("MAX_DELIVERY_ATTEMPTS must be at least 1".to_string());
        }

        if self.generation_timeout_ms == 0 || self.notify_timeout_ms == 0 {
            return Err("GENERATION_TIMEOUT_MS and NOTIFY_TIMEOUT_MS must be positive".to_string());
        }

        if self.redelivery_interval_secs == 0 {
            return Err("REDELIVERY_INTERVAL_SECS must be positive".to_string());
        }

        Ok(())
    }
}

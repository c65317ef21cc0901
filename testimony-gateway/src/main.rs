//! Testimony gateway - survey webhook intake and testimonial pipeline host

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use testimony_agent::backend::OpenAiBackend;
use testimony_agent::{
    spawn_recovery_task, spawn_redelivery_task, Generator, GeneratorConfig, LlmBackend,
    LogNotifier, MemoryStore, Notifier, Pipeline, PipelineWorker, QuestionCatalog,
    SubmissionStore,
};
use testimony_gateway::{
    config::Args,
    db::MongoClient,
    notifier::HttpNotifier,
    server::{self, AppState},
    store::MongoSubmissionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "testimony_gateway={lvl},testimony_agent={lvl},info",
                    lvl = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Testimony Gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Model: {} via {}", args.openai_model, args.openai_base_url);
    info!(
        "Temperatures: stage {} / synthesis {}",
        args.stage_temperature, args.synthesis_temperature
    );
    info!("Workers: {} (max {} attempts)", args.worker_concurrency, args.max_attempts);
    info!(
        "Notify: {}",
        args.notify_url.as_deref().unwrap_or("(log only)")
    );
    info!("======================================");

    // Dev mode keeps everything in memory
    let store: Arc<dyn SubmissionStore> = if args.dev_mode {
        warn!("Using in-memory submission store (dev mode)");
        Arc::new(MemoryStore::new())
    } else {
        let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => client,
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };
        Arc::new(MongoSubmissionStore::new(mongo).await?)
    };

    let catalog = match &args.catalog_file {
        Some(path) => QuestionCatalog::from_json_file(path)
            .with_context(|| format!("loading question catalog {}", path.display()))?,
        None => QuestionCatalog::payroll_survey(),
    };
    info!("Question catalog: {} questions", catalog.len());

    let seed_corpus = match &args.corpus_file {
        Some(path) => load_corpus(path)?,
        None => Vec::new(),
    };
    info!(
        "Reference corpus: {} seed + up to {} stored",
        seed_corpus.len(),
        args.corpus_limit
    );

    let notifier: Arc<dyn Notifier> = match &args.notify_url {
        Some(url) => Arc::new(HttpNotifier::new(url.clone(), args.notify_timeout())),
        None => Arc::new(LogNotifier),
    };

    let backend: Arc<dyn LlmBackend> = Arc::new(OpenAiBackend::new(
        args.openai_base_url.clone(),
        args.openai_model.clone(),
        args.api_key(),
    ));
    if !backend.is_available().await {
        warn!("Generation backend not reachable at startup; runs will retry");
    }

    let stage_generator = Generator::new(
        Arc::clone(&backend),
        GeneratorConfig::stage()
            .with_temperature(args.stage_temperature)
            .with_timeout(args.generation_timeout()),
    );
    let synthesis_generator = Generator::new(
        backend,
        GeneratorConfig::synthesis()
            .with_temperature(args.synthesis_temperature)
            .with_timeout(args.generation_timeout()),
    );

    let pipeline = Arc::new(Pipeline::new(
        Arc::new(catalog),
        store,
        notifier,
        stage_generator,
        synthesis_generator,
        args.pipeline_config(seed_corpus),
    ));
    let worker = Arc::new(PipelineWorker::start(
        Arc::clone(&pipeline),
        args.worker_config(),
    ));

    spawn_recovery_task(Arc::clone(&pipeline), Arc::clone(&worker));
    spawn_redelivery_task(Arc::clone(&pipeline), args.redelivery_interval());

    let state = Arc::new(AppState::new(args, pipeline, worker));

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Seed reference testimonials: a JSON array of strings
fn load_corpus(path: &Path) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading corpus file {}", path.display()))?;
    let corpus: Vec<String> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing corpus file {}", path.display()))?;
    Ok(corpus
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

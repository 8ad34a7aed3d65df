//! TAi Context Engine
//!
//! Command-line entry point: loads configuration, wires the production
//! graph, embedding, and LLM clients, prepares the context for one question,
//! and prints the resulting message list as JSON.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::sync::Arc;
use tai_common::cancel::CancellationToken;
use tai_common::config::{AppConfig, ObservabilityConfig};
use tai_common::embeddings::create_embedder;
use tai_common::graph::Neo4jHttpClient;
use tai_common::llm::OpenAIChatClient;
use tai_common::metrics::{register_metrics, METRICS_PREFIX, SEARCH_BUCKETS};
use tai_common::models::Session;
use tai_common::tokens::TiktokenTokenizer;
use tai_common::VERSION;
use tai_context::RetrievalPipeline;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYSTEM_PROMPT: &str = "You are TAi, a teaching assistant for a distributed systems course. \
Answer using the course content provided, cite the sources you rely on, and say so when the \
material does not cover the question.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("usage: context <question>");
    }

    let config = match std::env::var("TAI_CONFIG_FILE") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        token_budget = config.budget.total(),
        "Starting TAi Context Engine v{}",
        VERSION
    );

    if config.observability.metrics_port != 0 {
        init_metrics(config.observability.metrics_port)?;
    }

    let tokenizer = Arc::new(TiktokenTokenizer::cl100k()?);
    let graph = Arc::new(Neo4jHttpClient::new(&config.graph)?);
    let embedder = create_embedder(&config.embedding)?;
    let extraction_llm = Arc::new(OpenAIChatClient::new(&config.llm, &config.llm.extraction_model)?);
    let reasoning_llm = Arc::new(OpenAIChatClient::new(&config.llm, &config.llm.reasoning_model)?);

    let pipeline = RetrievalPipeline::from_config(
        &config,
        graph,
        embedder,
        extraction_llm,
        reasoning_llm,
        tokenizer,
        None,
    );

    // Cancel in-flight collaborator calls on Ctrl-C
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let profile = std::env::var("TAI_STUDENT_PROFILE").unwrap_or_default();
    let prepared = pipeline
        .prepare(&question, &Session::default(), &profile, SYSTEM_PROMPT, &cancel)
        .await?;

    info!(
        strategy = %prepared.routing.strategy,
        query_type = %prepared.routing.query_type,
        results = prepared.results.len(),
        "Context ready"
    );
    println!("{}", serde_json::to_string_pretty(&prepared.messages)?);

    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn init_metrics(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_search_duration_seconds", METRICS_PREFIX)),
            SEARCH_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    register_metrics();
    info!(port, "Metrics exporter listening");
    Ok(())
}

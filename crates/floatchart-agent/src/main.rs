//! FloatChart: turns questions about ARGO float data into parameterized SQL.
//! Entry point for the `floatchart` binary.
//!
//! With arguments, the arguments form one question. Without, each line on stdin is
//! a question. Every answer is one JSON object on stdout; logs go to stderr.

mod config;

use std::sync::Arc;

use anyhow::Context;
use floatchart_llm::build_gateway;
use floatchart_query::{Gazetteer, QueryEngine, QueryError, QueryRequest};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn load_gazetteer(config: &config::Config) -> anyhow::Result<Gazetteer> {
    match &config.gazetteer.path {
        Some(path) => Gazetteer::load(path)
            .with_context(|| format!("loading gazetteer from {}", path.display())),
        None => Ok(Gazetteer::builtin()),
    }
}

fn build_engine(config: &config::Config) -> anyhow::Result<QueryEngine> {
    let gazetteer = Arc::new(load_gazetteer(config)?);
    info!("Gazetteer ready: {} regions", gazetteer.len());

    let backends = config.llm.backend_configs(|var| std::env::var(var).ok());
    let gateway = build_gateway(backends, config.llm.gateway_settings());
    let gateway = if gateway.is_empty() {
        tracing::warn!(
            "No text-completion providers configured. Questions no rule understands \
             will be answered with a request to rephrase."
        );
        None
    } else {
        info!("Provider gateway ready: {}", gateway.registered_backends().join(" -> "));
        Some(Arc::new(gateway))
    };

    Ok(QueryEngine::new(gazetteer, gateway, config.query.clone()))
}

/// One JSON answer per question. Query errors are answers, not failures.
async fn answer(engine: &QueryEngine, text: &str) -> Value {
    match engine.understand(&QueryRequest::new(text)).await {
        Ok(understood) => json!({ "status": "ok", "query": understood }),
        Err(QueryError::UnresolvedLocation { phrase }) => json!({
            "status": "clarify_location",
            "phrase": phrase,
            "message": format!("I could not find \"{phrase}\". Which sea, ocean or city did you mean?"),
        }),
        Err(QueryError::AmbiguousIntent { cause }) => json!({
            "status": "rephrase",
            "cause": cause,
            "message": "I could not tell what you are asking for. Please rephrase the question.",
        }),
        Err(QueryError::InsufficientEntities { intent, missing }) => json!({
            "status": "insufficient_entities",
            "intent": intent,
            "missing": missing,
            "message": format!("A {intent} question needs {missing}."),
        }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("floatchart=debug,floatchart_query=debug,floatchart_llm=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("FloatChart {} starting", env!("CARGO_PKG_VERSION"));

    let config = config::Config::load()?;
    info!(
        "Configuration loaded. Table: {}, row cap: {}",
        config.query.table, config.query.row_cap
    );
    let engine = build_engine(&config)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        println!("{}", answer(&engine, &args.join(" ")).await);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        println!("{}", answer(&engine, text).await);
    }

    Ok(())
}

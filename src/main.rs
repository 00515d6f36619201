use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;

use inbox_sorter::config::{GmailConfig, ServeConfig, TrainConfig};
use inbox_sorter::dispatch::Dispatcher;
use inbox_sorter::inference::Predictor;
use inbox_sorter::mail::GmailClient;
use inbox_sorter::server::routes;
use inbox_sorter::training::{Trainer, collect_from_source, load_jsonl};

const USAGE: &str = "\
usage:
  inbox-sorter train [--corpus <file.jsonl>]
  inbox-sorter serve";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(writer)
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("train") => train(args.collect()).await,
        Some("serve") => serve().await,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

async fn train(args: Vec<String>) -> anyhow::Result<()> {
    let config = TrainConfig::from_env()?;

    let documents = match corpus_path(&args)? {
        Some(path) => load_jsonl(&path)?,
        None => {
            let gmail = GmailClient::new(GmailConfig::from_env()?)?;
            collect_from_source(&gmail, &config.categories, config.per_label_limit).await?
        }
    };
    info!(documents = documents.len(), dir = %config.artifact_dir.display(), "Starting training run");

    // Fitting is CPU-bound; keep it off the async workers.
    let trainer = Trainer::new(config);
    let report = tokio::task::spawn_blocking(move || trainer.train(&documents))
        .await
        .context("training task panicked")??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn corpus_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    match args {
        [] => Ok(None),
        [flag, path] if flag == "--corpus" => Ok(Some(PathBuf::from(path))),
        _ => bail!("unrecognized arguments: {}\n{USAGE}", args.join(" ")),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = ServeConfig::from_env()?;

    let mut predictor = Predictor::new(&config.artifact_dir);
    let ready = predictor
        .load()
        .context("refusing to serve without a complete artifact bundle")?;

    let gmail = Arc::new(GmailClient::with_timeout(
        GmailConfig::from_env()?,
        config.external_timeout,
    )?);
    let bundle_id = ready.bundle_id();
    let dispatcher = Arc::new(Dispatcher::new(
        gmail.clone(),
        gmail,
        ready,
        config.external_timeout,
    ));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(port = config.port, bundle_id = %bundle_id, "Serving webhook");

    axum::serve(listener, routes(dispatcher))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

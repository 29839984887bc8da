mod cli;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use embedstore::config::Config;
use embedstore::server::AppState;
use embedstore::{HttpEmbeddingProvider, IngestPipeline, RetryingEmbedder, VectorStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<()> {
    // e.g. EMBEDSTORE_LOG=debug embedstore serve
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EMBEDSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(snapshot) = cli.snapshot {
        config.snapshot = snapshot;
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let state = web::Data::new(AppState::new(build_pipeline(&config)?, config.top_k));

            info!(bind = %config.bind, "starting server");
            HttpServer::new(move || App::new().app_data(state.clone()).configure(embedstore::server::config))
                .bind(&config.bind)
                .with_context(|| format!("Failed to bind {}", config.bind))?
                .run()
                .await?;
        }
        Commands::Load { file, fresh } => {
            if fresh {
                match std::fs::remove_file(&config.snapshot) {
                    Ok(()) => info!(path = %config.snapshot.display(), "existing snapshot removed"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| format!("Failed to remove {}", config.snapshot.display()));
                    }
                }
            }

            let pipeline = build_pipeline(&config)?;
            let summary = pipeline
                .load_file(&file)
                .await
                .with_context(|| format!("Failed to load {}", file.display()))?;
            println!(
                "inserted {}, duplicates {}, blank {} ({} records total)",
                summary.inserted,
                summary.duplicates,
                summary.skipped_blank,
                pipeline.len().await
            );
        }
        Commands::Search { text, top_k } => {
            let pipeline = build_pipeline(&config)?;
            let matches = pipeline.search(&text, top_k.unwrap_or(config.top_k)).await?;
            for m in matches {
                println!("{:.4}\t{}", m.score, m.text);
            }
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<IngestPipeline> {
    let mut provider = HttpEmbeddingProvider::new(&config.provider_url, config.timeout)
        .context("Failed to build HTTP client")?;
    if let Some(token) = &config.api_token {
        provider = provider.with_api_token(token);
    }

    let store = VectorStore::open(&config.snapshot)
        .with_context(|| format!("Failed to open snapshot {}", config.snapshot.display()))?;

    Ok(IngestPipeline::new(RetryingEmbedder::new(Arc::new(provider), config.retry), store))
}

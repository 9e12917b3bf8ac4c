//! Reviewer Assignment - picks pull request reviewers inside teams.
//!
//! This is the main library for the service: storage, the assignment
//! engine and the HTTP API. The `reviewer-assignment` binary wires them
//! together through [`run`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use config::Config;
use services::api::AppState;
use services::{server, ReviewerEngine, SqliteDirectory, SqliteLedger};

/// Open the database, build the engine and serve the API until a shutdown
/// signal arrives.
pub async fn run(config: Config) -> anyhow::Result<()> {
    log::info!(
        "[server] Using database: {}",
        config.database_path.display()
    );
    let db = db::initialize(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let ledger = Arc::new(SqliteLedger::new(db.clone()));
    let directory = Arc::new(SqliteDirectory::new(db.clone()));
    let engine = match config.rng_seed {
        Some(seed) => {
            log::info!("[server] Reviewer selection seeded with {}", seed);
            ReviewerEngine::with_seed(ledger, directory, seed)
        }
        None => ReviewerEngine::from_entropy(ledger, directory),
    };

    let shutdown = CancellationToken::new();
    let requests = CancellationToken::new();

    let app = server::build_app(AppState {
        db: db.clone(),
        engine: Arc::new(engine),
        cancel: requests.clone(),
        request_timeout: config.request_timeout,
    });

    let listener = server::bind(config.port)
        .await
        .with_context(|| format!("Failed to bind to port {}", config.port))?;

    tokio::spawn(server::shutdown_on_signal(shutdown.clone()));

    server::serve(listener, app, shutdown, requests)
        .await
        .context("Server error")?;

    db.close().await;
    Ok(())
}
